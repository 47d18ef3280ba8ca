use std::error::Error;
use std::path::PathBuf;

use rmount::daemon::{AppState, ServiceConfig, State, StateError};

#[derive(Clone)]
pub struct OpContext {
    /// Optional custom rmount directory (defaults to ~/.rmount)
    pub config_path: Option<PathBuf>,
    /// Passphrase of the encrypted configuration, if supplied
    pub passphrase: Option<String>,
}

impl std::fmt::Debug for OpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpContext")
            .field("config_path", &self.config_path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            config_path,
            passphrase,
        }
    }

    /// Resolve (and create if missing) the rmount directory
    pub fn app_state(&self) -> Result<AppState, StateError> {
        Ok(AppState::load_or_init(self.config_path.clone())?)
    }

    /// Open the application context for a one-shot command
    pub async fn open_state(&self) -> Result<State, StateError> {
        let app = self.app_state()?;
        let service = ServiceConfig::new(app.rmount_dir.clone());
        State::open(&app, self.passphrase.as_deref(), &service, false).await
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
