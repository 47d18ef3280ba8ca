//! Autostart command - start `rmount run` at login

use clap::{Args, Subcommand};

pub mod disable;
pub mod enable;
pub mod status;

use crate::op::Op;

crate::command_enum! {
    (Enable, enable::Enable),
    (Disable, disable::Disable),
    (Status, status::Status),
}

pub type AutoStartCommand = Command;

#[derive(Args, Debug, Clone)]
#[command(about = "Start rmount automatically at login")]
pub struct AutoStart {
    #[command(subcommand)]
    pub command: AutoStartCommand,
}

#[async_trait::async_trait]
impl Op for AutoStart {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
