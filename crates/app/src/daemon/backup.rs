//! Remote configuration backup through a private GitHub gist
//!
//! The uploaded payload is the sealed store blob, base64 encoded inside a
//! small JSON envelope. Restoring requires the passphrase the blob was
//! sealed with.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

pub const GIST_FILE_NAME: &str = "rmount-config.json";
pub const ENVELOPE_VERSION: &str = "1.0";
pub const GITHUB_API: &str = "https://api.github.com/";
const GIST_DESCRIPTION: &str = "rmount configuration backup";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("backup token is not a valid header value")]
    InvalidToken,
    #[error("invalid gist id '{0}'")]
    InvalidId(String),
    #[error("gist {0} has no rmount-config.json file")]
    MissingFile(String),
    #[error("malformed backup: {0}")]
    Decode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stores and fetches one opaque blob under an id
#[async_trait::async_trait]
pub trait BackupTransport: Send + Sync {
    /// Upload `blob`, replacing the content of `existing_id` when given.
    /// Returns the id the blob now lives under.
    async fn upload(&self, blob: &[u8], existing_id: Option<&str>)
        -> Result<String, TransportError>;

    async fn download(&self, id: &str) -> Result<Vec<u8>, TransportError>;
}

/// Contents of the backup file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    /// Base64 of the sealed configuration
    pub app_config: String,
    /// Unix seconds at upload
    pub timestamp: i64,
    pub version: String,
}

impl BackupEnvelope {
    pub fn new(blob: &[u8]) -> Self {
        Self {
            app_config: BASE64.encode(blob),
            timestamp: chrono::Utc::now().timestamp(),
            version: ENVELOPE_VERSION.to_string(),
        }
    }

    pub fn blob(&self) -> Result<Vec<u8>, TransportError> {
        if self.version != ENVELOPE_VERSION {
            return Err(TransportError::Decode(format!(
                "unsupported backup version {}",
                self.version
            )));
        }
        BASE64
            .decode(&self.app_config)
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct GistFileContent {
    content: String,
}

#[derive(Debug, Serialize)]
struct GistWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public: Option<bool>,
    files: HashMap<&'static str, GistFileContent>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Gist {
    id: String,
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

fn gist_write(envelope: &BackupEnvelope, create: bool) -> Result<GistWrite, TransportError> {
    let mut files = HashMap::new();
    files.insert(
        GIST_FILE_NAME,
        GistFileContent {
            content: serde_json::to_string(envelope)?,
        },
    );
    Ok(GistWrite {
        description: create.then_some(GIST_DESCRIPTION),
        public: create.then_some(false),
        files,
    })
}

fn validate_id(id: &str) -> Result<(), TransportError> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(TransportError::InvalidId(id.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct GistTransport {
    api: Url,
    client: Client,
}

impl GistTransport {
    pub fn new(token: &str) -> Result<Self, TransportError> {
        Self::with_api(token, &Url::parse(GITHUB_API)?)
    }

    pub fn with_api(token: &str, api: &Url) -> Result<Self, TransportError> {
        let mut default_headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| TransportError::InvalidToken)?;
        auth.set_sensitive(true);
        default_headers.insert(AUTHORIZATION, auth);
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("rmount/", env!("CARGO_PKG_VERSION"))),
        );
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            api: api.clone(),
            client,
        })
    }

    /// Checks the token by fetching the authenticated user
    pub async fn test_access(&self) -> Result<(), TransportError> {
        let response = self.client.get(self.api.join("user")?).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }

    async fn fetch(&self, id: &str) -> Result<Gist, TransportError> {
        let url = self.api.join(&format!("gists/{}", id))?;
        let response = self.client.get(url).send().await?;
        if response.status().is_success() {
            Ok(response.json::<Gist>().await?)
        } else {
            Err(TransportError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }
}

#[async_trait::async_trait]
impl BackupTransport for GistTransport {
    async fn upload(
        &self,
        blob: &[u8],
        existing_id: Option<&str>,
    ) -> Result<String, TransportError> {
        let envelope = BackupEnvelope::new(blob);

        let request = match existing_id {
            Some(id) => {
                validate_id(id)?;
                self.client
                    .patch(self.api.join(&format!("gists/{}", id))?)
                    .json(&gist_write(&envelope, false)?)
            }
            None => self
                .client
                .post(self.api.join("gists")?)
                .json(&gist_write(&envelope, true)?),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(
                response.status(),
                response.text().await?,
            ));
        }
        let gist: Gist = response.json().await?;

        tracing::info!(gist_id = %gist.id, "uploaded configuration backup");
        Ok(gist.id)
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>, TransportError> {
        validate_id(id)?;
        let mut gist = self.fetch(id).await?;
        let file = gist
            .files
            .remove(GIST_FILE_NAME)
            .ok_or_else(|| TransportError::MissingFile(id.to_string()))?;

        let content = match (file.content, file.truncated, file.raw_url) {
            (Some(content), false, _) => content,
            (_, _, Some(raw_url)) => {
                let response = self.client.get(raw_url).send().await?;
                if !response.status().is_success() {
                    return Err(TransportError::HttpStatus(
                        response.status(),
                        response.text().await?,
                    ));
                }
                response.text().await?
            }
            _ => return Err(TransportError::MissingFile(id.to_string())),
        };

        let envelope: BackupEnvelope = serde_json::from_str(&content)?;
        tracing::info!(gist_id = %id, timestamp = envelope.timestamp, "downloaded configuration backup");
        envelope.blob()
    }
}
