//! Asset host client
//!
//! Thin client for the management API of the asset host. Uploading one file
//! takes four calls:
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | create asset | `POST /v1/spaces/{space}/assets/` `{filename, size}` | [`SignedUploadDescriptor`] |
//! | submit form | `POST {post_url}` multipart (signed fields + `file`) | any 2xx |
//! | finish upload | `GET /v1/spaces/{space}/assets/{id}/finish_upload` | [`FinishedUpload`] |
//! | fetch asset | `GET /v1/spaces/{space}/assets/{id}` | [`AssetRecord`] |
//!
//! Sequencing and error attribution live in [`crate::upload`].

use crate::config::HostConfig;
use crate::corpus::ExampleImage;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Host errors
#[derive(Error, Debug)]
pub enum HostError {
    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Time-limited credentials for one direct upload
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUploadDescriptor {
    /// Provisional asset id
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Where the multipart form is submitted
    pub post_url: String,
    /// Signed form fields, in the order the host returned them
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Response of the finish call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinishedUpload {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub id: Option<String>,
}

/// Finalized asset as stored by the host
#[derive(Debug, Clone, Deserialize)]
pub struct AssetRecord {
    /// Raw storage URL of the asset
    pub filename: String,
}

#[derive(Debug, Serialize)]
struct CreateAssetRequest<'a> {
    filename: &'a str,
    size: &'a str,
}

fn value_to_id(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    value_to_id(value).ok_or_else(|| serde::de::Error::custom("expected a string or number id"))
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_id))
}

/// Render a signed field verbatim: strings as-is, anything else as JSON text
fn field_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Strip the storage domain fragment from a raw asset URL.
///
/// Only the first occurrence is removed; the rest of the URL is untouched.
pub fn public_url(raw: &str, storage_fragment: &str) -> String {
    if storage_fragment.is_empty() {
        return raw.to_string();
    }
    raw.replacen(storage_fragment, "", 1)
}

/// Asset host management API client
#[derive(Debug, Clone)]
pub struct AssetHostClient {
    config: HostConfig,
    client: reqwest::Client,
}

impl AssetHostClient {
    /// Create a new client
    pub fn new(config: HostConfig) -> Result<Self, HostError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self { config, client })
    }

    fn assets_url(&self) -> String {
        format!(
            "{}/v1/spaces/{}/assets/",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.space_id
        )
    }

    fn asset_url(&self, id: &str) -> String {
        format!("{}{}", self.assets_url(), id)
    }

    /// Derive the public, transformable URL from a raw storage URL
    pub fn public_url(&self, raw: &str) -> String {
        public_url(raw, &self.config.storage_domain_fragment)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, HostError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(HostError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Ask for a signed upload location for `image`
    pub async fn request_upload(
        &self,
        image: &ExampleImage,
    ) -> Result<SignedUploadDescriptor, HostError> {
        let file_name = image.file_name();
        let size = image.size_string();
        let body = CreateAssetRequest {
            filename: &file_name,
            size: &size,
        };

        let response = self
            .client
            .post(self.assets_url())
            .header(AUTHORIZATION, &self.config.auth_token)
            .json(&body)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    /// Submit the signed form with the file streamed from disk as last field
    pub async fn submit_form(
        &self,
        descriptor: &SignedUploadDescriptor,
        image: &ExampleImage,
    ) -> Result<(), HostError> {
        let mut form = Form::new();
        for (key, value) in &descriptor.fields {
            form = form.text(key.clone(), field_value(value));
        }

        let file = tokio::fs::File::open(&image.path).await?;
        let length = file.metadata().await?.len();
        let part = Part::stream_with_length(reqwest::Body::from(file), length)
            .file_name(image.file_name())
            .mime_str(image.format.mime_type())?;
        form = form.part("file", part);

        let response = self
            .client
            .post(&descriptor.post_url)
            .multipart(form)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Mark the provisional asset as uploaded
    pub async fn finish_upload(&self, id: &str) -> Result<FinishedUpload, HostError> {
        let response = self
            .client
            .get(format!("{}/finish_upload", self.asset_url(id)))
            .header(AUTHORIZATION, &self.config.auth_token)
            .send()
            .await?;

        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(FinishedUpload::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fetch the finalized asset record
    pub async fn fetch_asset(&self, id: &str) -> Result<AssetRecord, HostError> {
        let response = self
            .client
            .get(self.asset_url(id))
            .header(AUTHORIZATION, &self.config.auth_token)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }
}
