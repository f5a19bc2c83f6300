//! Upload module
//!
//! Moves examples onto the asset host. A single upload walks an explicit state
//! machine so that a failure names the step it happened in:
//!
//! ```text
//! request ──▶ Requested ──submit──▶ FormSubmitted ──finish──▶ Finalized ──fetch──▶ Resolved
//! ```
//!
//! A failed submission stops the upload; the finish call is never attempted
//! for a form the host did not accept.

use crate::corpus::ExampleImage;
use crate::host::{AssetHostClient, HostError, SignedUploadDescriptor};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod throttle;

pub use throttle::LaunchThrottle;

/// Step of the upload protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    Request,
    Submit,
    Finalize,
    Resolve,
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStep::Request => "request",
            UploadStep::Submit => "submit",
            UploadStep::Finalize => "finalize",
            UploadStep::Resolve => "resolve",
        };
        f.write_str(name)
    }
}

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload of {file} failed at {step} step: {source}")]
    Step {
        step: UploadStep,
        file: String,
        #[source]
        source: HostError,
    },

    #[error("Upload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl UploadError {
    /// Step the upload failed in, if it got that far
    pub fn step(&self) -> Option<UploadStep> {
        match self {
            UploadError::Step { step, .. } => Some(*step),
            UploadError::Task(_) => None,
        }
    }
}

/// An example that is reachable on the asset host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedAsset {
    #[serde(flatten)]
    pub image: ExampleImage,
    pub asset_id: String,
    /// Public, transformable URL
    pub url: String,
}

/// Progress of one upload
#[derive(Debug)]
pub enum UploadState {
    Requested(SignedUploadDescriptor),
    FormSubmitted { asset_id: String },
    Finalized { asset_id: String },
    Resolved(UploadedAsset),
}

/// Drives a single example through the upload protocol
#[derive(Debug, Clone)]
pub struct Uploader {
    host: AssetHostClient,
}

impl Uploader {
    pub fn new(host: AssetHostClient) -> Self {
        Self { host }
    }

    fn fail(step: UploadStep, image: &ExampleImage) -> impl FnOnce(HostError) -> UploadError {
        let file = image.file_name();
        move |source| UploadError::Step { step, file, source }
    }

    /// Upload `image` and resolve its public URL
    #[tracing::instrument(
        name = "upload.asset",
        skip_all,
        fields(file = %image.file_name(), size = %image.size_string()),
        err
    )]
    pub async fn upload(&self, image: &ExampleImage) -> Result<UploadedAsset, UploadError> {
        let mut state = self.start(image).await?;
        loop {
            state = match state {
                UploadState::Resolved(asset) => {
                    tracing::info!(url = %asset.url, "Upload resolved");
                    return Ok(asset);
                }
                other => self.advance(image, other).await?,
            };
        }
    }

    /// Enter the state machine by requesting a signed upload location
    pub async fn start(&self, image: &ExampleImage) -> Result<UploadState, UploadError> {
        let descriptor = self
            .host
            .request_upload(image)
            .await
            .map_err(Self::fail(UploadStep::Request, image))?;
        tracing::debug!(asset_id = %descriptor.id, field_count = descriptor.fields.len(), "Signed upload issued");
        Ok(UploadState::Requested(descriptor))
    }

    /// Perform the step that follows `state`
    pub async fn advance(
        &self,
        image: &ExampleImage,
        state: UploadState,
    ) -> Result<UploadState, UploadError> {
        match state {
            UploadState::Requested(descriptor) => {
                self.host
                    .submit_form(&descriptor, image)
                    .await
                    .map_err(Self::fail(UploadStep::Submit, image))?;
                Ok(UploadState::FormSubmitted {
                    asset_id: descriptor.id,
                })
            }
            UploadState::FormSubmitted { asset_id } => {
                let finished = match self.host.finish_upload(&asset_id).await {
                    Ok(finished) => finished,
                    Err(err) => {
                        if let HostError::Status { status, body } = &err {
                            tracing::error!(status, body = %body, "Finishing upload failed");
                        }
                        return Err(Self::fail(UploadStep::Finalize, image)(err));
                    }
                };
                Ok(UploadState::Finalized {
                    asset_id: finished.id.unwrap_or(asset_id),
                })
            }
            UploadState::Finalized { asset_id } => {
                let record = self
                    .host
                    .fetch_asset(&asset_id)
                    .await
                    .map_err(Self::fail(UploadStep::Resolve, image))?;
                Ok(UploadState::Resolved(UploadedAsset {
                    image: image.clone(),
                    url: self.host.public_url(&record.filename),
                    asset_id,
                }))
            }
            resolved @ UploadState::Resolved(_) => Ok(resolved),
        }
    }
}

/// Launches uploads at a fixed rate and joins them once all are started
#[derive(Debug, Clone)]
pub struct UploadOrchestrator {
    uploader: Uploader,
    launch_interval: Duration,
}

impl UploadOrchestrator {
    pub fn new(uploader: Uploader, launch_interval: Duration) -> Self {
        Self {
            uploader,
            launch_interval,
        }
    }

    /// Upload every example, preserving input order in the result.
    ///
    /// Launches are spaced by the launch interval but never wait for earlier
    /// uploads. All uploads run to completion before the first failure (in
    /// input order) is returned; nothing is retried or cancelled.
    pub async fn upload_all(
        &self,
        examples: Vec<ExampleImage>,
    ) -> Result<Vec<UploadedAsset>, UploadError> {
        tracing::info!(count = examples.len(), "Uploading assets");

        let mut throttle = LaunchThrottle::new(self.launch_interval);
        let mut handles = Vec::with_capacity(examples.len());
        for image in examples {
            throttle.ready().await;
            let uploader = self.uploader.clone();
            handles.push(tokio::spawn(async move { uploader.upload(&image).await }));
        }
        tracing::info!(launched = throttle.launched(), "All uploads launched");

        let results = futures::future::join_all(handles).await;

        let mut assets = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(Ok(asset)) => assets.push(asset),
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "Upload failed");
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    first_error.get_or_insert(UploadError::Task(join_err));
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                tracing::info!(count = assets.len(), "Finished upload");
                Ok(assets)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_display() {
        assert_eq!(UploadStep::Request.to_string(), "request");
        assert_eq!(UploadStep::Finalize.to_string(), "finalize");
    }

    #[test]
    fn test_error_reports_step() {
        let err = UploadError::Step {
            step: UploadStep::Submit,
            file: "a-1x1.png".into(),
            source: HostError::Status {
                status: 403,
                body: "denied".into(),
            },
        };
        assert_eq!(err.step(), Some(UploadStep::Submit));
        assert!(err.to_string().contains("submit step"));
    }
}
