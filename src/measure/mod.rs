//! Measurement runner
//!
//! Requests every uploaded asset through the transform endpoint at every
//! benchmark width, one request at a time, and times each full round trip
//! including the body download.

use crate::config::MeasureConfig;
use crate::corpus::ImageFormat;
use crate::upload::UploadedAsset;
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Measurement errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Transform request {url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// One timed transform request
#[derive(Debug, Clone, Serialize)]
pub struct TimingRecord {
    /// Benchmark width requested from the transform endpoint
    pub width: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Size of the drained response body
    pub bytes: u64,
    pub asset: UploadedAsset,
}

impl TimingRecord {
    pub fn elapsed_millis(&self) -> f64 {
        millis(self.elapsed)
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_micros() as f64 / 1000.0
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(millis(*elapsed))
}

/// Transform endpoint URL for `asset_url` at `width`
pub fn transform_url(asset_url: &str, width: u32, format: ImageFormat, quality: u8) -> String {
    format!(
        "{}/{width}x0/filters:format({format}):quality({quality})",
        asset_url.trim_end_matches('/')
    )
}

/// Sequential transform latency measurement
#[derive(Debug, Clone)]
pub struct MeasurementRunner {
    client: reqwest::Client,
    config: MeasureConfig,
}

impl MeasurementRunner {
    pub fn new(config: MeasureConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn with_client(client: reqwest::Client, config: MeasureConfig) -> Self {
        Self { client, config }
    }

    /// Time one transform request, from just before sending to the last body byte
    #[tracing::instrument(
        name = "measure.fetch",
        skip_all,
        fields(asset_id = %asset.asset_id, width = width, http.status_code = tracing::field::Empty),
        err
    )]
    pub async fn measure(
        &self,
        asset: &UploadedAsset,
        width: u32,
    ) -> Result<TimingRecord, FetchError> {
        let url = transform_url(&asset.url, width, self.config.format, self.config.quality);

        let start = Instant::now();
        let mut response = self.client.get(&url).send().await?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let mut bytes = 0u64;
        while let Some(chunk) = response.chunk().await? {
            bytes += chunk.len() as u64;
        }
        let elapsed = start.elapsed();

        let record = TimingRecord {
            width,
            elapsed,
            bytes,
            asset: asset.clone(),
        };
        tracing::debug!(elapsed_ms = record.elapsed_millis(), bytes, "Transform fetched");
        Ok(record)
    }

    /// Measure every asset at every benchmark width.
    ///
    /// The first failing request aborts the run and discards earlier records.
    pub async fn run(&self, assets: &[UploadedAsset]) -> Result<Vec<TimingRecord>, FetchError> {
        tracing::info!(
            assets = assets.len(),
            widths = self.config.benchmark_widths.len(),
            "Measuring transform latency"
        );

        let mut records = Vec::with_capacity(assets.len() * self.config.benchmark_widths.len());
        for asset in assets {
            for &width in &self.config.benchmark_widths {
                records.push(self.measure(asset, width).await?);
            }
        }
        Ok(records)
    }
}
