//! Shared test helpers: a fake encoder and asset host fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use transform_bench::config::{HostConfig, MeasureConfig};
use transform_bench::corpus::{EncodeError, ExampleImage, ImageFormat, VariantEncoder};
use wiremock::MockServer;

pub const SPACE_ID: &str = "247220";
pub const TOKEN: &str = "test-token";

/// Encoder that writes a marker file and reports `width / 2` as height
#[derive(Default)]
pub struct FakeEncoder {
    calls: AtomicUsize,
    fail_on: Option<ImageFormat>,
}

impl FakeEncoder {
    pub fn failing_on(format: ImageFormat) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: Some(format),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VariantEncoder for FakeEncoder {
    async fn encode(
        &self,
        source: &Path,
        width: u32,
        format: ImageFormat,
        _quality: Option<u8>,
        output: &Path,
    ) -> Result<u32, EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(format) {
            return Err(EncodeError::EmptySource);
        }
        tokio::fs::write(output, format!("{}:{width}:{format}", source.display())).await?;
        Ok((width / 2).max(1))
    }
}

/// Write `names` as (empty) source files into `dir`
pub fn write_sources(dir: &Path, names: &[&str]) {
    for name in names {
        std::fs::write(dir.join(name), b"source").unwrap();
    }
}

/// Host configuration pointed at a mock server
pub fn host_config(server: &MockServer) -> HostConfig {
    HostConfig {
        api_base_url: server.uri(),
        space_id: SPACE_ID.to_string(),
        auth_token: TOKEN.to_string(),
        ..HostConfig::default()
    }
}

pub fn measure_config(widths: &[u32]) -> MeasureConfig {
    MeasureConfig {
        benchmark_widths: widths.to_vec(),
        ..MeasureConfig::default()
    }
}

/// Write a small example file following the corpus naming convention
pub fn write_example(dir: &Path, base: &str, width: u32, height: u32, format: ImageFormat) -> ExampleImage {
    let path = dir.join(ExampleImage::file_name_for(base, width, height, format));
    std::fs::write(&path, format!("{base} pixels")).unwrap();
    ExampleImage {
        width,
        height,
        format,
        path,
    }
}

pub fn assets_path() -> String {
    format!("/v1/spaces/{SPACE_ID}/assets/")
}

pub fn asset_path(id: &str) -> String {
    format!("/v1/spaces/{SPACE_ID}/assets/{id}")
}

pub fn finish_path(id: &str) -> String {
    format!("/v1/spaces/{SPACE_ID}/assets/{id}/finish_upload")
}
