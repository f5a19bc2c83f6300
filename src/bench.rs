//! Benchmark pipeline
//!
//! corpus → uploads → measurements, built from one [`Config`].

use crate::config::Config;
use crate::corpus::{CorpusError, CorpusStore, ExampleGenerator, ImageCrateEncoder, VariantEncoder};
use crate::host::{AssetHostClient, HostError};
use crate::measure::{FetchError, MeasurementRunner, TimingRecord};
use crate::upload::{UploadError, UploadOrchestrator, Uploader};
use std::sync::Arc;
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum BenchError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to build asset host client: {0}")]
    Host(#[from] HostError),
}

/// A configured benchmark run
pub struct Benchmark {
    corpus: CorpusStore,
    uploads: UploadOrchestrator,
    runner: MeasurementRunner,
}

impl Benchmark {
    /// Build the pipeline with the `image` crate encoder
    pub fn new(config: &Config) -> Result<Self, BenchError> {
        Self::with_encoder(config, Arc::new(ImageCrateEncoder))
    }

    /// Build the pipeline with a custom encoder
    pub fn with_encoder(
        config: &Config,
        encoder: Arc<dyn VariantEncoder>,
    ) -> Result<Self, BenchError> {
        let generator = ExampleGenerator::new(encoder, config.corpus.source_widths.clone());
        let corpus = CorpusStore::new(
            config.corpus.source_dir.clone(),
            config.corpus.example_dir.clone(),
            generator,
        );

        let host = AssetHostClient::new(config.host.clone())?;
        let uploads =
            UploadOrchestrator::new(Uploader::new(host), config.upload.launch_interval());
        let runner = MeasurementRunner::new(config.measure.clone())?;

        Ok(Self {
            corpus,
            uploads,
            runner,
        })
    }

    /// Run every phase; any failure aborts the run and no records are kept
    pub async fn run(&self) -> Result<Vec<TimingRecord>, BenchError> {
        let examples = self.corpus.load_or_build().await?;
        let assets = self.uploads.upload_all(examples).await?;
        let records = self.runner.run(&assets).await?;
        Ok(records)
    }
}
