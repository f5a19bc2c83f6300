//! transform-bench Library
//!
//! Latency benchmark for the on-the-fly image transform endpoint of an asset
//! host.
//!
//! # Pipeline
//!
//! - **Corpus**: renders source images at several widths as WebP, PNG and
//!   JPEG, or reuses a previously generated example directory
//! - **Upload**: pushes every example through the host's signed upload
//!   protocol at a fixed launch rate
//! - **Measure**: fetches each asset through the transform endpoint at every
//!   benchmark width and records the round-trip time
//!
//! # Example
//!
//! ```no_run
//! use transform_bench::{bench::Benchmark, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("bench.yaml")?;
//!     config.validate()?;
//!     let records = Benchmark::new(&config)?.run().await?;
//!     for record in records {
//!         println!("{} {}", record.elapsed_millis(), record.asset.url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bench;
pub mod config;
pub mod corpus;
pub mod host;
pub mod measure;
pub mod telemetry;
pub mod upload;

// Re-export commonly used types
pub use bench::{BenchError, Benchmark};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
