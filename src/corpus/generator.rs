//! Example generator
//!
//! Renders every source image at every configured width in three formats.
//! A variant is first written under a provisional name (`<base>-<width>.<ext>`)
//! because its height is only known once encoding finishes, then renamed to the
//! corpus convention so that every file left in the directory parses back.

use super::{CorpusError, ExampleImage, ImageFormat, VariantEncoder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// The three sibling variants produced per (source, width) pair
pub const VARIANTS: [(ImageFormat, Option<u8>); 3] = [
    (ImageFormat::Webp, None),
    (ImageFormat::Png, Some(80)),
    (ImageFormat::Jpeg, None),
];

/// One-shot corpus generator
#[derive(Clone)]
pub struct ExampleGenerator {
    encoder: Arc<dyn VariantEncoder>,
    source_widths: Vec<u32>,
}

impl ExampleGenerator {
    pub fn new(encoder: Arc<dyn VariantEncoder>, source_widths: Vec<u32>) -> Self {
        Self {
            encoder,
            source_widths,
        }
    }

    /// Generate the corpus into `output_dir`, which must not exist yet.
    ///
    /// Any encoder failure aborts the whole run; files written before the
    /// failure are left in place.
    #[tracing::instrument(
        name = "corpus.generate",
        skip_all,
        fields(source_dir = %source_dir.display(), output_dir = %output_dir.display()),
        err
    )]
    pub async fn generate(
        &self,
        source_dir: &Path,
        output_dir: &Path,
    ) -> Result<Vec<ExampleImage>, CorpusError> {
        tracing::info!("Generating examples");

        let sources = list_sources(source_dir).await?;
        let sources = base_names(sources)?;

        if let Some(parent) = output_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CorpusError::filesystem(parent, e))?;
        }
        fs::create_dir(output_dir)
            .await
            .map_err(|e| CorpusError::filesystem(output_dir, e))?;

        let mut examples =
            Vec::with_capacity(sources.len() * self.source_widths.len() * VARIANTS.len());

        for (source, base) in &sources {
            tracing::info!(file = %source.display(), "Rendering source image");

            for &width in &self.source_widths {
                let [(f0, q0), (f1, q1), (f2, q2)] = VARIANTS;
                let (a, b, c) = tokio::try_join!(
                    self.render(source, base, width, f0, q0, output_dir),
                    self.render(source, base, width, f1, q1, output_dir),
                    self.render(source, base, width, f2, q2, output_dir),
                )?;
                examples.extend([a, b, c]);
            }
        }

        tracing::info!(count = examples.len(), "Finished generating examples");
        Ok(examples)
    }

    async fn render(
        &self,
        source: &Path,
        base: &str,
        width: u32,
        format: ImageFormat,
        quality: Option<u8>,
        output_dir: &Path,
    ) -> Result<ExampleImage, CorpusError> {
        let provisional = output_dir.join(format!("{base}-{width}.{}", format.extension()));

        let height = self
            .encoder
            .encode(source, width, format, quality, &provisional)
            .await
            .map_err(|source_err| CorpusError::Encoding {
                path: source.to_path_buf(),
                source: source_err,
            })?;
        if height == 0 {
            return Err(CorpusError::Encoding {
                path: source.to_path_buf(),
                source: super::EncodeError::EmptySource,
            });
        }

        let path = output_dir.join(ExampleImage::file_name_for(base, width, height, format));
        fs::rename(&provisional, &path)
            .await
            .map_err(|e| CorpusError::filesystem(&provisional, e))?;

        tracing::debug!(path = %path.display(), "Rendered example");

        Ok(ExampleImage {
            width,
            height,
            format,
            path,
        })
    }
}

/// Pair each source with its example base name.
///
/// Examples are named after the file stem, so `a.png` and `a.jpg` would
/// overwrite each other's variants.
fn base_names(sources: Vec<PathBuf>) -> Result<Vec<(PathBuf, String)>, CorpusError> {
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut named = Vec::with_capacity(sources.len());

    for source in sources {
        let base = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(first) = seen.get(&base) {
            return Err(CorpusError::DuplicateSource {
                base,
                first: first.clone(),
                second: source,
            });
        }
        seen.insert(base.clone(), source.clone());
        named.push((source, base));
    }

    Ok(named)
}

/// Regular files of the source directory, in file name order
async fn list_sources(source_dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let mut entries = fs::read_dir(source_dir)
        .await
        .map_err(|e| CorpusError::filesystem(source_dir, e))?;

    let mut sources = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CorpusError::filesystem(source_dir, e))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| CorpusError::filesystem(&path, e))?;
        if file_type.is_file() {
            sources.push(path);
        }
    }

    sources.sort();
    Ok(sources)
}
