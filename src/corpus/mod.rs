//! Example corpus
//!
//! Owns the on-disk example directory. A directory that already exists is
//! reused by parsing its file names (`<base>-<width>x<height>.<ext>`); a missing
//! directory is populated by the [`ExampleGenerator`].

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

pub mod encoder;
pub mod generator;

pub use encoder::{EncodeError, ImageCrateEncoder, VariantEncoder};
pub use generator::ExampleGenerator;

lazy_static! {
    // Greedy base keeps the size segment after the last '-'.
    static ref EXAMPLE_NAME_RE: regex_lite::Regex =
        regex_lite::Regex::new(r"^(.+)-(\d+)x(\d+)\.([A-Za-z]+)$")
            .expect("example name pattern is valid");
}

/// Corpus errors
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Sources {} and {} share the example base name {base}", first.display(), second.display())]
    DuplicateSource {
        base: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to encode {}: {source}", path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },
}

impl CorpusError {
    pub(crate) fn filesystem(path: &Path, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Encodings an example can be stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Webp,
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 3] = [ImageFormat::Webp, ImageFormat::Png, ImageFormat::Jpeg];

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Webp => "webp",
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Webp => "image/webp",
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "webp" => Some(ImageFormat::Webp),
            "png" => Some(ImageFormat::Png),
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One generated benchmark input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExampleImage {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub path: PathBuf,
}

impl ExampleImage {
    /// File name following the corpus convention
    pub fn file_name_for(base: &str, width: u32, height: u32, format: ImageFormat) -> String {
        format!("{base}-{width}x{height}.{}", format.extension())
    }

    /// Name of the file on disk
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `"WxH"`, as announced to the asset host
    pub fn size_string(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Rebuild an [`ExampleImage`] from a corpus file path.
///
/// Returns `None` when the name does not follow `<base>-<width>x<height>.<ext>`,
/// when either dimension is zero, or when the extension is not a supported
/// format.
pub fn parse_example_file_name(path: &Path) -> Option<ExampleImage> {
    let name = path.file_name()?.to_str()?;
    let caps = EXAMPLE_NAME_RE.captures(name)?;

    let width: u32 = caps[2].parse().ok()?;
    let height: u32 = caps[3].parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    let format = ImageFormat::from_extension(&caps[4])?;

    Some(ExampleImage {
        width,
        height,
        format,
        path: path.to_path_buf(),
    })
}

/// Local example directory, reused when present and generated otherwise
pub struct CorpusStore {
    source_dir: PathBuf,
    example_dir: PathBuf,
    generator: ExampleGenerator,
}

impl CorpusStore {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        example_dir: impl Into<PathBuf>,
        generator: ExampleGenerator,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            example_dir: example_dir.into(),
            generator,
        }
    }

    /// Return the corpus, generating it first if the directory is absent.
    ///
    /// Only `NotFound` triggers generation. Any other failure to open the
    /// directory (permissions, not a directory) is returned as is.
    pub async fn load_or_build(&self) -> Result<Vec<ExampleImage>, CorpusError> {
        match fs::read_dir(&self.example_dir).await {
            Ok(entries) => self.load(entries).await,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.generator
                    .generate(&self.source_dir, &self.example_dir)
                    .await
            }
            Err(e) => Err(CorpusError::filesystem(&self.example_dir, e)),
        }
    }

    async fn load(&self, mut entries: fs::ReadDir) -> Result<Vec<ExampleImage>, CorpusError> {
        let mut examples = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CorpusError::filesystem(&self.example_dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CorpusError::filesystem(&path, e))?;
            if !file_type.is_file() {
                continue;
            }

            match parse_example_file_name(&path) {
                Some(example) => examples.push(example),
                None => tracing::warn!(path = %path.display(), "Skipping unrecognised corpus file"),
            }
        }

        examples.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!(
            dir = %self.example_dir.display(),
            count = examples.len(),
            "Reusing existing examples"
        );

        Ok(examples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_round_trip() {
        for format in ImageFormat::ALL {
            let name = ExampleImage::file_name_for("photo", 1080, 721, format);
            let path = Path::new("/corpus").join(&name);
            let parsed = parse_example_file_name(&path).unwrap();

            assert_eq!(parsed.width, 1080);
            assert_eq!(parsed.height, 721);
            assert_eq!(parsed.format, format);
            assert_eq!(parsed.file_name(), name);
        }
    }

    #[test]
    fn test_base_with_dashes_uses_last_segment() {
        let parsed = parse_example_file_name(Path::new("my-holiday-pic-2048x1365.png")).unwrap();
        assert_eq!(parsed.width, 2048);
        assert_eq!(parsed.height, 1365);
        assert_eq!(parsed.format, ImageFormat::Png);
    }

    #[test]
    fn test_jpg_extension_accepted() {
        let parsed = parse_example_file_name(Path::new("a-10x20.JPG")).unwrap();
        assert_eq!(parsed.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_rejects_malformed_names() {
        assert!(parse_example_file_name(Path::new(".DS_Store")).is_none());
        // Provisional name written before the height is known
        assert!(parse_example_file_name(Path::new("photo-1080.webp")).is_none());
        assert!(parse_example_file_name(Path::new("photo-0x10.webp")).is_none());
        assert!(parse_example_file_name(Path::new("photo-10x10.gif")).is_none());
        assert!(parse_example_file_name(Path::new("photo-10x10")).is_none());
    }

    #[test]
    fn test_size_string() {
        let example = ExampleImage {
            width: 640,
            height: 480,
            format: ImageFormat::Webp,
            path: PathBuf::from("x-640x480.webp"),
        };
        assert_eq!(example.size_string(), "640x480");
    }

    #[test]
    fn test_format_serde_lowercase() {
        let json = serde_json::to_string(&ImageFormat::Jpeg).unwrap();
        assert_eq!(json, "\"jpeg\"");
        let parsed: ImageFormat = serde_json::from_str("\"jpg\"").unwrap();
        assert_eq!(parsed, ImageFormat::Jpeg);
    }
}
