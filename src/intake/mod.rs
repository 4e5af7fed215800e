//! Image intake: files in, ordered inline-image records out.
//!
//! Dispatch is by declared content type: `application/pdf` is rasterized
//! (page one only), `image/*` is encoded as-is, anything else is skipped with
//! a notice. Intake order is preserved so "image 1, image 2, ..." in a prompt
//! matches the request parts.

pub mod encode;
pub mod pdf;

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

pub use encode::encode_image;
pub use pdf::{PageRasterizer, PdftoppmRasterizer, UnavailableRasterizer, rasterize_first_page};

use crate::config::IntakeConfig;
use crate::error::TexSauceError;

/// A file offered for intake, with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    /// Location on disk.
    pub path: PathBuf,
    /// Display name, usually the file name.
    pub name: String,
    /// Declared mime type.
    pub mime_type: String,
}

impl IncomingFile {
    /// Create from explicit parts.
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Create from a path, declaring the type from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_from_extension(path);
        Self::new(path, name, mime_type)
    }
}

/// Declared mime type for a path, by extension.
pub fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// How a file will be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Rasterize page one.
    Pdf,
    /// Encode as-is.
    Image,
    /// Skip with a notice.
    Unsupported,
}

/// Classify a declared mime type.
pub fn classify(mime_type: &str) -> FileKind {
    if mime_type == "application/pdf" {
        FileKind::Pdf
    } else if mime_type.starts_with("image/") {
        FileKind::Image
    } else {
        FileKind::Unsupported
    }
}

/// An intake-normalized image waiting for the next generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    /// Session-unique id.
    pub id: String,
    /// The file it came from.
    pub source: IncomingFile,
    /// Base64 payload sent inline.
    pub base64_data: String,
    /// Mime type of the payload (`image/jpeg` for rasterized PDFs).
    pub mime_type: String,
    /// `data:` URI for previews.
    pub preview_data_uri: String,
}

impl PendingImage {
    /// Wrap an encoded payload with a fresh id.
    pub fn new(source: IncomingFile, base64_data: String, mime_type: String) -> Self {
        let preview_data_uri = encode::data_uri(&mime_type, &base64_data);
        Self {
            id: format!("img-{}", Uuid::new_v4().simple()),
            source,
            base64_data,
            mime_type,
            preview_data_uri,
        }
    }
}

/// Per-file feedback from an intake batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeNotice {
    /// The file type is neither image nor PDF; the file was skipped.
    Unsupported {
        /// File name.
        file: String,
    },
    /// Reading, rasterizing or encoding failed; the file was skipped.
    Failed {
        /// File name.
        file: String,
        /// Failure description.
        reason: String,
    },
    /// A PDF was reduced to its first page.
    PdfFirstPage {
        /// File name.
        file: String,
    },
}

impl std::fmt::Display for IntakeNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported { file } => write!(f, "unsupported file format: {file}"),
            Self::Failed { file, reason } => write!(f, "could not load {file}: {reason}"),
            Self::PdfFirstPage { file } => write!(f, "PDF loaded: {file} (page 1)"),
        }
    }
}

/// Outcome of [`ImageIntake::ingest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeReport {
    /// Ids of the images added, in order.
    pub added: Vec<String>,
    /// Per-file notices.
    pub notices: Vec<IntakeNotice>,
}

/// Ordered list of pending images for the current session.
#[derive(Debug, Clone)]
pub struct ImageIntake {
    images: Vec<PendingImage>,
    pdf_scale: f32,
    jpeg_quality: u8,
}

impl Default for ImageIntake {
    fn default() -> Self {
        Self::new(&IntakeConfig::default())
    }
}

impl ImageIntake {
    /// Create an empty intake with the configured PDF settings.
    pub fn new(config: &IntakeConfig) -> Self {
        Self {
            images: Vec::new(),
            pdf_scale: config.pdf_scale,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Process `files` in order and append the results.
    ///
    /// A failing file is reported and skipped; the rest still go through.
    pub async fn ingest(
        &mut self,
        files: Vec<IncomingFile>,
        rasterizer: &dyn PageRasterizer,
    ) -> IntakeReport {
        let mut report = IntakeReport::default();
        for file in files {
            let result = match classify(&file.mime_type) {
                FileKind::Pdf => {
                    rasterize_first_page(&file, rasterizer, self.pdf_scale, self.jpeg_quality)
                        .await
                        .inspect(|_| {
                            report.notices.push(IntakeNotice::PdfFirstPage {
                                file: file.name.clone(),
                            });
                        })
                }
                FileKind::Image => encode_image(&file).await,
                FileKind::Unsupported => {
                    Err(TexSauceError::UnsupportedInput(file.mime_type.clone()))
                }
            };

            match result {
                Ok(image) => {
                    report.added.push(image.id.clone());
                    self.images.push(image);
                }
                Err(TexSauceError::UnsupportedInput(mime)) => {
                    warn!(file = %file.name, %mime, "unsupported file format");
                    report.notices.push(IntakeNotice::Unsupported { file: file.name });
                }
                Err(e) => {
                    warn!(file = %file.name, "intake failed: {e}");
                    report.notices.push(IntakeNotice::Failed {
                        file: file.name,
                        reason: e.message(),
                    });
                }
            }
        }
        info!(
            added = report.added.len(),
            pending = self.images.len(),
            "intake batch processed"
        );
        report
    }

    /// Append an already-encoded image.
    pub fn push(&mut self, image: PendingImage) {
        self.images.push(image);
    }

    /// Remove one image by id. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.images.len();
        self.images.retain(|img| img.id != id);
        self.images.len() != before
    }

    /// Drop every pending image.
    pub fn clear(&mut self) {
        self.images.clear();
    }

    /// Pending images in intake order.
    pub fn images(&self) -> &[PendingImage] {
        &self.images
    }

    /// Number of pending images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
