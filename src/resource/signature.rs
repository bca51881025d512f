//! File signature (magic byte) validation.
//!
//! A file's leading bytes identify its real format regardless of the name it
//! was uploaded under, which defeats extension spoofing.

use crate::error::{GuardError, RejectReason, Result};
use super::path::extension_of;

const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const PDF_SIGNATURE: &[u8] = &[0x25, 0x50, 0x44, 0x46];
const ZIP_SIGNATURE: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const OLE2_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Bytes needed to check any known signature
pub const MAX_SIGNATURE_LEN: usize = 8;

/// Extensions accepted by the import-time check
pub const IMPORT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "pdf", "xlsx", "xls"];

/// File formats the guard knows how to verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Jpeg,
    Png,
    Pdf,
    /// Office Open XML workbook (ZIP container)
    Xlsx,
    /// Legacy Excel workbook (OLE2 compound document)
    Xls,
}

impl FileKind {
    /// Map a file extension (case-insensitive, without the dot)
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(FileKind::Jpeg),
            "png" => Some(FileKind::Png),
            "pdf" => Some(FileKind::Pdf),
            "xlsx" => Some(FileKind::Xlsx),
            "xls" => Some(FileKind::Xls),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileKind::Jpeg => "image/jpeg",
            FileKind::Png => "image/png",
            FileKind::Pdf => "application/pdf",
            FileKind::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            FileKind::Xls => "application/vnd.ms-excel",
        }
    }

    pub fn signature(&self) -> &'static [u8] {
        match self {
            FileKind::Jpeg => JPEG_SIGNATURE,
            FileKind::Png => PNG_SIGNATURE,
            FileKind::Pdf => PDF_SIGNATURE,
            FileKind::Xlsx => ZIP_SIGNATURE,
            FileKind::Xls => OLE2_SIGNATURE,
        }
    }

    /// Whether `bytes` starts with this kind's signature.
    ///
    /// A buffer shorter than the signature never matches.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(self.signature())
    }
}

/// Check `bytes` against the signature of the claimed extension.
///
/// Unknown extensions never validate.
pub fn validate_signature(bytes: &[u8], extension: &str) -> bool {
    FileKind::from_extension(extension).map_or(false, |kind| kind.matches(bytes))
}

/// Import-time check for uploaded files, which additionally accepts
/// spreadsheets. Returns the verified kind.
pub fn check_import(filename: &str, bytes: &[u8]) -> Result<FileKind> {
    let kind = extension_of(filename)
        .filter(|ext| IMPORT_EXTENSIONS.contains(&ext.as_str()))
        .and_then(|ext| FileKind::from_extension(&ext))
        .ok_or(GuardError::Forbidden(RejectReason::ExtensionNotAllowed))?;

    if !kind.matches(bytes) {
        return Err(GuardError::Forbidden(RejectReason::SignatureMismatch));
    }

    Ok(kind)
}
