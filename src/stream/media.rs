//! Media eligibility and content handling
//!
//! Decides which files can be shown, pulls the still image out of live
//! photos and sniffs the final MIME type.

use image::ImageFormat;
use std::io::{Cursor, Read};
use thiserror::Error;

use crate::models::{DecryptedFileRecord, FileType};

/// Files larger than this are never fetched
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Extensions the display surface cannot render
const UNRENDERABLE_EXTENSIONS: &[&str] = &[
    "heic", "heif", "raw", "arw", "cr2", "cr3", "crw", "dng", "nef", "nrw", "orf", "pef", "raf",
    "rw2", "srw", "tif", "tiff", "psd", "jxl",
];

/// Video extensions found inside live photo archives
const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v", "avi", "webm", "3gp", "mkv"];

/// Media error types
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Could not determine image format")]
    UnknownFormat,

    #[error("Live photo archive is invalid: {0}")]
    LivePhoto(String),
}

/// Why a record was left out of the slideshow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    NotAnImage,
    TooLarge,
    UnrenderableExtension,
}

/// Check type, size and extension
pub fn check_eligibility(record: &DecryptedFileRecord, max_size: u64) -> Result<(), Ineligible> {
    if !record.metadata.file_type.is_displayable() {
        return Err(Ineligible::NotAnImage);
    }
    if record.size.is_some_and(|size| size > max_size) {
        return Err(Ineligible::TooLarge);
    }
    if let Some(ext) = record.extension() {
        if UNRENDERABLE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Ineligible::UnrenderableExtension);
        }
    }
    Ok(())
}

/// Eligibility with the default size ceiling
pub fn is_file_eligible(record: &DecryptedFileRecord) -> bool {
    check_eligibility(record, MAX_FILE_SIZE).is_ok()
}

/// Reduce decrypted content to displayable image bytes
pub fn image_bytes(file_type: FileType, content: Vec<u8>) -> Result<Vec<u8>, MediaError> {
    match file_type {
        FileType::LivePhoto => extract_live_photo_image(&content),
        _ => Ok(content),
    }
}

/// Live photos are zip archives holding an image and a video.
/// Prefer an entry marked `.image.`, else the first non-video entry.
pub fn extract_live_photo_image(archive: &[u8]) -> Result<Vec<u8>, MediaError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| MediaError::LivePhoto(e.to_string()))?;

    let mut fallback = None;
    let mut chosen = None;
    for i in 0..zip.len() {
        let entry = zip
            .by_index(i)
            .map_err(|e| MediaError::LivePhoto(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_ascii_lowercase();
        if name.contains(".image.") || name.starts_with("image.") {
            chosen = Some(i);
            break;
        }
        let is_video = name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| VIDEO_EXTENSIONS.contains(&ext));
        if !is_video && fallback.is_none() {
            fallback = Some(i);
        }
    }

    let index = chosen
        .or(fallback)
        .ok_or_else(|| MediaError::LivePhoto("no image component".into()))?;
    let mut entry = zip
        .by_index(index)
        .map_err(|e| MediaError::LivePhoto(e.to_string()))?;
    if entry.size() > MAX_FILE_SIZE {
        return Err(MediaError::LivePhoto(format!(
            "image component claims {} bytes",
            entry.size()
        )));
    }

    // Sizes in the archive are sender-supplied; the buffer only trusts the input length
    let mut bytes = Vec::with_capacity(entry.compressed_size().min(archive.len() as u64) as usize);
    entry
        .by_ref()
        .take(MAX_FILE_SIZE + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| MediaError::LivePhoto(e.to_string()))?;
    if bytes.len() as u64 > MAX_FILE_SIZE {
        return Err(MediaError::LivePhoto("image component exceeds size limit".into()));
    }
    Ok(bytes)
}

/// MIME type from magic bytes, falling back to the title's extension
pub fn detect_mime_type(bytes: &[u8], extension: Option<&str>) -> Result<&'static str, MediaError> {
    let sniffed = match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Some("image/png"),
        Ok(ImageFormat::Jpeg) => Some("image/jpeg"),
        Ok(ImageFormat::Gif) => Some("image/gif"),
        Ok(ImageFormat::WebP) => Some("image/webp"),
        Ok(ImageFormat::Bmp) => Some("image/bmp"),
        Ok(ImageFormat::Ico) => Some("image/x-icon"),
        Ok(ImageFormat::Avif) => Some("image/avif"),
        _ => None,
    };
    if let Some(mime) = sniffed {
        return Ok(mime);
    }

    match extension {
        Some("jpg" | "jpeg") => Ok("image/jpeg"),
        Some("png") => Ok("image/png"),
        Some("gif") => Ok("image/gif"),
        Some("webp") => Ok("image/webp"),
        Some("bmp") => Ok("image/bmp"),
        Some("avif") => Ok("image/avif"),
        Some("svg") => Ok("image/svg+xml"),
        _ => Err(MediaError::UnknownFormat),
    }
}
