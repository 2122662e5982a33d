//! `data:` URI handling for image attachments

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataUriError {
    #[error("image data must be a data URI (data:<mimetype>;base64,<data>)")]
    NotDataUri,
    #[error("image data URI must be base64 encoded")]
    NotBase64,
    #[error("image data URI is missing a MIME type")]
    MissingMimeType,
    #[error("image data URI payload is not valid base64: {0}")]
    InvalidPayload(String),
}

/// A borrowed view over `data:<mime>;base64,<payload>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime_type: &'a str,
    /// Still base64-encoded
    pub data: &'a str,
}

impl<'a> DataUri<'a> {
    /// Split a data URI into MIME type and base64 payload without decoding it.
    pub fn parse(uri: &'a str) -> Result<Self, DataUriError> {
        let rest = uri.strip_prefix("data:").ok_or(DataUriError::NotDataUri)?;
        let (header, data) = rest.split_once(',').ok_or(DataUriError::NotDataUri)?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or(DataUriError::NotBase64)?;
        // Ignore parameters such as `;charset=...` between the type and `;base64`
        let mime_type = mime_type.split(';').next().unwrap_or_default().trim();
        if mime_type.is_empty() {
            return Err(DataUriError::MissingMimeType);
        }
        Ok(Self { mime_type, data })
    }

    /// Decode the payload, returning the number of bytes it holds.
    pub fn decoded_len(&self) -> Result<usize, DataUriError> {
        STANDARD
            .decode(self.data)
            .map(|bytes| bytes.len())
            .map_err(|e| DataUriError::InvalidPayload(e.to_string()))
    }
}

/// Build a data URI from raw bytes.
pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Read an image file and encode it as a data URI, guessing the MIME type
/// from the file extension.
pub fn from_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(encode(mime.essence_str(), &bytes))
}
