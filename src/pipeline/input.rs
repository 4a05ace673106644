//! Input resolution: turn a path or an uploaded byte buffer into a local,
//! validated PDF file.
//!
//! pdfium requires a file-system path, so uploaded bytes are written into a
//! `TempDir` that lives as long as the [`ResolvedInput`]. The PDF magic
//! bytes (`%PDF`) are checked up front so callers get a meaningful error
//! rather than a pdfium crash.

use crate::error::PdfGridError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A local path, or uploaded bytes written to disk.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input arrived as bytes; written to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Uploaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Uploaded { path, .. } => path,
        }
    }
}

/// Resolve a local file path, validating existence and PDF magic bytes.
pub fn resolve_local(path: impl AsRef<Path>) -> Result<ResolvedInput, PdfGridError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(PdfGridError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != PDF_MAGIC {
                return Err(PdfGridError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PdfGridError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(PdfGridError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Write uploaded bytes to a managed temp file and validate them.
pub fn resolve_bytes(bytes: &[u8]) -> Result<ResolvedInput, PdfGridError> {
    let temp_dir = TempDir::new().map_err(|e| PdfGridError::Internal(format!("tempdir: {e}")))?;
    let path = temp_dir.path().join("upload.pdf");

    if bytes.len() >= 4 && &bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(PdfGridError::NotAPdf { path, magic });
    }

    std::fs::write(&path, bytes)
        .map_err(|e| PdfGridError::Internal(format!("Failed to write temp file: {}", e)))?;

    debug!("Uploaded PDF staged at: {}", path.display());
    Ok(ResolvedInput::Uploaded {
        path,
        _temp_dir: temp_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_local("/definitely/not/here.pdf").err().unwrap();
        assert!(matches!(err, PdfGridError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04zip").unwrap();
        match resolve_local(&path).err().unwrap() {
            PdfGridError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ok.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        let resolved = resolve_local(&path).unwrap();
        assert_eq!(resolved.path(), path.as_path());
    }

    #[test]
    fn uploaded_bytes_live_until_drop() {
        let resolved = resolve_bytes(b"%PDF-1.4\n%%EOF").unwrap();
        let path = resolved.path().to_path_buf();
        assert!(path.exists());
        drop(resolved);
        assert!(!path.exists());
    }

    #[test]
    fn uploaded_non_pdf_is_rejected() {
        assert!(matches!(
            resolve_bytes(b"\x89PNG\r\n").err().unwrap(),
            PdfGridError::NotAPdf { .. }
        ));
    }
}
