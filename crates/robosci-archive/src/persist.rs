//! Crash-safe archive persistence.
//!
//! An archive is written as a JSON envelope carrying a format version, the
//! save time and a SHA-256 digest of the serialized archive body. Writes go
//! to a temp file in the target directory first and are renamed into place,
//! so a reader never sees a half-written file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::info;

use crate::archive::Archive;
use crate::error::{ArchiveError, Result};

pub const FORMAT_VERSION: u32 = 1;

/// `archive_<year>_<month>_<day>_<hour>_<minute>_<second>_<suffix>`
pub fn archive_file_name(saved_at: DateTime<Utc>, suffix: &str) -> String {
    format!("archive_{}_{}", saved_at.format("%Y_%m_%d_%H_%M_%S"), suffix)
}

/// SHA-256 hex digest of the archive's JSON body.
pub fn content_digest(archive: &Archive) -> Result<String> {
    let body = serde_json::to_vec(archive)?;
    Ok(hex::encode(Sha256::digest(&body)))
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    saved_at: DateTime<Utc>,
    suffix: &'a str,
    content_digest: &'a str,
    archive: &'a Archive,
}

#[derive(Deserialize)]
struct Envelope {
    format_version: u32,
    saved_at: DateTime<Utc>,
    suffix: String,
    content_digest: String,
    archive: Archive,
}

/// Where and under which digest an archive was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArchive {
    pub path: PathBuf,
    pub content_digest: String,
}

/// A verified archive read back from disk.
#[derive(Debug)]
pub struct LoadedArchive {
    pub archive: Archive,
    pub saved_at: DateTime<Utc>,
    pub suffix: String,
    pub content_digest: String,
}

/// Write `archive` into `dir`, named after the current time and `suffix`.
pub fn save_archive(archive: &Archive, dir: &Path, suffix: &str) -> Result<PersistedArchive> {
    fs::create_dir_all(dir)?;

    let saved_at = Utc::now();
    let path = dir.join(archive_file_name(saved_at, suffix));
    let digest = content_digest(archive)?;

    let envelope = EnvelopeRef {
        format_version: FORMAT_VERSION,
        saved_at,
        suffix,
        content_digest: &digest,
        archive,
    };
    let bytes = serde_json::to_vec_pretty(&envelope)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&path).map_err(|e| e.error)?;

    info!(
        path = %path.display(),
        digest = %digest,
        events = archive.development_history().len(),
        "archive persisted"
    );

    Ok(PersistedArchive {
        path,
        content_digest: digest,
    })
}

/// Read and verify an archive written by [`save_archive`].
pub fn load_archive(path: &Path) -> Result<LoadedArchive> {
    let bytes = fs::read(path)?;
    let envelope: Envelope = serde_json::from_slice(&bytes)?;

    if envelope.format_version != FORMAT_VERSION {
        return Err(ArchiveError::UnsupportedFormat(envelope.format_version));
    }

    let actual = content_digest(&envelope.archive)?;
    if actual != envelope.content_digest {
        return Err(ArchiveError::DigestMismatch {
            expected: envelope.content_digest,
            actual,
        });
    }

    Ok(LoadedArchive {
        archive: envelope.archive,
        saved_at: envelope.saved_at,
        suffix: envelope.suffix,
        content_digest: actual,
    })
}
