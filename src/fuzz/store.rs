//! Content store: persists hit bodies to the output directory.
//!
//! Every body is streamed into a hidden `.name.part` file next to its final
//! path, checked against the declared Content-Length, then renamed into place.
//! A failed or aborted write removes the partial file, so a final path only
//! ever holds a complete body.
//!
//! Destination names are reserved through a concurrent index. Two hits never
//! share a path and the rest of the store needs no lock.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::{DashMap, DashSet};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::client::ProbeResponse;
use super::error::{ConfigError, StoreError};
use super::filename::{derive_filename, split_extension};

/// Lifecycle of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Body is being written to its temporary file.
    InProgress,
    /// Body is at its final path.
    Complete,
    /// Write failed; nothing is left at the final path.
    Failed,
}

/// Bookkeeping for the persisted content of one hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    /// URL the body was fetched from.
    pub url: String,
    /// Final on-disk path.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
    /// Hex SHA-256 of the body, once complete.
    pub sha256: Option<String>,
    /// Earlier file in this run with identical content.
    pub duplicate_of: Option<PathBuf>,
    /// Current state.
    pub state: DownloadState,
    /// Failure detail.
    pub error: Option<String>,
}

impl DownloadRecord {
    fn in_progress(url: impl Into<String>, path: PathBuf) -> Self {
        Self {
            url: url.into(),
            path,
            bytes: 0,
            sha256: None,
            duplicate_of: None,
            state: DownloadState::InProgress,
            error: None,
        }
    }

    fn complete(mut self, bytes: u64, sha256: String) -> Self {
        self.bytes = bytes;
        self.sha256 = Some(sha256);
        self.state = DownloadState::Complete;
        self
    }

    fn fail(mut self, error: &StoreError) -> Self {
        self.state = DownloadState::Failed;
        self.error = Some(error.to_string());
        self
    }

    /// Whether the body reached its final path.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == DownloadState::Complete
    }
}

/// Removes a temporary file unless disarmed; covers errors and aborted tasks.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Output directory plus the synchronized indexes for name collisions and
/// content duplicates.
pub struct ContentStore {
    root: PathBuf,
    reserved: DashSet<PathBuf>,
    next_suffix: DashMap<String, usize>,
    by_hash: DashMap<String, PathBuf>,
}

impl fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStore")
            .field("root", &self.root)
            .field("reserved", &self.reserved.len())
            .field("unique_bodies", &self.by_hash.len())
            .finish()
    }
}

impl ContentStore {
    /// Opens (creating if absent) the output directory and checks it is writable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutputDirectory`] if the directory cannot be
    /// created or a file cannot be written inside it.
    #[instrument(level = "debug", skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| ConfigError::output_directory(&root, e))?;

        let probe = root.join(format!(".driller-write-probe-{}", std::process::id()));
        std::fs::write(&probe, b"").map_err(|e| ConfigError::output_directory(&root, e))?;
        let _ = std::fs::remove_file(&probe);

        debug!("content store ready");
        Ok(Self {
            root,
            reserved: DashSet::new(),
            next_suffix: DashMap::new(),
            by_hash: DashMap::new(),
        })
    }

    /// The output directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserves a unique destination path for a hit's body.
    ///
    /// The first hit for a name gets `name.ext`, later ones `name_2.ext`,
    /// `name_3.ext` and so on. Paths already on disk are skipped, so an
    /// earlier run's files are never overwritten.
    #[must_use]
    pub fn reserve_path(&self, url: &Url, content_type: Option<&str>) -> PathBuf {
        let filename = derive_filename(url, content_type);
        let (stem, ext) = split_extension(&filename);

        let mut suffix = self.next_suffix.get(&filename).map_or(1, |s| *s);
        loop {
            let candidate = if suffix == 1 {
                self.root.join(&filename)
            } else {
                self.root.join(format!("{stem}_{suffix}{ext}"))
            };
            suffix += 1;

            if candidate.exists() || !self.reserved.insert(candidate.clone()) {
                continue;
            }
            self.next_suffix
                .entry(filename.clone())
                .and_modify(|next| *next = (*next).max(suffix))
                .or_insert(suffix);
            return candidate;
        }
    }

    fn release(&self, path: &Path) {
        self.reserved.remove(path);
    }

    /// Builds a failed record for a hit whose body could not be fetched at all.
    #[must_use]
    pub fn record_failure(&self, url: &Url, error: &StoreError) -> DownloadRecord {
        let path = self.root.join(derive_filename(url, None));
        DownloadRecord::in_progress(url.as_str(), path).fail(error)
    }

    /// Persists a hit's response body. Never fails: errors produce a
    /// [`DownloadState::Failed`] record.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn persist(&self, url: &Url, response: ProbeResponse) -> DownloadRecord {
        let path = self.reserve_path(url, response.content_type.as_deref());
        let expected = response.content_length;
        let stream = response.response.bytes_stream();

        match self
            .persist_stream(url.as_str(), path.clone(), expected, stream)
            .await
        {
            Ok(record) => record,
            Err(error) => {
                warn!(url = %url, path = %path.display(), error = %error, "download failed");
                self.release(&path);
                DownloadRecord::in_progress(url.as_str(), path).fail(&error)
            }
        }
    }

    /// Streams `stream` to `path` through a temporary file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] for file system failures,
    /// [`StoreError::Stream`] if the body stream fails, and
    /// [`StoreError::Truncated`] if the byte count differs from `expected_len`.
    /// The temporary file is removed in every error case.
    pub async fn persist_stream<S, B, E>(
        &self,
        url: &str,
        path: PathBuf,
        expected_len: Option<u64>,
        stream: S,
    ) -> Result<DownloadRecord, StoreError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let record = DownloadRecord::in_progress(url, path);
        let temp_path = temp_path_for(&record.path);

        let file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| StoreError::io(&temp_path, e))?;
        let mut guard = PartialFile::new(temp_path.clone());

        let mut writer = BufWriter::new(file);
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;

        tokio::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StoreError::stream(url, e))?;
            let bytes = chunk.as_ref();
            hasher.update(bytes);
            writer
                .write_all(bytes)
                .await
                .map_err(|e| StoreError::io(&temp_path, e))?;
            written += bytes.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| StoreError::io(&temp_path, e))?;
        drop(writer);

        if let Some(expected) = expected_len
            && expected != written
        {
            return Err(StoreError::Truncated {
                path: record.path,
                expected_bytes: expected,
                actual_bytes: written,
            });
        }

        if tokio::fs::try_exists(&record.path).await.unwrap_or(false) {
            return Err(StoreError::io(
                &record.path,
                std::io::Error::new(ErrorKind::AlreadyExists, "destination already exists"),
            ));
        }
        tokio::fs::rename(&temp_path, &record.path)
            .await
            .map_err(|e| StoreError::io(&record.path, e))?;
        guard.disarm();

        let digest = format!("{:x}", hasher.finalize());
        let mut record = record.complete(written, digest.clone());
        let first = self
            .by_hash
            .entry(digest)
            .or_insert_with(|| record.path.clone())
            .clone();
        if first != record.path {
            debug!(path = %record.path.display(), duplicate_of = %first.display(), "duplicate content");
            record.duplicate_of = Some(first);
        }

        debug!(path = %record.path.display(), bytes = written, "download complete");
        Ok(record)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "download".into(), |n| n.to_string_lossy());
    path.with_file_name(format!(".{name}.part"))
}
