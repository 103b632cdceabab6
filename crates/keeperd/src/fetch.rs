//! Downloads the distribution archive with a length-based freshness check.
//!
//! A cached archive is reused only when its size equals the remote
//! `Content-Length`. No digest is compared, so a corrupted file of the right
//! length is treated as current.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub(crate) const FETCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::fetch");

const CHUNK_SIZE: usize = 8 * 1024;
const USER_AGENT: &str = concat!("keeperd/", env!("CARGO_PKG_VERSION"));

/// Receives integer download percentages.
pub trait ProgressObserver {
    /// Invoked whenever the completed percentage changes.
    fn on_progress(&self, percent: u8, downloaded: u64, total: u64);
}

/// Observer that discards progress notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _percent: u8, _downloaded: u64, _total: u64) {}
}

/// Result of a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The cached file already matched the remote length; nothing was written.
    Unchanged,
    /// The archive was transferred; carries the number of bytes written.
    Downloaded(u64),
}

/// Errors raised while fetching the archive.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with something other than `200 OK`.
    #[error("unexpected HTTP status {code} from {url}")]
    BadStatus { url: Url, code: u16 },
    /// The connection could not be established or broke down.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: Url,
        #[source]
        source: Box<ureq::Error>,
    },
    /// Reading the response body failed mid-transfer, including a body that
    /// ended before its advertised length.
    #[error("failed to read response body from {url}: {source}")]
    Read {
        url: Url,
        #[source]
        source: io::Error,
    },
    /// Writing the archive to disk failed.
    #[error("failed to write archive '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// HTTP client for the distribution archive.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    agent: ureq::Agent,
}

impl Default for ArchiveFetcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ArchiveFetcher {
    /// Builds a fetcher, optionally bounding each request by `timeout`.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        let builder = ureq::AgentBuilder::new().user_agent(USER_AGENT);
        let builder = match timeout {
            Some(limit) => builder.timeout(limit),
            None => builder,
        };
        Self {
            agent: builder.build(),
        }
    }

    /// Fetches `source` into `destination` unless an equally sized copy exists.
    ///
    /// A partially written file is left in place when the transfer fails.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::BadStatus`] for non-200 responses and
    /// connection, read, or write errors otherwise.
    pub fn fetch(
        &self,
        source: &Url,
        destination: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<FetchOutcome, FetchError> {
        info!(target: FETCH_TARGET, url = %source, path = %destination.display(), "fetching archive");
        let response = match self.agent.get(source.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(FetchError::BadStatus {
                    url: source.clone(),
                    code,
                });
            }
            Err(error) => {
                return Err(FetchError::Connect {
                    url: source.clone(),
                    source: Box::new(error),
                });
            }
        };
        if response.status() != 200 {
            return Err(FetchError::BadStatus {
                url: source.clone(),
                code: response.status(),
            });
        }

        let total = response
            .header("Content-Length")
            .and_then(|value| value.trim().parse::<u64>().ok());
        if let Some(expected) = total {
            if cached_length(destination) == Some(expected) {
                info!(
                    target: FETCH_TARGET,
                    path = %destination.display(),
                    bytes = expected,
                    "cached archive matches remote length"
                );
                return Ok(FetchOutcome::Unchanged);
            }
        }

        let written = stream_to_file(
            response.into_reader(),
            source,
            destination,
            total,
            observer,
        )?;
        info!(target: FETCH_TARGET, path = %destination.display(), bytes = written, "archive downloaded");
        Ok(FetchOutcome::Downloaded(written))
    }
}

fn cached_length(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
}

fn stream_to_file(
    mut reader: impl Read,
    source: &Url,
    destination: &Path,
    total: Option<u64>,
    observer: &dyn ProgressObserver,
) -> Result<u64, FetchError> {
    let io_error = |error: io::Error| FetchError::Io {
        path: destination.to_path_buf(),
        source: error,
    };
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut file = File::create(destination).map_err(io_error)?;
    let mut buffer = [0_u8; CHUNK_SIZE];
    let mut downloaded = 0_u64;
    let mut last_percent = None;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                return Err(FetchError::Read {
                    url: source.clone(),
                    source: error,
                });
            }
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        file.write_all(chunk).map_err(io_error)?;
        downloaded += read as u64;

        let Some(length) = total else { continue };
        let Some(percent) = percent_of(downloaded, length) else { continue };
        if last_percent != Some(percent) {
            last_percent = Some(percent);
            debug!(target: FETCH_TARGET, percent, downloaded, "download progress");
            observer.on_progress(percent, downloaded, length);
        }
    }
    file.flush().map_err(io_error)?;
    Ok(downloaded)
}

/// Integer percentage of `done` over `total`, or `None` when the total is zero.
fn percent_of(done: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let percent = done.saturating_mul(100) / total;
    Some(u8::try_from(percent.min(100)).unwrap_or(100))
}
