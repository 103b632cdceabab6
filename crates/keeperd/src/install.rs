//! Unpacks the distribution archive and prepares the daemon executable.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, info, warn};

pub(crate) const INSTALL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::install");

const STAGING_PREFIX: &str = ".keeper-staging-";
const EXECUTABLE_BITS: u32 = 0o755;

/// Extracts an archive file into a directory tree.
pub trait ArchiveReader: Send + Sync {
    /// Unpacks `archive` below `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error when the archive cannot be opened or decoded.
    fn extract(&self, archive: &Path, destination: &Path) -> io::Result<()>;
}

/// Reader for gzip-compressed tarballs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzReader;

impl ArchiveReader for TarGzReader {
    fn extract(&self, archive: &Path, destination: &Path) -> io::Result<()> {
        let file = File::open(archive)?;
        let mut tarball = tar::Archive::new(GzDecoder::new(file));
        tarball.set_preserve_permissions(true);
        tarball.unpack(destination)
    }
}

/// Errors raised while installing the daemon binary.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The install root or staging directory could not be prepared.
    #[error("failed to prepare install directory '{path}': {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The archive could not be extracted.
    #[error("failed to extract archive '{archive}': {source}")]
    Extract {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },
    /// An extracted entry could not be moved into place.
    #[error("failed to move '{path}' into place: {source}")]
    Place {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The archive did not contain the expected executable.
    #[error("archive did not provide the daemon binary at '{path}'")]
    MissingBinary { path: PathBuf },
    /// The executable bit could not be applied.
    #[error("failed to make '{path}' executable: {source}")]
    NotExecutable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Installs the daemon from a fetched archive.
#[derive(Debug, Default, Clone)]
pub struct ArchiveInstaller<R = TarGzReader> {
    reader: R,
}

impl ArchiveInstaller<TarGzReader> {
    /// Builds an installer for gzip-compressed tarballs.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reader: TarGzReader,
        }
    }
}

impl<R: ArchiveReader> ArchiveInstaller<R> {
    /// Builds an installer around a custom archive reader.
    pub const fn with_reader(reader: R) -> Self {
        Self { reader }
    }

    /// Extracts `archive` into `install_root` and marks `binary` executable.
    ///
    /// Entries are unpacked into a staging directory first. Only the top-level
    /// entry that holds `binary` is then moved over any previous copy, so an
    /// interrupted extraction never leaves a partial binary at its final path
    /// and stray archive entries cannot replace siblings such as the
    /// repository. The archive is deleted afterwards; failing to delete it is
    /// only logged.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::NotExecutable`] when permissions cannot be
    /// applied, and other variants for extraction or placement failures.
    pub fn install(
        &self,
        archive: &Path,
        install_root: &Path,
        binary: &Path,
    ) -> Result<(), InstallError> {
        info!(
            target: INSTALL_TARGET,
            archive = %archive.display(),
            root = %install_root.display(),
            "installing archive"
        );
        fs::create_dir_all(install_root).map_err(|source| InstallError::Prepare {
            path: install_root.to_path_buf(),
            source,
        })?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(install_root)
            .map_err(|source| InstallError::Prepare {
                path: install_root.to_path_buf(),
                source,
            })?;

        self.reader
            .extract(archive, staging.path())
            .map_err(|source| InstallError::Extract {
                archive: archive.to_path_buf(),
                source,
            })?;
        let Some(entry) = top_level_entry(install_root, binary) else {
            return Err(InstallError::MissingBinary {
                path: binary.to_path_buf(),
            });
        };
        promote_entry(staging.path(), install_root, entry)?;

        if !binary.is_file() {
            return Err(InstallError::MissingBinary {
                path: binary.to_path_buf(),
            });
        }
        mark_executable(binary)?;

        if let Err(error) = staging.close() {
            warn!(target: INSTALL_TARGET, error = %error, "failed to remove staging directory");
        }
        if let Err(error) = fs::remove_file(archive) {
            warn!(
                target: INSTALL_TARGET,
                archive = %archive.display(),
                error = %error,
                "failed to delete archive after install"
            );
        }
        info!(target: INSTALL_TARGET, binary = %binary.display(), "daemon binary installed");
        Ok(())
    }
}

/// First path component of `binary` below `root`.
fn top_level_entry<'a>(root: &Path, binary: &'a Path) -> Option<&'a OsStr> {
    match binary.strip_prefix(root).ok()?.components().next()? {
        Component::Normal(name) => Some(name),
        _ => None,
    }
}

/// Moves `entry` from `staging` into `root`, replacing an old copy.
///
/// Everything else in `staging` is discarded with it.
fn promote_entry(staging: &Path, root: &Path, entry: &OsStr) -> Result<(), InstallError> {
    let place_error = |path: &Path, source: io::Error| InstallError::Place {
        path: path.to_path_buf(),
        source,
    };
    let extracted = staging.join(entry);
    if fs::symlink_metadata(&extracted).is_err() {
        return Ok(());
    }
    let target = root.join(entry);
    remove_existing(&target).map_err(|source| place_error(&target, source))?;
    fs::rename(&extracted, &target).map_err(|source| place_error(&target, source))?;
    debug!(target: INSTALL_TARGET, path = %target.display(), "placed extracted entry");
    Ok(())
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

fn mark_executable(binary: &Path) -> Result<(), InstallError> {
    let not_executable = |source: io::Error| InstallError::NotExecutable {
        path: binary.to_path_buf(),
        source,
    };
    let mut permissions = fs::metadata(binary).map_err(not_executable)?.permissions();
    permissions.set_mode(permissions.mode() | EXECUTABLE_BITS);
    fs::set_permissions(binary, permissions).map_err(not_executable)
}
