//! Derives the on-disk layout shared by the installer, initialiser, and
//! supervisor.
//!
//! Everything lives below a single application files directory. The archive
//! cache is transient, the binary is unpacked next to it, and the repository
//! sits in a hidden directory. Paths are always recomputed from the root so the
//! components cannot disagree about where an artefact lives.

use std::path::{Path, PathBuf};

/// File name of the cached distribution archive.
pub const ARCHIVE_FILE_NAME: &str = "go-ipfs.tar.gz";

/// Directory the archive unpacks into.
pub const INSTALL_DIR_NAME: &str = "go-ipfs";

/// Executable name inside [`INSTALL_DIR_NAME`].
pub const BINARY_FILE_NAME: &str = "ipfs";

/// Directory name of the daemon repository.
pub const REPO_DIR_NAME: &str = ".ipfs";

/// Environment variable that points the binary at its repository.
pub const REPO_ENV_VAR: &str = "IPFS_PATH";

/// Canonical paths for artefacts managed below the application files directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    /// Builds a layout rooted at the application files directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Application files directory holding every artefact.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Transient location of the downloaded archive.
    #[must_use]
    pub fn archive_cache_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_FILE_NAME)
    }

    /// Directory the distribution unpacks into.
    #[must_use]
    pub fn install_dir(&self) -> PathBuf {
        self.root.join(INSTALL_DIR_NAME)
    }

    /// Installed daemon executable.
    #[must_use]
    pub fn binary_path(&self) -> PathBuf {
        self.install_dir().join(BINARY_FILE_NAME)
    }

    /// Persistent repository directory.
    #[must_use]
    pub fn repo_path(&self) -> PathBuf {
        self.root.join(REPO_DIR_NAME)
    }
}
