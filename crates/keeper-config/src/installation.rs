//! Validated request describing one installation flow.

use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::layout::InstallLayout;

/// Installation parameters accepted by `init`.
///
/// The value is immutable once built; derived paths come from
/// [`InstallationConfig::layout`] rather than being stored alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationConfig {
    install_root: PathBuf,
    archive_source: Url,
    reset_repo: bool,
}

impl InstallationConfig {
    /// Validates the raw installation parameters.
    ///
    /// # Errors
    ///
    /// Returns an error when the install root is empty, the source cannot be
    /// parsed as a URL, or the URL uses a scheme other than `http`/`https`.
    pub fn new(
        install_root: impl Into<PathBuf>,
        archive_source: &str,
        reset_repo: bool,
    ) -> Result<Self, InstallationConfigError> {
        let install_root = install_root.into();
        if install_root.as_os_str().is_empty() {
            return Err(InstallationConfigError::EmptyInstallRoot);
        }
        let archive_source =
            Url::parse(archive_source).map_err(|source| InstallationConfigError::MalformedUrl {
                input: archive_source.to_owned(),
                source,
            })?;
        match archive_source.scheme() {
            "http" | "https" => {}
            other => {
                return Err(InstallationConfigError::UnsupportedScheme(other.to_owned()));
            }
        }
        Ok(Self {
            install_root,
            archive_source,
            reset_repo,
        })
    }

    /// Application files directory.
    #[must_use]
    pub fn install_root(&self) -> &Path {
        self.install_root.as_path()
    }

    /// Remote location of the distribution archive.
    #[must_use]
    pub fn archive_source(&self) -> &Url {
        &self.archive_source
    }

    /// Whether the repository should be recreated even when present.
    #[must_use]
    pub fn reset_repo(&self) -> bool {
        self.reset_repo
    }

    /// Paths derived from the install root.
    #[must_use]
    pub fn layout(&self) -> InstallLayout {
        InstallLayout::new(self.install_root.clone())
    }
}

/// Errors raised while validating installation parameters.
#[derive(Debug, Error)]
pub enum InstallationConfigError {
    /// The application files directory was empty.
    #[error("install root must not be empty")]
    EmptyInstallRoot,
    /// The archive source could not be parsed.
    #[error("Malformed URL '{input}': {source}")]
    MalformedUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },
    /// The archive source uses a scheme the fetcher cannot speak.
    #[error("unsupported archive URL scheme '{0}'")]
    UnsupportedScheme(String),
}
