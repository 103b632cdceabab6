//! Typed arguments for the `init` action.

use serde::Deserialize;
use serde_json::Value;

use keeper_config::InstallationConfig;

use super::errors::DispatchError;

/// Raw installation object as sent by the host.
///
/// ```text
/// [{"appFilesDir": "/data/app/", "src": "https://dist/go-ipfs.tar.gz", "resetRepo": false}]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitArgs {
    /// Application files directory.
    pub app_files_dir: String,
    /// Archive URL.
    pub src: String,
    /// Whether to recreate the repository.
    pub reset_repo: bool,
}

impl InitArgs {
    /// Extracts the installation object from the first positional argument.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] when the first argument is
    /// missing or any of the three fields is absent or mistyped.
    pub fn parse(args: &Value) -> Result<Self, DispatchError> {
        let object = match args {
            Value::Array(items) => items
                .first()
                .ok_or_else(|| DispatchError::invalid_config("missing argument 0"))?,
            Value::Object(_) => args,
            other => {
                return Err(DispatchError::invalid_config(format!(
                    "expected an argument array, found {}",
                    kind_of(other)
                )));
            }
        };
        Self::deserialize(object).map_err(|source| DispatchError::InvalidConfig {
            message: source.to_string(),
            source: Some(source),
        })
    }

    /// Validates the fields into an [`InstallationConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Installation`] for an empty directory or a
    /// malformed URL.
    pub fn into_installation(self) -> Result<InstallationConfig, DispatchError> {
        InstallationConfig::new(self.app_files_dir, &self.src, self.reset_repo)
            .map_err(DispatchError::from)
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
