pub mod paths;
pub mod types;

use std::path::Path;

use crate::error::DocError;

pub use types::{DocConfig, Verbosity};

/// Load `config.toml`, or the defaults when there is none.
pub fn load_config() -> Result<DocConfig, DocError> {
    load_config_from(&paths::config_file()?)
}

pub fn load_config_from(path: &Path) -> Result<DocConfig, DocError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            tracing::debug!(path = %path.display(), "loading config");
            Ok(toml::from_str(&contents)?)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DocConfig::default()),
        Err(e) => Err(DocError::io_at(path, e)),
    }
}
