//! Default data-directory resolution.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CAPSTAN_DATA_DIR";

/// Resolve the base directory for filesystem-backed storage.
///
/// The environment override wins; otherwise the platform data directory is
/// used with a `capstan` subdirectory, falling back to the current
/// directory when the platform reports none.
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = env::var(DATA_DIR_ENV)
        && !path.trim().is_empty()
    {
        return PathBuf::from(path.trim());
    }

    dirs_next::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("capstan")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_ends_with_project_directory() {
        // The env override is process-global, so only assert the fallback
        // shape when the variable is unset.
        if env::var(DATA_DIR_ENV).is_err() {
            let path = default_data_dir();
            assert!(path.ends_with("capstan") || path == PathBuf::from(".").join("capstan"));
        }
    }
}
