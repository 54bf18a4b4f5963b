/// Platform-specific locations for config and persisted metadata
///
/// Resolution goes through the `dirs` crate, which follows the XDG Base Directory
/// layout on Linux and the native conventions on macOS and Windows. `XDG_*`
/// variables are checked first so tests and containers can redirect everything.
use std::path::PathBuf;

const APP_DIR: &str = "code-index";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Base data directory, falling back to the working directory
    pub fn data_dir() -> PathBuf {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Base config directory, falling back to the working directory
    pub fn config_dir() -> PathBuf {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Returns: {data_dir}/code-index
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(APP_DIR)
    }

    /// Returns: {config_dir}/code-index
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(APP_DIR)
    }

    /// Returns: {data_dir}/code-index/metadata.json
    pub fn default_metadata_path() -> PathBuf {
        Self::project_data_dir().join("metadata.json")
    }

    /// Returns: {config_dir}/code-index/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}
