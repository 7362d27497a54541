//! Runtime configuration for diff requests.
//!
//! Defaults can be overridden through `LAYERDIFF_*` environment variables;
//! unparsable or zero values are ignored and the default is kept.

use std::path::PathBuf;

const DEFAULT_CHUNK_SIZE: usize = 256 * 1024; // 256 KiB
const DEFAULT_MAX_INFLIGHT: usize = 4;

/// Settings shared by the native diff facility and the archive packager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffConfig {
    /// Binary invoked to run `zfs diff`.
    pub zfs_bin: PathBuf,
    /// Size of the chunks an archive writer hands to its reader.
    pub chunk_size: usize,
    /// Number of chunks that may be in flight between writer and reader.
    pub max_inflight: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            zfs_bin: PathBuf::from("zfs"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_inflight: DEFAULT_MAX_INFLIGHT,
        }
    }
}

impl DiffConfig {
    /// Builds a config from defaults, then applies environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(bin) = std::env::var_os("LAYERDIFF_ZFS_BIN").filter(|s| !s.is_empty()) {
            config.zfs_bin = PathBuf::from(bin);
        }
        if let Some(kb) = env_usize("LAYERDIFF_CHUNK_KB") {
            config.chunk_size = kb * 1024;
        }
        if let Some(depth) = env_usize("LAYERDIFF_MAX_INFLIGHT") {
            config.max_inflight = depth;
        }
        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DiffConfig::default();
        assert_eq!(config.zfs_bin, PathBuf::from("zfs"));
        assert_eq!(config.chunk_size, 256 * 1024);
        assert_eq!(config.max_inflight, 4);
    }

    #[test]
    fn test_env_overrides_and_rejects_zero() {
        // Only this test touches these variables.
        std::env::set_var("LAYERDIFF_CHUNK_KB", "64");
        std::env::set_var("LAYERDIFF_MAX_INFLIGHT", "0");
        let config = DiffConfig::from_env();
        std::env::remove_var("LAYERDIFF_CHUNK_KB");
        std::env::remove_var("LAYERDIFF_MAX_INFLIGHT");

        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.max_inflight, DEFAULT_MAX_INFLIGHT);
    }
}
