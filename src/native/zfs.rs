use super::{parse_diff_output, DiffReference, NativeDiff};
use crate::common::RawChangeEvent;
use crate::config::DiffConfig;
use crate::error::{DiffError, Result};

use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Runs `zfs diff -F -H` and parses its output.
#[derive(Debug, Clone)]
pub struct ZfsDiff {
    zfs_bin: PathBuf,
}

impl ZfsDiff {
    pub fn new(config: &DiffConfig) -> Self {
        Self { zfs_bin: config.zfs_bin.clone() }
    }
}

impl NativeDiff for ZfsDiff {
    fn changes(&self, reference: &DiffReference) -> Result<Vec<RawChangeEvent>> {
        let mut cmd = Command::new(&self.zfs_bin);
        cmd.args(["diff", "-F", "-H"]).arg(&reference.snapshot);
        if let Some(target) = &reference.target {
            cmd.arg(target);
        }
        debug!(?cmd, "running snapshot diff");

        let output = cmd
            .output()
            .map_err(|e| DiffError::DiffFacility(format!("failed to run {}: {e}", self.zfs_bin.display())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiffError::DiffFacility(format!(
                "zfs diff {reference} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| DiffError::DiffFacility(format!("zfs diff output is not UTF-8: {e}")))?;
        parse_diff_output(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_facility_error() {
        let config = DiffConfig {
            zfs_bin: PathBuf::from("/nonexistent/zfs-binary"),
            ..DiffConfig::default()
        };
        let err = ZfsDiff::new(&config).changes(&DiffReference::new("pool/a@b")).unwrap_err();
        assert!(matches!(err, DiffError::DiffFacility(_)));
    }

    #[test]
    fn test_non_zero_exit_is_facility_error() {
        let config = DiffConfig { zfs_bin: PathBuf::from("false"), ..DiffConfig::default() };
        let err = ZfsDiff::new(&config).changes(&DiffReference::new("pool/a@b")).unwrap_err();
        assert!(matches!(err, DiffError::DiffFacility(_)));
    }
}
