//! On-device script materialization.
//!
//! The script is written into the build output directory rather than a
//! generic temp directory so the deployment tool can push it with the rest
//! of the build output.

use log::{info, warn};
use std::fs::{self, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Prologue shared by every on-device script.
///
/// /home is mounted noexec on the device, but some tools and tests use the
/// home dir as a workspace. /tmp has no such restriction.
pub const BASIC_SHELL_SCRIPT: [&str; 2] = ["#!/bin/sh", "export HOME=/tmp"];

/// A shell script on local disk that is pushed to the target and executed
/// there. Removing it consumes the value, so a path is deleted at most once;
/// a script dropped without being removed is deleted on drop.
#[derive(Debug)]
pub struct OnDeviceScript {
    path: PathBuf,
    removed: bool,
}

impl OnDeviceScript {
    /// Writes `lines` joined by newlines into a uniquely named executable
    /// file inside `dir`.
    pub fn write<S: AsRef<str>>(lines: &[S], dir: &Path) -> Result<Self> {
        let contents = lines
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("\n");
        info!("Running the following command on the device:\n{contents}");

        let mut file = tempfile::Builder::new()
            .prefix("device_script_")
            .suffix(".sh")
            .tempfile_in(dir)?;
        fs::set_permissions(file.path(), Permissions::from_mode(0o755))?;
        file.write_all(contents.as_bytes())?;
        file.write_all(b"\n")?;
        let (_, path) = file.keep().map_err(|e| e.error)?;

        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the script from local disk.
    pub fn remove(mut self) -> Result<()> {
        self.removed = true;
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for OnDeviceScript {
    fn drop(&mut self) {
        if !self.removed {
            warn!("On-device script {} was not cleaned up; removing it now", self.path.display());
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines: Vec<String> = BASIC_SHELL_SCRIPT.iter().map(|s| s.to_string()).collect();
        lines.push("./base_unittests".to_string());

        let script = OnDeviceScript::write(&lines, dir.path()).unwrap();
        let path = script.path().to_path_buf();
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("sh"));

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "#!/bin/sh\nexport HOME=/tmp\n./base_unittests\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        script.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = OnDeviceScript::write(&BASIC_SHELL_SCRIPT, dir.path()).unwrap();
        let b = OnDeviceScript::write(&BASIC_SHELL_SCRIPT, dir.path()).unwrap();
        assert_ne!(a.path(), b.path());
        a.remove().unwrap();
        b.remove().unwrap();
    }

    #[test]
    fn test_dropped_script_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let script = OnDeviceScript::write(&BASIC_SHELL_SCRIPT, dir.path()).unwrap();
        let path = script.path().to_path_buf();
        assert!(path.exists());
        drop(script);
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = OnDeviceScript::write(&BASIC_SHELL_SCRIPT, dir.path()).unwrap();
        fs::remove_file(script.path()).unwrap();
        assert!(script.remove().is_err());
    }
}
