//! Lock file keeping a second instance off the same serial device.

use snafu::{OptionExt, ResultExt, Snafu};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const LOCK_DIR: &str = "/var/lock";

/// Error type for taking the lock
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Cannot lock {}", path.display()))]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("No device name in {}", device))]
    DeviceName { device: String },
}

/// Held for as long as the device is in use. The file is removed on drop.
#[derive(Debug)]
pub struct DeviceLock {
    path: PathBuf,
}

impl DeviceLock {
    /// Lock `device` by creating `/var/lock/<device name>`.
    pub fn acquire(device: &str) -> Result<Self, Error> {
        let name = Path::new(device)
            .file_name()
            .context(DeviceNameSnafu { device })?;
        Self::at(Path::new(LOCK_DIR).join(name))
    }

    /// Lock with an explicit lock file path. Fails if the file exists.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .context(CreateSnafu { path: &path })?;
        // the pid is informational only
        write_pid(file, &path);
        log::debug!("Locked {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Returns whether the pid was written. A failure is logged and otherwise ignored.
fn write_pid(mut out: impl Write, path: &Path) -> bool {
    match writeln!(out, "{:>10}", std::process::id()) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Failed to write pid to {}: {}", path.display(), e);
            false
        }
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("kwl-bus-{}-{}", name, std::process::id()))
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_pid() {
        let mut out = Vec::new();
        assert!(write_pid(&mut out, Path::new("test")));
        assert_eq!(out.len(), 11);
        assert!(!write_pid(Broken, Path::new("test")));
    }

    #[test]
    fn test_exclusive() {
        let path = lock_path("exclusive");
        let lock = DeviceLock::at(&path).unwrap();
        assert!(path.exists());
        let err = DeviceLock::at(&path).unwrap_err();
        assert!(matches!(err, Error::Create { .. }));
        assert!(err.to_string().starts_with("Cannot lock "));
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_relock_after_drop() {
        let path = lock_path("relock");
        drop(DeviceLock::at(&path).unwrap());
        let lock = DeviceLock::at(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
    }

    #[test]
    fn test_no_device_name() {
        assert!(matches!(
            DeviceLock::acquire("/"),
            Err(Error::DeviceName { .. })
        ));
    }
}
