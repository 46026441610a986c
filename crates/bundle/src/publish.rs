//! Strategies for exposing a bundled executable at a stable path.
//!
//! Both strategies leave an executable at `target` that reads exactly like
//! `source`; they only differ in how. Neither falls back to the other.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Mode of copied executables and of the directory they are exposed in.
#[cfg(unix)]
pub(crate) const EXECUTABLE_MODE: u32 = 0o750;

/// Publisher shared by every clone of a [`Repository`](crate::Repository).
pub type PublisherHandle = Arc<dyn Publisher>;

/// Makes the file at `source` available at `target`.
///
/// Implementations may assume that `target` does not exist (stale entries
/// are removed beforehand) and that its parent directory does.
pub trait Publisher: Send + Sync {
    /// Name of the strategy (used for logging only).
    fn name(&self) -> &str;

    fn publish(&self, source: &Path, target: &Path) -> io::Result<()>;
}

/// Links `target` to `source`, so the exposed executable is always the one
/// inside the bundle. Default everywhere except Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymlinkPublisher;

impl Publisher for SymlinkPublisher {
    fn name(&self) -> &str {
        "symlink"
    }

    fn publish(&self, source: &Path, target: &Path) -> io::Result<()> {
        // A link is created happily even if it dangles; refuse that instead of
        // exposing a client that can't run.
        if !fs::metadata(source)?.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "bundled executable is not a file"));
        }
        // A relative link target resolves against the link's own directory,
        // not the working directory `source` was checked against.
        let source = std::path::absolute(source)?;
        let source = source.as_path();
        #[cfg(unix)]
        return std::os::unix::fs::symlink(source, target);
        #[cfg(windows)]
        return std::os::windows::fs::symlink_file(source, target);
        #[cfg(not(any(unix, windows)))]
        return Err(io::Error::new(io::ErrorKind::Unsupported, "symbolic links are not supported"));
    }
}

/// Copies the full contents of `source` to a new executable file at
/// `target`. Default on Windows, where linked executables don't behave like
/// the real thing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyPublisher;

impl Publisher for CopyPublisher {
    fn name(&self) -> &str {
        "copy"
    }

    fn publish(&self, source: &Path, target: &Path) -> io::Result<()> {
        let mut reader = File::open(source)?;
        let mut options = OpenOptions::new();
        // Never write through whatever is still at the target (it might be a
        // link back into the bundle).
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(EXECUTABLE_MODE);
        }
        let mut writer = options.open(target)?;
        io::copy(&mut reader, &mut writer)?;
        writer.sync_all()?;
        // Creation mode is subject to the umask.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(target, fs::Permissions::from_mode(EXECUTABLE_MODE))?;
        }
        Ok(())
    }
}

/// The strategy suited to the current platform.
pub fn default_publisher() -> PublisherHandle {
    if cfg!(windows) { Arc::new(CopyPublisher) } else { Arc::new(SymlinkPublisher) }
}
