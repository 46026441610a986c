use crate::error::{ErrorKind, Result};
use crate::publish::Publisher;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Contents of a bundle's metadata document (`crc-bundle-info.json`).
///
/// Only [`executable`](Self::executable) is interpreted by this crate. The
/// descriptive fields are parsed for convenience, and everything else is
/// carried along untouched in [`extra`](Self::extra).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// File name of the client executable shipped inside the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A bundle found in the cache: its parsed metadata and the directory it was
/// extracted to.
///
/// Only [`Repository::get`](crate::Repository::get) creates these, so the
/// cached path is always set and always points at the directory the
/// metadata was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleInfo {
    metadata: Metadata,
    cached_path: PathBuf,
    exposed_path: Option<PathBuf>,
}

impl BundleInfo {
    pub(crate) fn new(metadata: Metadata, cached_path: PathBuf) -> Self {
        Self { metadata, cached_path, exposed_path: None }
    }

    pub(crate) fn exposed_at(self, exposed_path: PathBuf) -> Self {
        Self { exposed_path: Some(exposed_path), ..self }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Directory holding the bundle's extracted contents.
    pub fn cached_path(&self) -> &Path {
        &self.cached_path
    }

    /// Where the executable was published, for bundles returned by
    /// [`Repository::use_bundle`](crate::Repository::use_bundle).
    pub fn exposed_path(&self) -> Option<&Path> {
        self.exposed_path.as_deref()
    }

    /// Name of the bundled executable, falling back to `default` when the
    /// metadata doesn't name one.
    pub fn executable_name<'a>(&'a self, default: &'a str) -> &'a str {
        self.metadata.executable.as_deref().unwrap_or(default)
    }

    /// Location of the bundled executable inside the cache.
    pub fn executable_path(&self, default: &str) -> PathBuf {
        self.cached_path.join(self.executable_name(default))
    }

    /// Expose the bundled executable as `exec_dir/<executable name>`,
    /// returning that path.
    ///
    /// The exposed path doesn't depend on which bundle is published, so
    /// publishing another bundle (or the same one again) simply replaces it.
    #[instrument(skip(self, publisher), fields(bundle = %self.cached_path.display(), publisher = publisher.name()))]
    pub fn publish(&self, exec_dir: &Path, default_executable: &str, publisher: &dyn Publisher) -> Result<PathBuf> {
        let source = self.executable_path(default_executable);
        let target = exec_dir.join(self.executable_name(default_executable));

        create_exec_dir(exec_dir).or_raise(|| ErrorKind::DirCreate(exec_dir.to_path_buf()))?;
        remove_stale(&target);
        publisher.publish(&source, &target).or_raise(|| ErrorKind::Publish(target.clone()))?;

        tracing::info!(source = %source.display(), target = %target.display(), "published bundled executable");
        Ok(target)
    }
}

fn create_exec_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(crate::publish::EXECUTABLE_MODE);
    }
    builder.create(dir)
}

/// Removal of a previously published executable is best-effort: a missing
/// file is the expected case, and any other failure is left for the
/// publisher to run into (and report) when it tries to create the target.
fn remove_stale(target: &Path) {
    match fs::remove_file(target) {
        Ok(()) => tracing::debug!(target = %target.display(), "removed previously published executable"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => {
            tracing::debug!(target = %target.display(), error = %e, "could not remove previously published executable")
        },
    }
}
