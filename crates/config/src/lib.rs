//! Configuration for the bundle cache.
//!
//! Values are layered with [`figment`], later layers overriding earlier ones:
//!
//! 1. Defaults derived from the user's home directory (`~/.crc/...`).
//! 2. An optional configuration file (TOML, YAML or JSON, by extension).
//! 3. Environment variables prefixed with [`ENV_PREFIX`], e.g.
//!    `CRC_BUNDLE_CACHE_DIR=/var/cache/crc`.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::BaseDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "CRC_BUNDLE_";
/// Reserved file extension of bundle archives.
pub const DEFAULT_BUNDLE_EXTENSION: &str = ".crcbundle";
/// Name of the metadata document inside every extracted bundle.
pub const DEFAULT_METADATA_FILENAME: &str = "crc-bundle-info.json";
/// File name of the client executable shipped inside bundles.
pub const DEFAULT_EXECUTABLE_NAME: &str = if cfg!(windows) { "oc.exe" } else { "oc" };

const BASE_DIR: &str = ".crc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one subdirectory per extracted bundle.
    pub cache_dir: PathBuf,
    /// Directory the bundled client executable is exposed in.
    pub bin_dir: PathBuf,
    /// Executable to expose when a bundle's metadata does not name one.
    pub executable_name: String,
    pub bundle_extension: String,
    pub metadata_filename: String,
}

impl Config {
    /// Default layout rooted at `base`: bundles are cached in `base/cache`
    /// and the client is exposed in `base/bin/oc`.
    pub fn with_base_dir(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            cache_dir: base.join("cache"),
            bin_dir: base.join("bin").join("oc"),
            executable_name: DEFAULT_EXECUTABLE_NAME.to_string(),
            bundle_extension: DEFAULT_BUNDLE_EXTENSION.to_string(),
            metadata_filename: DEFAULT_METADATA_FILENAME.to_string(),
        }
    }

    /// Default layout rooted at `~/.crc`.
    pub fn defaults() -> Result<Self> {
        let dirs = BaseDirs::new().ok_or_raise(|| ErrorKind::NoHomeDirectory)?;
        Ok(Self::with_base_dir(dirs.home_dir().join(BASE_DIR)))
    }

    /// Load configuration on top of the home directory defaults.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with_defaults(Self::defaults()?, file)
    }

    /// Load configuration on top of the given `defaults`, then validate it.
    pub fn load_with_defaults(defaults: Self, file: Option<&Path>) -> Result<Self> {
        Self::load_layers(defaults, file, ENV_PREFIX)
    }

    #[tracing::instrument(skip(defaults))]
    fn load_layers(defaults: Self, file: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(defaults));
        if let Some(file) = file {
            // Figment silently skips missing files; an explicitly requested
            // file that doesn't exist is a mistake worth reporting.
            if !file.is_file() {
                exn::bail!(ErrorKind::NotFound(file.to_path_buf()));
            }
            let extension = file.extension().and_then(|e| e.to_str()).map(str::to_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        let config: Self = figment.merge(Env::prefixed(env_prefix)).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(?config, "loaded configuration");
        Ok(config)
    }

    /// Check that every value can be used as-is by the bundle repository.
    pub fn validate(&self) -> Result<()> {
        if !self.cache_dir.is_absolute() {
            exn::bail!(ErrorKind::Invalid("cache_dir"));
        }
        if !self.bin_dir.is_absolute() {
            exn::bail!(ErrorKind::Invalid("bin_dir"));
        }
        if !is_file_name(&self.executable_name) {
            exn::bail!(ErrorKind::Invalid("executable_name"));
        }
        if !is_file_name(&self.metadata_filename) {
            exn::bail!(ErrorKind::Invalid("metadata_filename"));
        }
        if self.bundle_extension.len() < 2 || !self.bundle_extension.starts_with('.') {
            exn::bail!(ErrorKind::Invalid("bundle_extension"));
        }
        Ok(())
    }
}

/// Whether `name` is exactly one plain path component (no separators, no
/// `.` or `..`).
pub fn is_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(c)), None) if c == OsStr::new(name))
}
