//! Extraction of bundle archives into the bundle cache.
//!
//! A bundle archive is a tarball, compressed with any format
//! [`crc_compress`] can detect. The main entrypoint is [`extract`]; the
//! directory name a bundle ends up under is decided by [`bundle_dir_name`].

mod archive;
pub mod error;
mod name;

pub use crate::archive::extract;
pub use crate::name::bundle_dir_name;
