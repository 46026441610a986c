//! Local cache of extracted CRC bundles.
//!
//! A bundle is an archive holding a virtual machine image, a metadata
//! document and a handful of executables. Once extracted into the cache, a
//! bundle is addressed by its name and one of its executables (the `oc`
//! client) can be *published*: exposed at a path that stays the same no
//! matter which bundle is in use.
//!
//! ```text
//! <cache_dir>/
//!   <bundle name>/
//!     crc-bundle-info.json
//!     oc
//!     ...
//! <bin_dir>/
//!   oc            (symlink into the bundle, or a copy on Windows)
//! ```
//!
//! [`Repository`] resolves names ([`get`](Repository::get)), publishes
//! ([`use_bundle`](Repository::use_bundle)) and extracts archives
//! ([`extract`](Repository::extract)). How executables are published is
//! decided by a [`Publisher`].

pub mod error;
mod info;
mod publish;
mod repo;

pub use crate::info::{BundleInfo, Metadata};
pub use crate::publish::{CopyPublisher, Publisher, PublisherHandle, SymlinkPublisher, default_publisher};
pub use crate::repo::Repository;
