//! Unpacking of bundle tarballs into a destination directory.

use crate::bundle_dir_name;
use crate::error::{ErrorKind, Result};
use crc_compress::Compression;
use exn::ResultExt;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Archives are unpacked into a hidden directory next to their final
/// location, so a failed extraction never leaves a half-written bundle
/// behind under the real name.
const STAGING_PREFIX: &str = ".crc-extract-";

/// Extract the (optionally compressed) tarball at `archive` into `dest`.
///
/// `dest` is created if it does not exist. The compression format is
/// detected from the archive's magic bytes, not its extension.
///
/// With `flatten` set, the archive is extracted into a single directory
/// `dest/<bundle name>` (see [`bundle_dir_name`]). When the archive wraps its
/// contents in exactly one top-level directory, that wrapper is stripped
/// whatever its name, so the result is always named after the archive. An
/// existing directory of the same name is replaced.
///
/// Without `flatten`, top-level entries are placed in `dest` as they are
/// named in the archive, replacing existing entries of the same name.
///
/// Returns the directory holding the extracted contents.
#[instrument(skip(archive, dest), fields(archive = %archive.as_ref().display(), dest = %dest.as_ref().display()))]
pub fn extract(archive: impl AsRef<Path>, dest: impl AsRef<Path>, flatten: bool) -> Result<PathBuf> {
    let archive = archive.as_ref();
    let dest = dest.as_ref();
    // Resolve the name before touching the filesystem.
    let name = flatten.then(|| bundle_dir_name(archive)).transpose()?;

    let file = match File::open(archive) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => exn::bail!(ErrorKind::NotFound(archive.to_path_buf())),
        Err(e) => return Err(e).or_raise(|| ErrorKind::Io(archive.to_path_buf())),
    };
    fs::create_dir_all(dest).or_raise(|| ErrorKind::Io(dest.to_path_buf()))?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(dest)
        .or_raise(|| ErrorKind::Io(dest.to_path_buf()))?;

    let (format, reader) =
        Compression::detect_reader(BufReader::new(file)).or_raise(|| ErrorKind::InvalidArchive(archive.to_path_buf()))?;
    if let Err(e) = tar::Archive::new(reader).unpack(staging.path()) {
        let kind = match is_destination_failure(&e) {
            true => ErrorKind::Io(dest.to_path_buf()),
            false => ErrorKind::InvalidArchive(archive.to_path_buf()),
        };
        return Err(e).or_raise(|| kind);
    }
    tracing::debug!(%format, staging = %staging.path().display(), "unpacked archive");

    let Some(name) = name else {
        for entry in fs::read_dir(staging.path()).or_raise(|| ErrorKind::Io(dest.to_path_buf()))? {
            let entry = entry.or_raise(|| ErrorKind::Io(dest.to_path_buf()))?;
            replace(&entry.path(), &dest.join(entry.file_name()))?;
        }
        return Ok(dest.to_path_buf());
    };

    let target = dest.join(&name);
    let source = match single_top_level_dir(staging.path())? {
        Some(wrapper) => wrapper,
        // Nothing to strip: the staging directory itself becomes the bundle.
        // Dropping `staging` afterwards is harmless, removal of a path that
        // no longer exists is ignored.
        None => staging.path().to_path_buf(),
    };
    replace(&source, &target)?;
    tracing::info!(bundle = %name, path = %target.display(), "extracted bundle");
    Ok(target)
}

/// Errors caused by the destination (rather than by the archive's content)
/// are worth retrying once the disk or permissions are sorted out.
fn is_destination_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::StorageFull
            | io::ErrorKind::ReadOnlyFilesystem
            | io::ErrorKind::QuotaExceeded
    )
}

/// Returns the only entry of `dir` if it is a directory.
fn single_top_level_dir(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir).or_raise(|| ErrorKind::Io(dir.to_path_buf()))?;
    let (Some(first), None) = (entries.next(), entries.next()) else {
        return Ok(None);
    };
    let first = first.or_raise(|| ErrorKind::Io(dir.to_path_buf()))?;
    let is_dir = first.file_type().or_raise(|| ErrorKind::Io(first.path()))?.is_dir();
    Ok(is_dir.then(|| first.path()))
}

/// Move `source` to `target`, removing whatever is at `target` first.
fn replace(source: &Path, target: &Path) -> Result<()> {
    let removed = match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target),
        Ok(_) => fs::remove_file(target),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    removed.or_raise(|| ErrorKind::Io(target.to_path_buf()))?;
    fs::rename(source, target).or_raise(|| ErrorKind::Io(target.to_path_buf()))
}
