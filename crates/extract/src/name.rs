use crate::error::{ErrorKind, Result};
use crc_compress::Compression;
use exn::OptionExt;
use std::path::Path;

const TAR_EXTENSION: &str = ".tar";

/// Derive the directory name an archive is extracted to.
///
/// The final extension is dropped (`crc_libvirt_4.6.1.crcbundle` becomes
/// `crc_libvirt_4.6.1`), and for compressed tarballs the inner `.tar` goes
/// with it (`bundle.tar.xz` becomes `bundle`).
///
/// # Examples
///
/// ```
/// use crc_extract::bundle_dir_name;
///
/// assert_eq!(bundle_dir_name("/tmp/myapp-1.2.crcbundle").unwrap(), "myapp-1.2");
/// assert_eq!(bundle_dir_name("bundle.tar.gz").unwrap(), "bundle");
/// assert!(bundle_dir_name("/").is_err());
/// ```
pub fn bundle_dir_name(archive: impl AsRef<Path>) -> Result<String> {
    let archive = archive.as_ref();
    let invalid = || ErrorKind::InvalidName(archive.to_path_buf());
    let file_name = archive.file_name().and_then(|n| n.to_str()).ok_or_raise(invalid)?;
    let stem = match file_name.rfind('.') {
        // Dotfiles (".crcbundle") have no extension to strip.
        Some(0) | None => file_name,
        Some(dot) => &file_name[..dot],
    };
    let stem = match Compression::from_path(file_name) {
        Compression::None => stem,
        _ => stem.strip_suffix(TAR_EXTENSION).unwrap_or(stem),
    };
    if stem.is_empty() || stem == "." || stem == ".." {
        exn::bail!(invalid());
    }
    Ok(stem.to_string())
}
