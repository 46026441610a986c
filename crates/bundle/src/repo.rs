//! The bundle cache: resolution of bundle names to extracted bundles, and
//! their lifecycle (extract, then use).

use crate::error::{ErrorKind, Result};
use crate::info::{BundleInfo, Metadata};
use crate::publish::{PublisherHandle, default_publisher};
use crc_config::{Config, DEFAULT_BUNDLE_EXTENSION, DEFAULT_EXECUTABLE_NAME, DEFAULT_METADATA_FILENAME, is_file_name};
use exn::ResultExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Repository of extracted bundles under a cache directory.
///
/// There is no index: a bundle is installed when `cache_dir/<name>` is a
/// directory containing a valid metadata file. Every operation is
/// synchronous and the repository takes no locks, so callers extracting or
/// using the *same* bundle from several threads or processes must serialize
/// those calls themselves.
///
/// # Examples
///
/// ```no_run
/// use crc_bundle::Repository;
///
/// # fn example() -> crc_bundle::error::Result<()> {
/// let repo = Repository::new("/home/user/.crc/cache", "/home/user/.crc/bin/oc");
/// let bundle = repo.extract_and_use("/home/user/Downloads/crc_libvirt_4.6.1.crcbundle")?;
/// println!("using bundle at {}", bundle.cached_path().display());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Repository {
    cache_dir: PathBuf,
    bin_dir: PathBuf,
    executable_name: String,
    bundle_extension: String,
    metadata_filename: String,
    publisher: PublisherHandle,
}

impl Debug for Repository {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Repository")
            .field("cache_dir", &self.cache_dir)
            .field("bin_dir", &self.bin_dir)
            .field("executable_name", &self.executable_name)
            .field("bundle_extension", &self.bundle_extension)
            .field("metadata_filename", &self.metadata_filename)
            .field("publisher", &self.publisher.name())
            .finish()
    }
}

impl From<&Config> for Repository {
    fn from(config: &Config) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            bin_dir: config.bin_dir.clone(),
            executable_name: config.executable_name.clone(),
            bundle_extension: config.bundle_extension.clone(),
            metadata_filename: config.metadata_filename.clone(),
            publisher: default_publisher(),
        }
    }
}

impl Repository {
    /// Create a repository with the default file names and the platform's
    /// default publisher.
    pub fn new(cache_dir: impl Into<PathBuf>, bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            bin_dir: bin_dir.into(),
            executable_name: DEFAULT_EXECUTABLE_NAME.to_string(),
            bundle_extension: DEFAULT_BUNDLE_EXTENSION.to_string(),
            metadata_filename: DEFAULT_METADATA_FILENAME.to_string(),
            publisher: default_publisher(),
        }
    }

    /// Replace the strategy used to expose bundled executables.
    pub fn with_publisher(mut self, publisher: PublisherHandle) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Directory a bundle is (or would be) extracted to.
    ///
    /// One trailing bundle extension is stripped, so `crc_libvirt_4.6.1` and
    /// `crc_libvirt_4.6.1.crcbundle` resolve to the same directory. The name
    /// is otherwise joined as-is: it is not checked for `..` or separators.
    pub fn bundle_path(&self, bundle_name: &str) -> PathBuf {
        self.cache_dir.join(bundle_name.strip_suffix(self.bundle_extension.as_str()).unwrap_or(bundle_name))
    }

    /// Resolve a bundle name to the extracted bundle and its metadata.
    ///
    /// Only reads from the cache, never modifies it.
    #[instrument(skip(self))]
    pub fn get(&self, bundle_name: &str) -> Result<BundleInfo> {
        let path = self.bundle_path(bundle_name);
        // An empty name would resolve to the cache directory itself.
        if path == self.cache_dir {
            exn::bail!(ErrorKind::NotFound(path));
        }
        self.read_bundle(path)
    }

    fn read_bundle(&self, path: PathBuf) -> Result<BundleInfo> {
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => {},
            Ok(_) => exn::bail!(ErrorKind::NotFound(path)),
            // Missing, or a name the filesystem can't hold (too long, NUL
            // bytes): either way there is no such bundle.
            Err(e) => return Err(e).or_raise(|| ErrorKind::NotFound(path)),
        }

        let file = path.join(&self.metadata_filename);
        let contents = fs::read(&file).or_raise(|| ErrorKind::Read(file.clone()))?;
        let metadata: Metadata = serde_json::from_slice(&contents).or_raise(|| ErrorKind::Parse(file.clone()))?;
        // The executable has to be a file inside the bundle directory.
        if let Some(executable) = &metadata.executable
            && !is_file_name(executable)
        {
            exn::bail!(ErrorKind::Parse(file));
        }

        tracing::debug!(path = %path.display(), "resolved cached bundle");
        Ok(BundleInfo::new(metadata, path))
    }

    /// Resolve a bundle and publish its executable into the bin directory.
    ///
    /// The returned bundle carries the published location in
    /// [`BundleInfo::exposed_path`].
    #[instrument(skip(self))]
    pub fn use_bundle(&self, bundle_name: &str) -> Result<BundleInfo> {
        let info = self.get(bundle_name)?;
        self.expose(info)
    }

    fn expose(&self, info: BundleInfo) -> Result<BundleInfo> {
        let exposed = info.publish(&self.bin_dir, &self.executable_name, self.publisher.as_ref())?;
        Ok(info.exposed_at(exposed))
    }

    /// Extract a bundle archive into the cache, returning the directory it
    /// was extracted to.
    ///
    /// The contents aren't checked; a broken bundle is only noticed by the
    /// next [`get`](Self::get) or [`use_bundle`](Self::use_bundle).
    #[instrument(skip(self, archive), fields(archive = %archive.as_ref().display()))]
    pub fn extract(&self, archive: impl AsRef<Path>) -> Result<PathBuf> {
        let archive = archive.as_ref();
        crc_extract::extract(archive, &self.cache_dir, true).or_raise(|| ErrorKind::Extraction(archive.to_path_buf()))
    }

    /// The bundle with this name, with its executable published.
    pub fn cached_bundle_info(&self, bundle_name: &str) -> Result<BundleInfo> {
        self.use_bundle(bundle_name)
    }

    /// Extract a bundle archive into the cache, then use it.
    ///
    /// If extraction succeeds but the bundle can't be used, the extracted
    /// directory stays in the cache so it can be inspected, fixed, and used
    /// later.
    pub fn extract_and_use(&self, archive: impl AsRef<Path>) -> Result<BundleInfo> {
        // Read back from where the archive actually landed rather than
        // resolving its file name a second time.
        let extracted = self.extract(archive)?;
        let info = self.read_bundle(extracted)?;
        self.expose(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{CopyPublisher, SymlinkPublisher};
    use crc_compress::Compression;
    use rstest::rstest;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    const METADATA: &str = r#"{"executable":"oc"}"#;
    const EXECUTABLE: &[u8] = b"#!/bin/sh\necho 'Client Version: 4.6.1'\n";

    fn repo(temp_dir: &TempDir) -> Repository {
        Repository::new(temp_dir.path().join("cache"), temp_dir.path().join("bin").join("oc"))
    }

    fn write_bundle(repo: &Repository, dir_name: &str, metadata: Option<&str>, executable: Option<&[u8]>) -> PathBuf {
        let path = repo.cache_dir().join(dir_name);
        fs::create_dir_all(&path).unwrap();
        if let Some(metadata) = metadata {
            fs::write(path.join(DEFAULT_METADATA_FILENAME), metadata).unwrap();
        }
        if let Some(executable) = executable {
            fs::write(path.join("oc"), executable).unwrap();
        }
        path
    }

    /// An xz compressed bundle archive with its contents wrapped in `wrapper/`.
    fn write_archive(path: &Path, wrapper: &str, metadata: &str) {
        let mut tarball = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tarball);
            for (name, mode, contents) in
                [(DEFAULT_METADATA_FILENAME, 0o644, metadata.as_bytes()), ("oc", 0o755, EXECUTABLE)]
            {
                let mut header = tar::Header::new_gnu();
                header.set_size(contents.len() as u64);
                header.set_mode(mode);
                header.set_cksum();
                builder.append_data(&mut header, format!("{wrapper}/{name}"), contents).unwrap();
            }
            builder.finish().unwrap();
        }
        let mut file = fs::File::create(path).unwrap();
        let mut writer = Compression::Xz.wrap_writer(&mut file).unwrap();
        writer.write_all(&tarball).unwrap();
    }

    fn assert_published(repo: &Repository) {
        let exposed = repo.bin_dir().join("oc");
        assert_eq!(fs::read(&exposed).unwrap(), EXECUTABLE);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // Follows the link, if it is one.
            assert_ne!(fs::metadata(&exposed).unwrap().permissions().mode() & 0o111, 0);
        }
    }

    #[rstest]
    #[case("crc_libvirt_4.6.1")]
    #[case("crc_libvirt_4.6.1.crcbundle")]
    fn test_get_with_or_without_extension(#[case] name: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        let path = write_bundle(&repo, "crc_libvirt_4.6.1", Some(METADATA), None);

        let info = repo.get(name).unwrap();
        assert_eq!(info.cached_path(), path);
        assert_eq!(info.metadata().executable.as_deref(), Some("oc"));
    }

    #[test]
    fn test_get_strips_only_one_extension() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        let path = write_bundle(&repo, "odd.crcbundle", Some(METADATA), None);

        assert_eq!(repo.get("odd.crcbundle.crcbundle").unwrap().cached_path(), path);
        assert!(matches!(*repo.get("odd").unwrap_err(), ErrorKind::NotFound(_)));
    }

    #[rstest]
    #[case("missing")]
    #[case("missing.crcbundle")]
    #[case("")]
    #[case(".crcbundle")]
    // Exists, but is a file rather than an extracted bundle.
    #[case("archive-left-in-cache.crcbundle.part")]
    #[case("bad\0name")]
    fn test_get_not_found(#[case] name: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        fs::create_dir_all(repo.cache_dir()).unwrap();
        fs::write(repo.cache_dir().join("archive-left-in-cache.crcbundle.part"), b"").unwrap();

        let err = repo.get(name).unwrap_err();
        assert!(matches!(*err, ErrorKind::NotFound(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn test_get_name_too_long() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        fs::create_dir_all(repo.cache_dir()).unwrap();

        let err = repo.get(&"a".repeat(300)).unwrap_err();
        assert!(matches!(*err, ErrorKind::NotFound(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn test_get_without_cache_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = repo(&temp_dir).get("crc_libvirt_4.6.1").unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound(temp_dir.path().join("cache").join("crc_libvirt_4.6.1")));
    }

    #[test]
    fn test_get_missing_metadata() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        let path = write_bundle(&repo, "crc_libvirt_4.6.1", None, Some(EXECUTABLE));

        let err = repo.get("crc_libvirt_4.6.1").unwrap_err();
        assert_eq!(*err, ErrorKind::Read(path.join(DEFAULT_METADATA_FILENAME)));
    }

    #[rstest]
    #[case("")]
    #[case("not json at all")]
    #[case("[]")]
    #[case(r#"{"executable": 5}"#)]
    #[case(r#"{"executable": "../../usr/bin/oc"}"#)]
    #[case(r#"{"executable": ""}"#)]
    fn test_get_malformed_metadata(#[case] metadata: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        let path = write_bundle(&repo, "crc_libvirt_4.6.1", Some(metadata), Some(EXECUTABLE));

        let err = repo.get("crc_libvirt_4.6.1").unwrap_err();
        assert_eq!(*err, ErrorKind::Parse(path.join(DEFAULT_METADATA_FILENAME)));
    }

    #[test]
    fn test_get_does_not_publish() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        write_bundle(&repo, "crc_libvirt_4.6.1", Some(METADATA), Some(EXECUTABLE));

        let info = repo.get("crc_libvirt_4.6.1").unwrap();
        assert_eq!(info.exposed_path(), None);
        assert!(!repo.bin_dir().exists());
    }

    #[rstest]
    #[cfg_attr(unix, case(Arc::new(SymlinkPublisher)))]
    #[case(Arc::new(CopyPublisher))]
    fn test_use_is_idempotent(#[case] publisher: PublisherHandle) {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir).with_publisher(publisher);
        write_bundle(&repo, "crc_libvirt_4.6.1", Some(METADATA), Some(EXECUTABLE));

        let first = repo.use_bundle("crc_libvirt_4.6.1").unwrap();
        assert_eq!(first.exposed_path(), Some(repo.bin_dir().join("oc").as_path()));
        assert_published(&repo);
        let second = repo.use_bundle("crc_libvirt_4.6.1.crcbundle").unwrap();
        assert_published(&repo);
        assert_eq!(first, second);
    }

    #[test]
    fn test_use_falls_back_to_configured_executable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir).with_publisher(Arc::new(CopyPublisher));
        write_bundle(&repo, "crc_libvirt_4.6.1", Some(r#"{"name": "crc_libvirt_4.6.1"}"#), Some(EXECUTABLE));

        repo.use_bundle("crc_libvirt_4.6.1").unwrap();
        assert_eq!(fs::read(repo.bin_dir().join(DEFAULT_EXECUTABLE_NAME)).unwrap(), EXECUTABLE);
    }

    #[cfg(unix)]
    #[test]
    fn test_use_with_relative_dirs() {
        let cwd = std::env::current_dir().unwrap();
        let temp_dir = tempfile::tempdir_in(&cwd).unwrap();
        let relative = temp_dir.path().strip_prefix(&cwd).unwrap();
        let repo = Repository::new(relative.join("cache"), relative.join("bin"))
            .with_publisher(Arc::new(SymlinkPublisher));
        write_bundle(&repo, "crc_libvirt_4.6.1", Some(METADATA), Some(EXECUTABLE));

        let info = repo.use_bundle("crc_libvirt_4.6.1").unwrap();
        assert_eq!(info.exposed_path(), Some(relative.join("bin").join("oc").as_path()));
        assert_published(&repo);
    }

    #[test]
    fn test_use_passes_resolution_errors_through() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        write_bundle(&repo, "broken", Some("{"), Some(EXECUTABLE));

        assert!(matches!(*repo.use_bundle("missing").unwrap_err(), ErrorKind::NotFound(_)));
        assert!(matches!(*repo.use_bundle("broken").unwrap_err(), ErrorKind::Parse(_)));
        assert!(!repo.bin_dir().exists());
    }

    #[test]
    fn test_use_without_executable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        write_bundle(&repo, "crc_libvirt_4.6.1", Some(METADATA), None);

        let err = repo.use_bundle("crc_libvirt_4.6.1").unwrap_err();
        assert_eq!(*err, ErrorKind::Publish(repo.bin_dir().join("oc")));
    }

    #[test]
    fn test_extract_and_use() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        let archive = temp_dir.path().join("myapp-1.2.crcbundle");
        write_archive(&archive, "payload", METADATA);

        let info = repo.extract_and_use(&archive).unwrap();
        assert!(info.cached_path().ends_with("myapp-1.2"));
        assert!(!repo.cache_dir().join("payload").exists());
        assert_published(&repo);

        let again = repo.cached_bundle_info("myapp-1.2.crcbundle").unwrap();
        assert_eq!(again.cached_path(), repo.cache_dir().join("myapp-1.2"));
        assert_published(&repo);
    }

    #[test]
    fn test_extract_and_use_tarball_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        let archive = temp_dir.path().join("myapp-1.3.tar.xz");
        write_archive(&archive, "myapp-1.3", METADATA);

        let info = repo.extract_and_use(&archive).unwrap();
        assert_eq!(info.cached_path(), repo.cache_dir().join("myapp-1.3"));
    }

    #[test]
    fn test_extract_and_use_bare_extension() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        let archive = temp_dir.path().join(".crcbundle");
        write_archive(&archive, "payload", METADATA);

        let info = repo.extract_and_use(&archive).unwrap();
        assert_eq!(info.cached_path(), repo.cache_dir().join(".crcbundle"));
        assert_published(&repo);
    }

    #[test]
    fn test_failed_use_keeps_extracted_bundle() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        let archive = temp_dir.path().join("myapp-1.2.crcbundle");
        write_archive(&archive, "payload", r#"{"executable": ["oc"]}"#);

        let err = repo.extract_and_use(&archive).unwrap_err();
        let metadata_file = repo.cache_dir().join("myapp-1.2").join(DEFAULT_METADATA_FILENAME);
        assert_eq!(*err, ErrorKind::Parse(metadata_file.clone()));
        assert!(metadata_file.is_file());

        fs::write(&metadata_file, METADATA).unwrap();
        assert!(repo.get("myapp-1.2.crcbundle").is_ok());
    }

    #[test]
    fn test_extract_missing_archive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        let archive = temp_dir.path().join("missing.crcbundle");

        let err = repo.extract_and_use(&archive).unwrap_err();
        assert_eq!(*err, ErrorKind::Extraction(archive));
        assert!(!repo.bin_dir().exists());
    }

    #[test]
    fn test_from_config() {
        let config = Config::with_base_dir("/home/user/.crc");
        let repo = Repository::from(&config);
        assert_eq!(repo.cache_dir(), Path::new("/home/user/.crc/cache"));
        assert_eq!(repo.bin_dir(), Path::new("/home/user/.crc/bin/oc"));
        assert_eq!(repo.bundle_path("crc.crcbundle"), Path::new("/home/user/.crc/cache/crc"));
    }
}
