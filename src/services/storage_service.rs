//! StorageService — the upload proxy for guestbook images.
//!
//! Accepts raw image bytes, generates a collision-resistant name, and writes
//! the blob into the local bucket under one of a fixed, ordered list of
//! candidate folder prefixes, stopping at the first success. When every
//! prefix fails the bytes go to a separate fallback directory that is served
//! as root-relative `/uploads/...` URLs. There is no idempotency guarantee;
//! retried calls create new blobs.

use chrono::Utc;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Hard cap on upload size. Oversized files are rejected outright.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const DEFAULT_EXTENSION: &str = "jpg";
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file received or file is empty")]
    EmptyFile,
    #[error("file too large ({size} bytes, limit {MAX_UPLOAD_BYTES})")]
    TooLarge { size: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Where an uploaded blob ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredLocation {
    /// Stored in the bucket under the given candidate prefix.
    Bucket { prefix: String },
    /// Every bucket prefix failed; the blob lives in the fallback directory.
    Fallback,
}

/// Outcome of a successful upload.
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Public URL for the blob (absolute or root-relative).
    pub url: String,
    pub location: StoredLocation,
    /// md5 of the payload, for diagnostics.
    pub etag: String,
}

/// Destination for bucket writes. The production implementation is a local
/// directory tree; tests substitute stores that fail selected prefixes.
pub trait BlobStore: Send + Sync {
    fn put(
        &self,
        path: &str,
        bytes: &[u8],
    ) -> impl std::future::Future<Output = io::Result<()>> + Send;

    /// Public URL under which a stored path is reachable.
    fn public_url(&self, path: &str) -> String;
}

/// On-disk bucket replacement: blobs live under `root/{prefix}/{filename}`
/// and are served back by this same server at `/files/{prefix}/{filename}`.
#[derive(Clone, Debug)]
pub struct DiskStore {
    pub root: PathBuf,
    /// Absolute URL prefix; when unset URLs are root-relative.
    pub public_base: Option<String>,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>, public_base: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.map(|b| b.trim_end_matches('/').to_string()),
        }
    }

    /// Open a stored blob for streaming out. Returns the file handle and its
    /// length in bytes.
    pub async fn open(&self, path: &str) -> io::Result<(File, u64)> {
        ensure_path_safe(path)?;
        let full = self.root.join(path);
        let file = File::open(&full).await?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// List filenames directly under a prefix, for the status endpoint.
    pub async fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        ensure_path_safe(prefix)?;
        let dir = self.root.join(prefix);
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(names),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

impl BlobStore for DiskStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        ensure_path_safe(path)?;
        let full = self.root.join(path);
        let parent = full
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "blob path missing parent"))?;
        fs::create_dir_all(&parent).await?;

        // Write through a temp file and rename so readers never see a
        // partial blob.
        let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp).await?;
        if let Err(err) = write_all_durable(&mut file, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err);
        }
        if let Err(err) = fs::rename(&tmp, &full).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err);
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        match &self.public_base {
            Some(base) => format!("{}/files/{}", base, path),
            None => format!("/files/{}", path),
        }
    }
}

async fn write_all_durable(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// The upload proxy itself: candidate prefixes plus the local fallback.
#[derive(Clone)]
pub struct StorageService<S: BlobStore> {
    store: S,
    prefixes: Vec<String>,
    fallback_dir: PathBuf,
}

impl<S: BlobStore> StorageService<S> {
    pub fn new(store: S, prefixes: Vec<String>, fallback_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            prefixes,
            fallback_dir: fallback_dir.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Store an uploaded image and return its public URL.
    ///
    /// Each candidate prefix is attempted once, in order. A failed prefix is
    /// never retried; the next one is tried instead. Only when the fallback
    /// write also fails does the whole upload fail.
    pub async fn store_image(
        &self,
        original_filename: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> UploadResult<StoredImage> {
        if bytes.is_empty() {
            return Err(UploadError::EmptyFile);
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(UploadError::TooLarge { size: bytes.len() });
        }
        if let Some(ct) = content_type {
            if !ct.starts_with("image/") {
                warn!("unexpected content type `{}` for upload, accepting anyway", ct);
            }
        }

        let filename = generate_file_name(original_filename);
        let etag = format!("{:x}", md5::compute(bytes));

        for prefix in &self.prefixes {
            let path = format!("{}/{}", prefix, filename);
            match self.store.put(&path, bytes).await {
                Ok(()) => {
                    debug!("stored upload at {}", path);
                    return Ok(StoredImage {
                        url: self.store.public_url(&path),
                        location: StoredLocation::Bucket {
                            prefix: prefix.clone(),
                        },
                        etag,
                    });
                }
                Err(err) => {
                    warn!("upload to prefix `{}` failed: {}", prefix, err);
                }
            }
        }

        // Last resort: local fallback directory, root-relative URL.
        fs::create_dir_all(&self.fallback_dir).await?;
        let full = self.fallback_dir.join(&filename);
        let mut file = File::create(&full).await?;
        if let Err(err) = write_all_durable(&mut file, bytes).await {
            let _ = fs::remove_file(&full).await;
            return Err(UploadError::Io(err));
        }
        debug!("stored upload in fallback dir as {}", filename);
        Ok(StoredImage {
            url: format!("/uploads/{}", filename),
            location: StoredLocation::Fallback,
            etag,
        })
    }
}

/// Crude MIME guess from a filename extension, used both when uploading and
/// when serving blobs back.
pub fn content_type_for(filename: &str) -> &'static str {
    match filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
    {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Reject path traversal in blob paths: no leading `/`, no `..`, no control
/// characters or backslashes.
pub fn ensure_path_safe(path: &str) -> io::Result<()> {
    let ok = !path.is_empty()
        && !path.starts_with('/')
        && !path.contains("..")
        && !path
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if ok {
        Ok(())
    } else {
        Err(io::Error::new(ErrorKind::InvalidInput, "invalid blob path"))
    }
}

/// `{unix_millis}-{8 random hex}.{ext}`, extension taken from the original
/// filename when it looks sane.
pub fn generate_file_name(original: &str) -> String {
    let ext = original
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.into());

    let millis = Utc::now().timestamp_millis();
    let rand = Uuid::new_v4().simple().to_string();
    format!("{}-{}.{}", millis, &rand[..8], ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records attempted paths and fails the first `fail_first` attempts.
    struct FlakyStore {
        attempts: Mutex<Vec<String>>,
        fail_first: usize,
    }

    impl FlakyStore {
        fn new(fail_first: usize) -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                fail_first,
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().expect("lock").clone()
        }
    }

    impl BlobStore for &FlakyStore {
        async fn put(&self, path: &str, _bytes: &[u8]) -> io::Result<()> {
            let mut attempts = self.attempts.lock().expect("lock");
            attempts.push(path.to_string());
            if attempts.len() <= self.fail_first {
                Err(io::Error::new(ErrorKind::PermissionDenied, "denied"))
            } else {
                Ok(())
            }
        }

        fn public_url(&self, path: &str) -> String {
            format!("https://bucket.test/{}", path)
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("brevkasse-{}-{}", tag, Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn prefixes() -> Vec<String> {
        vec!["p0/eget_0".into(), "uploads".into(), "billeder".into()]
    }

    #[test]
    fn generated_names_keep_sane_extensions() {
        assert!(generate_file_name("kat.PNG").ends_with(".png"));
        assert!(generate_file_name("noext").ends_with(".jpg"));
        assert!(generate_file_name("weird.tar.gz").ends_with(".gz"));
        assert!(generate_file_name("evil.<script>").ends_with(".jpg"));
        assert_ne!(generate_file_name("a.jpg"), generate_file_name("a.jpg"));
    }

    #[test]
    fn guesses_content_types() {
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a"), "application/octet-stream");
    }

    #[test]
    fn path_safety_rejects_traversal() {
        assert!(ensure_path_safe("billeder/a.jpg").is_ok());
        assert!(ensure_path_safe("../etc/passwd").is_err());
        assert!(ensure_path_safe("/abs").is_err());
        assert!(ensure_path_safe("a\\b").is_err());
        assert!(ensure_path_safe("").is_err());
    }

    #[tokio::test]
    async fn first_successful_prefix_wins() {
        let store = FlakyStore::new(0);
        let service = StorageService::new(&store, prefixes(), temp_dir("fallback"));

        let stored = service
            .store_image("kat.jpg", Some("image/jpeg"), b"bytes")
            .await
            .expect("upload");

        assert_eq!(
            stored.location,
            StoredLocation::Bucket {
                prefix: "p0/eget_0".into()
            }
        );
        assert!(stored.url.starts_with("https://bucket.test/p0/eget_0/"));
        assert_eq!(store.attempts().len(), 1);
    }

    #[tokio::test]
    async fn failed_prefix_is_skipped_not_retried() {
        let store = FlakyStore::new(1);
        let service = StorageService::new(&store, prefixes(), temp_dir("fallback"));

        let stored = service
            .store_image("kat.jpg", Some("image/jpeg"), b"bytes")
            .await
            .expect("upload");

        assert_eq!(
            stored.location,
            StoredLocation::Bucket {
                prefix: "uploads".into()
            }
        );
        let attempts = store.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].starts_with("p0/eget_0/"));
        assert!(attempts[1].starts_with("uploads/"));
    }

    #[tokio::test]
    async fn falls_back_to_local_disk_when_all_prefixes_fail() {
        let store = FlakyStore::new(usize::MAX);
        let fallback = temp_dir("fallback");
        let service = StorageService::new(&store, prefixes(), fallback.clone());

        let stored = service
            .store_image("kat.jpg", Some("image/jpeg"), b"bytes")
            .await
            .expect("upload");

        assert_eq!(stored.location, StoredLocation::Fallback);
        assert!(stored.url.starts_with("/uploads/"));
        assert_eq!(store.attempts().len(), 3);

        let name = stored.url.trim_start_matches("/uploads/");
        let on_disk = std::fs::read(fallback.join(name)).expect("fallback file");
        assert_eq!(on_disk, b"bytes");
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_files() {
        let store = FlakyStore::new(0);
        let service = StorageService::new(&store, prefixes(), temp_dir("fallback"));

        assert!(matches!(
            service.store_image("kat.jpg", None, b"").await,
            Err(UploadError::EmptyFile)
        ));

        let oversized = vec![0u8; MAX_UPLOAD_BYTES + 1];
        assert!(matches!(
            service.store_image("kat.jpg", None, &oversized).await,
            Err(UploadError::TooLarge { .. })
        ));
        assert!(store.attempts().is_empty());
    }

    #[tokio::test]
    async fn disk_store_round_trips_bytes() {
        let root = temp_dir("bucket");
        let store = DiskStore::new(root, None);

        store.put("billeder/a.jpg", b"123").await.expect("put");
        let (mut file, len) = store.open("billeder/a.jpg").await.expect("open");
        assert_eq!(len, 3);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut file, &mut buf)
            .await
            .expect("read");
        assert_eq!(buf, b"123");

        assert_eq!(store.public_url("billeder/a.jpg"), "/files/billeder/a.jpg");
        assert_eq!(store.list("billeder").await.expect("list"), vec!["a.jpg"]);
        assert!(store.list("tom").await.expect("list empty").is_empty());
    }
}
