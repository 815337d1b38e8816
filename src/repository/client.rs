// src/repository/client.rs

//! HTTP (and `file://`) client for manifests and package archives

use crate::cache::DownloadCache;
use crate::cancel::CancelToken;
use crate::config::Environment;
use crate::error::{Error, Result};
use crate::packages::{PackageIdent, PkgSpec};
use crate::repository::join_url;
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Maximum retry attempts for failed fetches
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Manifest file name under a repository base URL
pub const MANIFEST_NAME: &str = "index";

/// A failed attempt, and whether another attempt may help
#[derive(Debug)]
enum Failure {
    Retry(Error),
    Stop(Error),
}

/// HTTP client wrapper with retry support
#[derive(Debug, Clone)]
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl RepositoryClient {
    /// Create a client honoring the environment's timeout and proxy
    pub fn new(env: &Environment) -> Result<Self> {
        Self::with_settings(env.http_timeout, env.proxy_server.as_deref())
    }

    pub fn with_settings(timeout: Duration, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::InitError(format!("Invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Override the back-off between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Fetch and parse `<base>/index`
    ///
    /// Any failure, including a malformed manifest, is reported as
    /// [`Error::RepoUnavailable`] so the caller can drop the repository.
    pub fn fetch_manifest(&self, base: &str) -> Result<Vec<PkgSpec>> {
        let url = join_url(base, MANIFEST_NAME)
            .map_err(|e| Error::RepoUnavailable(format!("{}: {}", base, e)))?;
        info!("Fetching repository manifest from {}", url);

        let reader = self
            .open_with_retry(&url, &CancelToken::new())
            .map_err(|e| Error::RepoUnavailable(format!("{}: {}", base, e)))?;
        let specs: Vec<PkgSpec> = serde_json::from_reader(BufReader::new(reader))
            .map_err(|e| Error::RepoUnavailable(format!("{}: malformed manifest: {}", base, e)))?;

        debug!("Manifest {} lists {} package(s)", url, specs.len());
        Ok(specs)
    }

    /// Download an archive into the cache, verifying `checksum`
    ///
    /// Transport failures are retried; a checksum mismatch or cancellation
    /// is not.
    pub fn download(
        &self,
        url: &Url,
        ident: &PackageIdent,
        checksum: &str,
        cache: &DownloadCache,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        info!("Downloading {} from {}", ident, url);

        let mut attempt = 0;
        loop {
            attempt += 1;
            cancel.check()?;
            let failure = match self.open(url) {
                Ok(reader) => match cache.store(ident, checksum, reader, cancel) {
                    Ok(path) => {
                        info!("Successfully downloaded to {}", path.display());
                        return Ok(path);
                    }
                    Err(e @ Error::DownloadError(_)) => Failure::Retry(e),
                    Err(e) => Failure::Stop(e),
                },
                Err(failure) => failure,
            };

            match failure {
                Failure::Retry(Error::DownloadError(msg)) if attempt < self.max_retries => {
                    warn!("Download attempt {} failed: {}, retrying...", attempt, msg);
                    self.back_off(attempt);
                }
                Failure::Retry(Error::DownloadError(msg))
                | Failure::Stop(Error::DownloadError(msg)) => {
                    return Err(Error::DownloadError(format!(
                        "Failed to download {} after {} attempt(s): {}",
                        url, attempt, msg
                    )));
                }
                Failure::Retry(e) | Failure::Stop(e) => return Err(e),
            }
        }
    }

    fn open_with_retry(&self, url: &Url, cancel: &CancelToken) -> Result<Box<dyn Read + Send>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            cancel.check()?;
            match self.open(url) {
                Ok(reader) => return Ok(reader),
                Err(Failure::Retry(e)) if attempt < self.max_retries => {
                    warn!("Fetch attempt {} failed: {}, retrying...", attempt, e);
                    self.back_off(attempt);
                }
                Err(Failure::Retry(e)) | Err(Failure::Stop(e)) => return Err(e),
            }
        }
    }

    /// Open a single stream for `url`
    ///
    /// Every transport failure is a [`Error::DownloadError`]; a missing
    /// file or a 4xx response is not worth retrying.
    fn open(&self, url: &Url) -> std::result::Result<Box<dyn Read + Send>, Failure> {
        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    Failure::Stop(Error::ParseError(format!("invalid file URL {}", url)))
                })?;
                let file = File::open(&path).map_err(|e| {
                    let error = Error::DownloadError(format!("{}: {}", path.display(), e));
                    match e.kind() {
                        ErrorKind::NotFound | ErrorKind::PermissionDenied => Failure::Stop(error),
                        _ => Failure::Retry(error),
                    }
                })?;
                Ok(Box::new(file))
            }
            "http" | "https" => {
                let response = self.client.get(url.clone()).send().map_err(|e| {
                    Failure::Retry(Error::DownloadError(format!("{}: {}", url, e)))
                })?;
                let status = response.status();
                if status.is_server_error() {
                    return Err(Failure::Retry(Error::DownloadError(format!(
                        "HTTP {} from {}",
                        status, url
                    ))));
                }
                if !status.is_success() {
                    return Err(Failure::Stop(Error::DownloadError(format!(
                        "HTTP {} from {}",
                        status, url
                    ))));
                }
                Ok(Box::new(response))
            }
            other => Err(Failure::Stop(Error::ParseError(format!(
                "unsupported URL scheme '{}' in {}",
                other, url
            )))),
        }
    }

    fn back_off(&self, attempt: u32) {
        std::thread::sleep(self.retry_delay * attempt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256_bytes;
    use crate::packages::Arch;
    use crate::version::Version;
    use std::fs;

    fn client() -> RepositoryClient {
        RepositoryClient::with_settings(Duration::from_secs(5), None)
            .unwrap()
            .with_retry_delay(Duration::from_millis(1))
    }

    fn file_url(path: &std::path::Path) -> String {
        Url::from_directory_path(path).unwrap().to_string()
    }

    #[test]
    fn test_fetch_manifest_from_file_repo() {
        let dir = tempfile::tempdir().unwrap();
        let spec = PkgSpec::new("foo", Arch::Noarch, Version::parse("1.0").unwrap());
        fs::write(
            dir.path().join(MANIFEST_NAME),
            serde_json::to_vec(&vec![spec.clone()]).unwrap(),
        )
        .unwrap();

        let specs = client().fetch_manifest(&file_url(dir.path())).unwrap();
        assert_eq!(specs, vec![spec]);
    }

    #[test]
    fn test_missing_or_malformed_manifest_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let base = file_url(dir.path());
        assert!(matches!(
            client().fetch_manifest(&base),
            Err(Error::RepoUnavailable(_))
        ));

        fs::write(dir.path().join(MANIFEST_NAME), b"{not json").unwrap();
        assert!(matches!(
            client().fetch_manifest(&base),
            Err(Error::RepoUnavailable(_))
        ));
    }

    #[test]
    fn test_download_into_cache() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let data = b"package bytes";
        fs::write(repo.path().join("foo.noarch.1.goo"), data).unwrap();

        let url = join_url(&file_url(repo.path()), "foo.noarch.1.goo").unwrap();
        let ident = PackageIdent::parse("foo.noarch.1").unwrap();
        let cache = DownloadCache::new(cache_dir.path());

        let path = client()
            .download(&url, &ident, &sha256_bytes(data), &cache, &CancelToken::new())
            .unwrap();
        assert_eq!(fs::read(path).unwrap(), data);

        let bad = client().download(&url, &ident, "ff", &cache, &CancelToken::new());
        assert!(matches!(bad, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_download_honors_cancellation() {
        let repo = tempfile::tempdir().unwrap();
        fs::write(repo.path().join("a.goo"), b"x").unwrap();
        let url = join_url(&file_url(repo.path()), "a.goo").unwrap();
        let token = CancelToken::new();
        token.cancel();

        let result = client().download(
            &url,
            &PackageIdent::parse("a.noarch.1").unwrap(),
            &sha256_bytes(b"x"),
            &DownloadCache::new(repo.path().join("cache")),
            &token,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_unsupported_scheme() {
        let url = Url::parse("ftp://example.com/foo").unwrap();
        assert!(matches!(
            client().open(&url),
            Err(Failure::Stop(Error::ParseError(_)))
        ));
    }

    #[test]
    fn test_missing_archive_is_download_error() {
        let repo = tempfile::tempdir().unwrap();
        let url = join_url(&file_url(repo.path()), "gone.noarch.1.goo").unwrap();

        let result = client().download(
            &url,
            &PackageIdent::parse("gone.noarch.1").unwrap(),
            &sha256_bytes(b"x"),
            &DownloadCache::new(repo.path().join("cache")),
            &CancelToken::new(),
        );
        match result {
            Err(Error::DownloadError(msg)) => assert!(msg.contains("after 1 attempt(s)")),
            other => panic!("expected DownloadError, got {:?}", other),
        }
    }
}
