//! Manifest download with a time based local cache.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{debug, error};

use crate::lock::CacheLock;

/// Cached manifests older than this are downloaded again.
pub const CACHE_PERIOD: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unable to inspect the cached file at {}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to lock the cached file at {}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to create a file on the filesystem at {}", path.display())]
    FileCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("downloading {} into {} failed", url, path.display())]
    Download {
        url: String,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("unable to change permission on {}", path.display())]
    PermissionChange {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to read the manifest at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub trait Clock {
    fn now(&self) -> SystemTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Reports the last modification time of a file.
pub trait FileStat {
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

pub struct FsStat;

impl FileStat for FsStat {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }
}

/// Streams the body found at `url` into `sink`, returning the number of bytes written.
pub trait Downloader {
    fn download(&self, url: &str, sink: &mut dyn Write) -> anyhow::Result<u64>;
}

pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    /// `None` lets a download take as long as it needs.
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<HttpDownloader> {
        // the blocking client defaults to 30s unless given None
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(HttpDownloader { client })
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, sink: &mut dyn Write) -> anyhow::Result<u64> {
        let mut resp = self.client.get(url).send()?.error_for_status()?;
        let written = io::copy(&mut resp, sink)?;

        Ok(written)
    }
}

pub struct Fetcher {
    clock: Box<dyn Clock>,
    stat: Box<dyn FileStat>,
    downloader: Box<dyn Downloader>,
    cache_period: Duration,
}

fn logged(err: FetchError) -> FetchError {
    match std::error::Error::source(&err) {
        Some(cause) => error!(cause = %cause, "{}", err),
        None => error!("{}", err),
    }
    err
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

impl Fetcher {
    pub fn new(downloader: Box<dyn Downloader>) -> Fetcher {
        Fetcher {
            clock: Box::new(SystemClock),
            stat: Box::new(FsStat),
            downloader,
            cache_period: CACHE_PERIOD,
        }
    }

    pub fn with_cache_period(mut self, cache_period: Duration) -> Fetcher {
        self.cache_period = cache_period;
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Fetcher {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn with_stat(mut self, stat: Box<dyn FileStat>) -> Fetcher {
        self.stat = stat;
        self
    }

    /// A missing file is stale. Any other stat failure is reported instead of
    /// being taken as a reason to download.
    fn needs_download(&self, local_file: &Path) -> Result<bool, FetchError> {
        match self.stat.modified(local_file) {
            Ok(modified) => {
                // a modification time in the future reads as age zero
                let age = self
                    .clock
                    .now()
                    .duration_since(modified)
                    .unwrap_or_default();
                Ok(age > self.cache_period)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(source) => Err(logged(FetchError::Inspect {
                path: local_file.to_path_buf(),
                source,
            })),
        }
    }

    fn download_file(&self, url: &str, local_file: &Path) -> Result<(), FetchError> {
        let mut file = File::create(local_file).map_err(|source| {
            logged(FetchError::FileCreate {
                path: local_file.to_path_buf(),
                source,
            })
        })?;

        let written = self.downloader.download(url, &mut file).map_err(|source| {
            // a partial file would otherwise be served as fresh on the next call
            let _ = fs::remove_file(local_file);
            logged(FetchError::Download {
                url: url.to_string(),
                path: local_file.to_path_buf(),
                source,
            })
        })?;
        drop(file);

        make_executable(local_file).map_err(|source| {
            logged(FetchError::PermissionChange {
                path: local_file.to_path_buf(),
                source,
            })
        })?;

        debug!(url, path = %local_file.display(), bytes = written, "file successfully downloaded");
        Ok(())
    }

    /// Returns the manifest at `url`, served from `local_file` while it is
    /// younger than the cache period.
    pub fn get_manifest(&self, url: &str, local_file: &Path) -> Result<String, FetchError> {
        let _lock = CacheLock::acquire(local_file).map_err(|source| {
            logged(FetchError::Lock {
                path: local_file.to_path_buf(),
                source,
            })
        })?;

        if self.needs_download(local_file)? {
            self.download_file(url, local_file)?;
        } else {
            debug!(path = %local_file.display(), "using cached manifest");
        }

        fs::read_to_string(local_file).map_err(|source| {
            logged(FetchError::Read {
                path: local_file.to_path_buf(),
                source,
            })
        })
    }
}
