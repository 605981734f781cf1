//! The remote fetch collaborator.
//!
//! Three asynchronous operations, each keyed by a transaction id and
//! delivering exactly one terminal event (or `TransactionFailed`) plus zero
//! or more `DownloadProgress` events. The orchestrator never awaits these
//! directly; it drives them through the blocking transaction runner.

use async_trait::async_trait;
use futures::StreamExt;
use nimbus_core::{NimbusError, PlatformUnpacker, PlatformVersion, Result, ServiceRequest};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One fetch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCommand {
    PlatformVersionAndSize,
    DownloadPlatform,
    DownloadServices,
}

/// Callback-shaped events of one fetch transaction.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    DownloadProgress {
        tid: u32,
        item: String,
        percent: u8,
    },
    PlatformVersionAndSize {
        tid: u32,
        version: String,
        size: u64,
    },
    PlatformDownloaded {
        tid: u32,
    },
    ServicesDownloaded {
        tid: u32,
    },
    TransactionFailed {
        tid: u32,
        message: String,
    },
}

impl FetchEvent {
    /// Terminal events end their transaction; progress does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FetchEvent::DownloadProgress { .. })
    }
}

/// Listener interface for fetch events, held weakly by the transaction
/// runner so a released observer just stops receiving callbacks.
pub trait FetchListener {
    fn on_download_progress(&self, _tid: u32, _item: &str, _percent: u8) {}
    fn on_platform_version_and_size(&self, _tid: u32, _version: &str, _size: u64) {}
    fn on_platform_downloaded(&self, _tid: u32) {}
    fn on_services_downloaded(&self, _tid: u32) {}
    fn on_transaction_failed(&self, _tid: u32, _message: &str) {}
}

/// Sink the fetcher pushes its events into.
pub type EventSink = mpsc::UnboundedSender<FetchEvent>;

/// The fetch collaborator seam. Implementations send exactly one terminal
/// event per operation; failures are events, not `Err` returns.
#[async_trait(?Send)]
pub trait Fetcher {
    async fn get_platform_version_and_size(&mut self, dest_dir: &Path, events: &EventSink);
    async fn get_platform(&mut self, dest_dir: &Path, events: &EventSink);
    async fn get_services(
        &mut self,
        dest_dir: &Path,
        services: &[ServiceRequest],
        events: &EventSink,
    );

    /// Platform version discovered by the most recent operation, if any.
    fn platform_version(&self) -> Option<String>;

    /// Platform archive size discovered by the most recent operation.
    fn platform_size(&self) -> u64;
}

#[derive(Debug, Deserialize)]
struct LatestPlatform {
    version: String,
    size: u64,
}

/// HTTP implementation over the configured distribution servers. Servers
/// are tried in order; the first one that answers wins.
pub struct DistroFetcher {
    client: reqwest::Client,
    servers: Vec<String>,
    next_tid: u32,
    platform_version: Option<String>,
    platform_size: u64,
}

impl DistroFetcher {
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            servers,
            next_tid: 0,
            platform_version: None,
            platform_size: 0,
        }
    }

    fn alloc_tid(&mut self) -> u32 {
        self.next_tid += 1;
        self.next_tid
    }

    fn endpoint(server: &str, path: &str) -> String {
        format!("{}/{}", server.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut last_error = String::from("no distribution servers configured");
        for server in &self.servers {
            let url = Self::endpoint(server, path);
            debug!("GET {url}");
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp.json::<T>().await.map_err(|e| NimbusError::Transfer {
                        message: format!("bad response from {url}: {e}"),
                    });
                }
                Ok(resp) => last_error = format!("{url}: HTTP {}", resp.status()),
                Err(e) => last_error = format!("{url}: {e}"),
            }
        }
        Err(NimbusError::Transfer {
            message: last_error,
        })
    }

    /// Stream one archive to disk, emitting percent progress for `item`.
    async fn download_archive(
        &self,
        path: &str,
        dest: &Path,
        size_hint: u64,
        tid: u32,
        item: &str,
        events: &EventSink,
    ) -> Result<()> {
        let mut last_error = String::from("no distribution servers configured");
        for server in &self.servers {
            let url = Self::endpoint(server, path);
            debug!("GET {url} -> {}", dest.display());
            let resp = match self.client.get(&url).send().await {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    last_error = format!("{url}: HTTP {}", r.status());
                    continue;
                }
                Err(e) => {
                    last_error = format!("{url}: {e}");
                    continue;
                }
            };

            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| NimbusError::io_with_path(e, parent))?;
            }
            let mut file = std::fs::File::create(dest)
                .map_err(|e| NimbusError::io_with_path(e, dest))?;

            let total = resp.content_length().unwrap_or(size_hint);
            let mut downloaded: u64 = 0;
            let mut last_pct: u8 = 0;
            let mut stream = resp.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| NimbusError::Transfer {
                    message: format!("{url}: {e}"),
                })?;
                file.write_all(&chunk)
                    .map_err(|e| NimbusError::io_with_path(e, dest))?;
                downloaded += chunk.len() as u64;
                if total > 0 {
                    let pct = ((downloaded.min(total) * 100) / total) as u8;
                    if pct != last_pct {
                        last_pct = pct;
                        let _ = events.send(FetchEvent::DownloadProgress {
                            tid,
                            item: item.to_string(),
                            percent: pct,
                        });
                    }
                }
            }
            info!("downloaded {downloaded} bytes to {}", dest.display());
            return Ok(());
        }
        Err(NimbusError::Transfer {
            message: last_error,
        })
    }

    async fn fetch_platform(&mut self, dest_dir: &Path, tid: u32, events: &EventSink) -> Result<()> {
        let version_text = match &self.platform_version {
            Some(v) => v.clone(),
            None => {
                let latest: LatestPlatform = self.get_json("api/v/latest").await?;
                self.platform_version = Some(latest.version.clone());
                self.platform_size = latest.size;
                latest.version
            }
        };
        let version = PlatformVersion::parse(&version_text)?;

        let archive = dest_dir.join(format!("Nimbus_{version_text}.npkg"));
        self.download_archive(
            &format!("api/platform/{version_text}"),
            &archive,
            self.platform_size,
            tid,
            &version_text,
            events,
        )
        .await?;

        let unpacker = PlatformUnpacker::new(&archive, dest_dir, version);
        unpacker.unpack()?;
        unpacker.install()?;
        let _ = std::fs::remove_file(&archive);
        Ok(())
    }

    /// Pick the best available version for one service requirement.
    fn select_version(
        available: &[String],
        want: &PlatformVersion,
        want_min: &PlatformVersion,
    ) -> Option<PlatformVersion> {
        let mut best = PlatformVersion::ANY;
        let mut found = None;
        for text in available {
            let Ok(candidate) = PlatformVersion::parse(text) else {
                warn!("ignoring unparsable service version {text:?}");
                continue;
            };
            if PlatformVersion::is_newer_match(&candidate, &best, want, want_min) {
                best = candidate;
                found = Some(candidate);
            }
        }
        found
    }

    async fn fetch_service(
        &self,
        dest_dir: &Path,
        request: &ServiceRequest,
        tid: u32,
        events: &EventSink,
    ) -> Result<()> {
        let want = PlatformVersion::parse(request.version.as_deref().unwrap_or(""))?;
        let want_min = PlatformVersion::parse(request.min_version.as_deref().unwrap_or(""))?;

        let available: Vec<String> = self
            .get_json(&format!("api/services/{}", request.name))
            .await?;
        let chosen =
            Self::select_version(&available, &want, &want_min).ok_or_else(|| {
                NimbusError::Transfer {
                    message: format!("no version of {} satisfies requirements", request.name),
                }
            })?;

        let service_dir = dest_dir.join("services").join(&request.name);
        let archive = service_dir.join(format!("{}_{chosen}.npkg", request.name));
        self.download_archive(
            &format!("api/services/{}/{chosen}", request.name),
            &archive,
            0,
            tid,
            &request.name,
            events,
        )
        .await?;

        let unpacker = PlatformUnpacker::new(&archive, &service_dir, chosen);
        unpacker.unpack()?;
        unpacker.install()?;
        let _ = std::fs::remove_file(&archive);
        Ok(())
    }
}

#[async_trait(?Send)]
impl Fetcher for DistroFetcher {
    async fn get_platform_version_and_size(&mut self, _dest_dir: &Path, events: &EventSink) {
        let tid = self.alloc_tid();
        match self.get_json::<LatestPlatform>("api/v/latest").await {
            Ok(latest) => {
                self.platform_version = Some(latest.version.clone());
                self.platform_size = latest.size;
                let _ = events.send(FetchEvent::PlatformVersionAndSize {
                    tid,
                    version: latest.version,
                    size: latest.size,
                });
            }
            Err(e) => {
                let _ = events.send(FetchEvent::TransactionFailed {
                    tid,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn get_platform(&mut self, dest_dir: &Path, events: &EventSink) {
        let tid = self.alloc_tid();
        match self.fetch_platform(dest_dir, tid, events).await {
            Ok(()) => {
                let _ = events.send(FetchEvent::PlatformDownloaded { tid });
            }
            Err(e) => {
                let _ = events.send(FetchEvent::TransactionFailed {
                    tid,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn get_services(
        &mut self,
        dest_dir: &Path,
        services: &[ServiceRequest],
        events: &EventSink,
    ) {
        let tid = self.alloc_tid();
        for request in services {
            if let Err(e) = self.fetch_service(dest_dir, request, tid, events).await {
                let _ = events.send(FetchEvent::TransactionFailed {
                    tid,
                    message: e.to_string(),
                });
                return;
            }
        }
        let _ = events.send(FetchEvent::ServicesDownloaded { tid });
    }

    fn platform_version(&self) -> Option<String> {
        self.platform_version.clone()
    }

    fn platform_size(&self) -> u64 {
        self.platform_size
    }
}
