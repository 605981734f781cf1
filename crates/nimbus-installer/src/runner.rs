//! Blocking driver for one fetch transaction.
//!
//! The orchestrator is single-threaded; each network phase is internally
//! asynchronous. `TransactionRunner::run` bridges the two by building a
//! private current-thread runtime for the duration of one call, acting as
//! the transaction's listener, and returning once the transaction delivers
//! its terminal event. Nested runner loops are strictly sequential: one per
//! phase, never in parallel, never recursive beyond this single level.

use crate::fetch::{EventSink, FetchCommand, FetchEvent, FetchListener, Fetcher};
use crate::strings;
use nimbus_core::ServiceRequest;
use std::path::Path;
use std::rc::Weak;
use tracing::debug;

/// Result of one blocking fetch call. `error` must be checked for non-empty
/// text before `version`/`size` are trusted.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub version: String,
    pub size: u64,
    pub error: String,
}

pub struct TransactionRunner;

impl TransactionRunner {
    /// Drive one fetch command to completion.
    ///
    /// Every progress event is forwarded to `observer` if it is still
    /// alive; a dead observer means forwarding is skipped, never an error.
    pub fn run(
        fetcher: &mut dyn Fetcher,
        command: FetchCommand,
        dest_dir: &Path,
        services: &[ServiceRequest],
        observer: Weak<dyn FetchListener>,
    ) -> FetchOutcome {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                return FetchOutcome {
                    error: format!("unable to create transaction runtime: {e}"),
                    ..FetchOutcome::default()
                }
            }
        };

        let mut error = String::new();
        runtime.block_on(async {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let operation = run_command(&mut *fetcher, command, dest_dir, services, tx);
            tokio::pin!(operation);
            let mut operation_done = false;

            loop {
                tokio::select! {
                    _ = &mut operation, if !operation_done => {
                        operation_done = true;
                    }
                    event = rx.recv() => {
                        match event {
                            Some(event) => {
                                let terminal = event.is_terminal();
                                forward(&observer, &event);
                                if let FetchEvent::TransactionFailed { message, .. } = event {
                                    error = if message.is_empty() {
                                        strings::TRANSACTION_FAILED.to_string()
                                    } else {
                                        message
                                    };
                                }
                                if terminal {
                                    break;
                                }
                            }
                            // The transaction ended without a terminal event;
                            // treat it like an unexplained failure.
                            None => {
                                error = strings::TRANSACTION_FAILED.to_string();
                                break;
                            }
                        }
                    }
                }
            }
        });
        drop(runtime);

        debug!("transaction {command:?} complete, error = {error:?}");
        FetchOutcome {
            version: fetcher.platform_version().unwrap_or_default(),
            size: fetcher.platform_size(),
            error,
        }
    }
}

async fn run_command(
    fetcher: &mut dyn Fetcher,
    command: FetchCommand,
    dest_dir: &Path,
    services: &[ServiceRequest],
    events: EventSink,
) {
    match command {
        FetchCommand::PlatformVersionAndSize => {
            fetcher.get_platform_version_and_size(dest_dir, &events).await;
        }
        FetchCommand::DownloadPlatform => {
            fetcher.get_platform(dest_dir, &events).await;
        }
        FetchCommand::DownloadServices => {
            fetcher.get_services(dest_dir, services, &events).await;
        }
    }
}

fn forward(observer: &Weak<dyn FetchListener>, event: &FetchEvent) {
    // Best-effort: a released observer silently drops the event.
    let Some(listener) = observer.upgrade() else {
        return;
    };
    match event {
        FetchEvent::DownloadProgress { tid, item, percent } => {
            listener.on_download_progress(*tid, item, *percent);
        }
        FetchEvent::PlatformVersionAndSize { tid, version, size } => {
            listener.on_platform_version_and_size(*tid, version, *size);
        }
        FetchEvent::PlatformDownloaded { tid } => listener.on_platform_downloaded(*tid),
        FetchEvent::ServicesDownloaded { tid } => listener.on_services_downloaded(*tid),
        FetchEvent::TransactionFailed { tid, message } => {
            listener.on_transaction_failed(*tid, message);
        }
    }
}
