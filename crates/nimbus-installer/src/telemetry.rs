//! Fresh-install reporting.
//!
//! On a successful fresh install the orchestrator reports the platform
//! version, OS identity, and the locally generated install id to the first
//! distribution server. The report is best-effort end to end: failure to
//! send, or a rejected transaction, is logged and never fails the install.

use tracing::{debug, warn};
use url::Url;

/// Seam for the reporting collaborator.
pub trait InstallReporter {
    fn report_install(&self, servers: &[String], os_version: &str, platform_version: &str, id: &str);
}

/// HTTP reporter posting the usage query to the distribution server.
#[derive(Default)]
pub struct HttpReporter;

impl HttpReporter {
    fn build_url(server: &str, os_version: &str, platform_version: &str, id: &str) -> Option<Url> {
        let base = format!("{}/usage", server.trim_end_matches('/'));
        let mut url = Url::parse(&base).ok()?;
        url.query_pairs_mut()
            .append_pair("t", "id")
            .append_pair("os", os_version)
            .append_pair("nv", platform_version)
            .append_pair("id", id);
        Some(url)
    }
}

impl InstallReporter for HttpReporter {
    fn report_install(
        &self,
        servers: &[String],
        os_version: &str,
        platform_version: &str,
        id: &str,
    ) {
        let Some(server) = servers.first() else {
            return;
        };
        let Some(url) = Self::build_url(server, os_version, platform_version, id) else {
            warn!("cannot build install report url from {server:?}");
            return;
        };

        debug!("reporting new install: {url}");
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!("install report skipped: {e}");
                return;
            }
        };
        runtime.block_on(async {
            match reqwest::get(url.as_str()).await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("install report accepted");
                }
                Ok(resp) => warn!("install report rejected: HTTP {}", resp.status()),
                Err(e) => warn!("install report failed: {e}"),
            }
        });
    }
}
