//! The read-only installer configuration document.
//!
//! `installer.config` ships next to the installer executable. Servers are
//! required; everything else is optional. Permission blobs are arbitrary
//! JSON carried through verbatim and re-serialized to disk late in the
//! install.

use crate::pkg;
use crate::version::PlatformVersion;
use crate::{NimbusError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

/// A requirement to acquire one named add-on service. Immutable once read
/// from configuration; empty version fields mean "no constraint".
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServiceRequest {
    #[serde(rename = "service")]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(rename = "minversion", default)]
    pub min_version: Option<String>,
}

/// Installer window geometry and title, each optional; defaults are
/// supplied by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    distro_servers: Option<Vec<String>>,
    package: Option<String>,
    #[serde(default)]
    services: Vec<ServiceRequest>,
    permissions: Option<serde_json::Value>,
    auto_update_permissions: Option<serde_json::Value>,
    window: Option<WindowConfig>,
}

/// Parsed installer configuration.
#[derive(Debug)]
pub struct InstallerConfig {
    pub distro_servers: Vec<String>,
    /// Local update package and the version embedded in its file name.
    pub package: Option<PathBuf>,
    pub package_version: Option<PlatformVersion>,
    pub services: Vec<ServiceRequest>,
    pub permissions: Option<serde_json::Value>,
    pub auto_update_permissions: Option<serde_json::Value>,
    pub window: WindowConfig,
}

impl InstallerConfig {
    /// Load and validate the configuration document.
    ///
    /// A missing or malformed document, or a missing/empty `distroServers`
    /// list, is fatal. A `package` whose file name does not carry a
    /// parsable version is dropped with a logged error, not fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| NimbusError::environment(format!("unable to read {}", path.display())))?;
        Self::from_json(&text)
    }

    /// Parse the configuration from its JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(text).map_err(|e| NimbusError::Config {
            message: format!("bad config file format: {e}"),
        })?;

        let distro_servers = match raw.distro_servers {
            Some(servers) if !servers.is_empty() => servers,
            _ => {
                return Err(NimbusError::Config {
                    message: "bad config file format: distroServers missing or empty".into(),
                })
            }
        };

        let mut package = None;
        let mut package_version = None;
        if let Some(name) = raw.package {
            let candidate = PathBuf::from(&name);
            match pkg::version_from_package(&candidate) {
                Some(version) => {
                    package = Some(candidate);
                    package_version = Some(version);
                }
                None => {
                    error!("package {name:?} not of form Nimbus_x.x.x.npkg, dropped");
                }
            }
        }

        Ok(Self {
            distro_servers,
            package,
            package_version,
            services: raw.services,
            permissions: raw.permissions,
            auto_update_permissions: raw.auto_update_permissions,
            window: raw.window.unwrap_or_default(),
        })
    }
}
