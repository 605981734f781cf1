//! Product directory layout.
//!
//! All on-disk locations for installed platform versions, their state
//! markers, plugin artifacts, and the installer's temporary working
//! directory derive from one root so tests can point the whole layout at a
//! scratch directory.

use crate::version::PlatformVersion;
use crate::{NimbusError, Result};
use std::path::PathBuf;

/// Name of the single-instance installer lock.
pub const INSTALLER_LOCK_NAME: &str = "NimbusInstaller";

/// File name of the uninstaller artifact shipped next to the installer.
pub const UNINSTALLER_NAME: &str = "nimbus-uninstall";

/// File name of the privileged install-process executable inside a prepared
/// platform directory.
pub fn updater_exe_name() -> &'static str {
    if cfg!(windows) {
        "nimbus-updater.exe"
    } else {
        "nimbus-updater"
    }
}

/// Resolver for every path under the per-user product root.
#[derive(Debug, Clone)]
pub struct ProductPaths {
    root: PathBuf,
}

impl ProductPaths {
    /// Layout rooted at an explicit directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at the per-user data directory.
    pub fn system() -> Result<Self> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| NimbusError::environment("no per-user data directory available"))?;
        Ok(Self::new(base.join("Nimbus")))
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Directory holding one subdirectory per installed platform version.
    pub fn platform_top_dir(&self) -> PathBuf {
        self.root.join("platform")
    }

    /// Install directory for one platform version.
    pub fn platform_dir(&self, version: &PlatformVersion) -> PathBuf {
        self.platform_top_dir().join(version.to_string())
    }

    /// Marker written when a version's installation completed.
    pub fn installed_marker(&self, version: &PlatformVersion) -> PathBuf {
        self.root.join("state").join(format!("{version}.installed"))
    }

    /// Marker held while a version's installation is in flight. Keeps
    /// cleanup away from a half-written tree.
    pub fn installing_marker(&self, version: &PlatformVersion) -> PathBuf {
        self.root
            .join("state")
            .join(format!("{version}.installing"))
    }

    /// Registered plugin artifact paths for one version, all removed
    /// together with the version.
    pub fn plugin_paths(&self, version: &PlatformVersion) -> Vec<PathBuf> {
        vec![
            self.root.join("plugins").join(format!("nimbus-{version}")),
            self.root.join("shims").join(format!("nimbus-{version}")),
        ]
    }

    /// Name of the advisory lock a running platform instance holds.
    pub fn platform_lock_name(&self, version: &PlatformVersion) -> String {
        format!("Nimbus-{version}")
    }

    /// Location of the locally generated install identifier.
    pub fn install_id_path(&self) -> PathBuf {
        self.root.join("InstallID")
    }
}

/// The installer's temporary working directory. Recreated per run; always
/// deleted during exit cleanup.
pub fn working_dir() -> PathBuf {
    std::env::temp_dir().join("NimbusInstaller")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_version_scoped() {
        let paths = ProductPaths::new("/opt/nimbus");
        let v = PlatformVersion::parse("2.9.11").unwrap();
        assert_eq!(
            paths.platform_dir(&v),
            PathBuf::from("/opt/nimbus/platform/2.9.11")
        );
        assert_eq!(
            paths.installed_marker(&v),
            PathBuf::from("/opt/nimbus/state/2.9.11.installed")
        );
        assert_eq!(paths.platform_lock_name(&v), "Nimbus-2.9.11");
        assert_eq!(paths.plugin_paths(&v).len(), 2);
    }
}
