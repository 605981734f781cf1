//! On-disk platform cleanup.
//!
//! Decides whether an installed platform version is safe to delete and, if
//! so, removes its directory tree and registered plugin artifacts. This is a
//! documented best-effort cleanup: deletion failures are logged, never
//! escalated.

use crate::fsx;
use crate::lock::ProcessLock;
use crate::paths::ProductPaths;
use crate::version::PlatformVersion;
use tracing::debug;

/// Remove one platform version from disk.
///
/// Unless `force` is set, three independent conditions each veto the
/// removal silently: the version's installed marker exists, its installing
/// marker exists, or its running lock is held by another process (probed
/// with a non-blocking acquire).
pub fn remove_platform(paths: &ProductPaths, version: &PlatformVersion, force: bool) {
    debug!("remove_platform({version}, force={force})");

    let mut probe: Option<ProcessLock> = None;
    if !force {
        if paths.installed_marker(version).exists() {
            debug!("{version} installed, ignored");
            return;
        }
        if paths.installing_marker(version).exists() {
            debug!("{version} installing, ignored");
            return;
        }
        // A running platform holds its lock; failing to take it means the
        // version is live.
        match ProcessLock::acquire(&paths.platform_lock_name(version), false) {
            Some(lock) => probe = Some(lock),
            None => {
                debug!("{version} running, ignored");
                return;
            }
        }
    }

    debug!("{version} being removed");
    fsx::remove_best_effort(&paths.platform_dir(version));
    for artifact in paths.plugin_paths(version) {
        fsx::remove_best_effort(&artifact);
    }

    if let Some(lock) = probe.take() {
        lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsx::write_string;
    use tempfile::TempDir;

    fn seeded(tmp: &TempDir, version: &PlatformVersion) -> ProductPaths {
        let paths = ProductPaths::new(tmp.path());
        std::fs::create_dir_all(paths.platform_dir(version)).unwrap();
        write_string(&paths.platform_dir(version).join("daemon"), "bits").unwrap();
        paths
    }

    #[test]
    fn test_installed_marker_vetoes_removal() {
        let tmp = TempDir::new().unwrap();
        let v = PlatformVersion::parse("1.2.3").unwrap();
        let paths = seeded(&tmp, &v);
        write_string(&paths.installed_marker(&v), "1700000000").unwrap();

        remove_platform(&paths, &v, false);
        assert!(paths.platform_dir(&v).exists());
    }

    #[test]
    fn test_installing_marker_vetoes_removal() {
        let tmp = TempDir::new().unwrap();
        let v = PlatformVersion::parse("1.2.4").unwrap();
        let paths = seeded(&tmp, &v);
        write_string(&paths.installing_marker(&v), "1700000000").unwrap();

        remove_platform(&paths, &v, false);
        assert!(paths.platform_dir(&v).exists());
    }

    #[test]
    fn test_running_lock_vetoes_removal() {
        let tmp = TempDir::new().unwrap();
        let v = PlatformVersion::parse("1.2.5").unwrap();
        let paths = seeded(&tmp, &v);
        let held = ProcessLock::acquire(&paths.platform_lock_name(&v), false).unwrap();

        remove_platform(&paths, &v, false);
        assert!(paths.platform_dir(&v).exists());
        drop(held);
    }

    #[test]
    fn test_unmarked_version_is_removed() {
        let tmp = TempDir::new().unwrap();
        let v = PlatformVersion::parse("1.2.6").unwrap();
        let paths = seeded(&tmp, &v);

        remove_platform(&paths, &v, false);
        assert!(!paths.platform_dir(&v).exists());
    }

    #[test]
    fn test_force_overrides_markers() {
        let tmp = TempDir::new().unwrap();
        let v = PlatformVersion::parse("1.2.7").unwrap();
        let paths = seeded(&tmp, &v);
        write_string(&paths.installed_marker(&v), "1700000000").unwrap();
        write_string(&paths.installing_marker(&v), "1700000000").unwrap();

        remove_platform(&paths, &v, true);
        assert!(!paths.platform_dir(&v).exists());
    }
}
