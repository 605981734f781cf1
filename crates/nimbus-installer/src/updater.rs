//! The privileged install step.
//!
//! `nimbus-updater` runs out of a fully prepared platform directory and
//! performs the actual placement into the per-user product area: marker
//! discipline, payload copy, registration. It talks to its parent over the
//! stdout protocol of [`crate::process::UpdaterMessage`].

use crate::process::UpdaterMessage;
use nimbus_core::{cleanup, fsx, system, NimbusError, PlatformVersion, ProductPaths, Result};
use std::cmp::Ordering;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

fn emit(message: &UpdaterMessage) {
    if let Ok(line) = serde_json::to_string(message) {
        println!("{line}");
    }
}

fn emit_status(text: &str) {
    emit(&UpdaterMessage::Status {
        message: text.to_string(),
    });
}

fn emit_progress(percent: u8) {
    emit(&UpdaterMessage::Progress { percent });
}

fn emit_error(text: &str) {
    emit(&UpdaterMessage::Error {
        message: text.to_string(),
    });
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default()
}

/// Versions of the platform currently registered as installed.
fn installed_versions(paths: &ProductPaths) -> Vec<PlatformVersion> {
    let mut versions = Vec::new();
    let Ok(entries) = std::fs::read_dir(paths.platform_top_dir()) else {
        return versions;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(version) = PlatformVersion::parse(name) else {
            continue;
        };
        if paths.installed_marker(&version).exists() {
            versions.push(version);
        }
    }
    versions
}

/// Run the privileged install out of `platform_dir`.
///
/// Mirrors the protocol the orchestrator expects: progress/status along the
/// way, an error message on failure, and a final done message once the
/// installing marker has been cleared, even after an error, so the parent
/// can advance past the handoff.
pub fn run_update(platform_dir: &Path, paths: &ProductPaths) -> Result<()> {
    let leaf = platform_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            NimbusError::environment(format!(
                "bad platform directory {}",
                platform_dir.display()
            ))
        })?;
    let version = PlatformVersion::parse(leaf)?;

    info!(
        "begin install of version {version} onto {} {}",
        system::os_name(),
        system::os_version()
    );
    emit_progress(0);
    emit_status("Starting installation");

    let installing = paths.installing_marker(&version);
    let result = install(platform_dir, paths, &version, &installing);
    if let Err(e) = &result {
        warn!("install failed: {e}");
        emit_error(&e.to_string());
    }

    // The installing marker never outlives this process.
    fsx::remove_best_effort(&installing);
    emit_progress(100);
    emit(&UpdaterMessage::Done);
    result
}

fn install(
    platform_dir: &Path,
    paths: &ProductPaths,
    version: &PlatformVersion,
    installing: &Path,
) -> Result<()> {
    // Never downgrade below a newer installed version of the same major rev.
    for installed in installed_versions(paths) {
        if installed.major() != version.major() {
            continue;
        }
        if installed.compare(version) == Ordering::Greater {
            return Err(NimbusError::InstallProcess {
                message: format!("a newer version ({installed}) is already installed"),
            });
        }
    }
    emit_progress(5);

    // Keeps cleanup away from us while the copy is in flight.
    fsx::write_string(installing, &unix_timestamp())?;
    emit_progress(10);

    emit_status("Copying platform");
    let product_dir = paths.platform_dir(version);
    fsx::remove_best_effort(&product_dir);
    fsx::copy_dir_all(platform_dir, &product_dir)?;
    emit_progress(70);

    emit_status("Registering version");
    fsx::write_string(&paths.installed_marker(version), &unix_timestamp())?;
    emit_progress(90);

    // Sweep stale platform directories (failed or abandoned installs).
    // Installed, installing, and running versions veto their own removal.
    if let Ok(entries) = std::fs::read_dir(paths.platform_top_dir()) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(found) = PlatformVersion::parse(name) else {
                continue;
            };
            if found != *version {
                cleanup::remove_platform(paths, &found, false);
            }
        }
    }
    emit_progress(95);

    info!("version {version} installed to {}", product_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged_platform(tmp: &TempDir, version: &str) -> std::path::PathBuf {
        let dir = tmp.path().join("work").join(version);
        std::fs::create_dir_all(dir.join("daemon")).unwrap();
        std::fs::write(dir.join("daemon/nimbusd"), "bits").unwrap();
        dir
    }

    #[test]
    fn test_update_places_payload_and_markers() {
        let tmp = TempDir::new().unwrap();
        let paths = ProductPaths::new(tmp.path().join("root"));
        let platform_dir = staged_platform(&tmp, "1.4.0");

        run_update(&platform_dir, &paths).unwrap();

        let v = PlatformVersion::parse("1.4.0").unwrap();
        assert!(paths.platform_dir(&v).join("daemon/nimbusd").exists());
        assert!(paths.installed_marker(&v).exists());
        assert!(!paths.installing_marker(&v).exists());
    }

    #[test]
    fn test_update_refuses_downgrade_within_major() {
        let tmp = TempDir::new().unwrap();
        let paths = ProductPaths::new(tmp.path().join("root"));

        // register a newer 1.x as installed
        let newer = PlatformVersion::parse("1.9.0").unwrap();
        std::fs::create_dir_all(paths.platform_dir(&newer)).unwrap();
        fsx::write_string(&paths.installed_marker(&newer), "0").unwrap();

        let platform_dir = staged_platform(&tmp, "1.4.0");
        let result = run_update(&platform_dir, &paths);
        assert!(result.is_err());

        let v = PlatformVersion::parse("1.4.0").unwrap();
        assert!(!paths.installed_marker(&v).exists());
    }

    #[test]
    fn test_update_allows_other_major() {
        let tmp = TempDir::new().unwrap();
        let paths = ProductPaths::new(tmp.path().join("root"));

        let newer = PlatformVersion::parse("2.0.0").unwrap();
        std::fs::create_dir_all(paths.platform_dir(&newer)).unwrap();
        fsx::write_string(&paths.installed_marker(&newer), "0").unwrap();

        let platform_dir = staged_platform(&tmp, "1.4.0");
        run_update(&platform_dir, &paths).unwrap();
    }

    #[test]
    fn test_update_rejects_unversioned_directory() {
        let tmp = TempDir::new().unwrap();
        let paths = ProductPaths::new(tmp.path().join("root"));
        let dir = tmp.path().join("work").join("snapshot");
        std::fs::create_dir_all(&dir).unwrap();

        assert!(run_update(&dir, &paths).is_err());
    }
}
