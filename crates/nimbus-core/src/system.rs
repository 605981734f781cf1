//! Host identity for install telemetry.
//!
//! OS name/version strings and the locally generated install identifier.
//! Everything here is best-effort: telemetry must never block or fail an
//! install.

use crate::paths::ProductPaths;
use tracing::debug;

/// Human-readable OS name.
pub fn os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "Darwin",
        "windows" => "Windows",
        "linux" => "Linux",
        other => other,
    }
}

/// Best-effort OS version string; "unknown" when undeterminable.
pub fn os_version() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(text) = std::fs::read_to_string("/etc/os-release") {
            for line in text.lines() {
                if let Some(value) = line.strip_prefix("VERSION_ID=") {
                    return value.trim_matches('"').to_string();
                }
            }
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(output) = std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
        {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !version.is_empty() {
                return version;
            }
        }
    }
    "unknown".to_string()
}

/// Read the persistent install identifier, generating and storing a fresh
/// one on first use.
pub fn install_id(paths: &ProductPaths) -> String {
    let path = paths.install_id_path();
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return existing.to_string();
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    if let Err(e) = crate::fsx::write_string(&path, &id) {
        debug!("unable to persist install id: {e}");
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_id_is_stable() {
        let tmp = TempDir::new().unwrap();
        let paths = ProductPaths::new(tmp.path());
        let first = install_id(&paths);
        let second = install_id(&paths);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_os_identity_is_nonempty() {
        assert!(!os_name().is_empty());
        assert!(!os_version().is_empty());
    }
}
