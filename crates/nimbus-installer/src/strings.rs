//! User-facing message text.
//!
//! Localization is out of scope for this installer; these constants keep the
//! message keys of the UI surface in one place so a localized string table
//! can replace them wholesale.

pub const INSTALLER_TITLE: &str = "Nimbus Installer";

pub const ALREADY_RUNNING: &str = "The Nimbus installer is already running.";

/// Prefix for any failure surfaced from the install procedure.
pub const ERROR_ENCOUNTERED: &str = "An error was encountered during installation: ";

pub const PLATFORM_DOWNLOADING: &str = "Downloading the Nimbus platform...";

pub const SERVICES_DOWNLOADING: &str = "Downloading services...";

/// Default text when a failed transaction supplies no message of its own.
pub const TRANSACTION_FAILED: &str = "transaction failed";

pub const UNABLE_TO_LAUNCH_UPDATER: &str = "unable to launch nimbus-updater";

pub fn package_not_found(path: &std::path::Path) -> String {
    format!("update package {} not found", path.display())
}
