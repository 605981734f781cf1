//! Installer skins: the pluggable UI collaborator.
//!
//! A skin presents progress/status/errors to the end user. Inbound requests
//! (begin, cancel, acknowledge completion) are enqueued on the run loop
//! rather than calling the orchestrator directly, so a skin callback can
//! never re-enter the state machine mid-dispatch.
//!
//! After `start_up` a skin must eventually request exactly one of
//! begin/cancel, and after observing `all_done` it must request shutdown.

use crate::runloop::{InstallerEvent, RunLoopSender};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Outbound UI surface driven by the orchestrator.
pub trait InstallerSkin {
    /// Invoked before installation begins; the skin presents whatever
    /// interface is required and then requests begin or cancel.
    fn start_up(&mut self, width: u32, height: u32, title: &str);

    /// A status message for the end user.
    fn status_message(&mut self, message: &str);

    /// An error message for the end user. Errors are terminal from the
    /// UI's point of view: further progress updates should not be
    /// presented (the orchestrator does not enforce this).
    fn error_message(&mut self, message: &str);

    /// A debug message for the end user (geeks only).
    fn debug_message(&mut self, message: &str);

    /// Progress between 0 and 100; 0 means not yet started, 100 finished.
    fn progress(&mut self, percent: u8);

    /// Installation is complete; the skin should eventually request
    /// shutdown.
    fn all_done(&mut self);

    /// Called right before the process ends.
    fn ended(&mut self) {}
}

/// No-op skin: begins immediately, acknowledges immediately.
pub struct SilentSkin {
    driver: RunLoopSender,
}

impl SilentSkin {
    pub fn new(driver: RunLoopSender) -> Self {
        Self { driver }
    }
}

impl InstallerSkin for SilentSkin {
    fn start_up(&mut self, _width: u32, _height: u32, _title: &str) {
        self.driver.send(InstallerEvent::BeginInstall);
    }

    fn status_message(&mut self, message: &str) {
        debug!("status: {message}");
    }

    fn error_message(&mut self, message: &str) {
        info!("error: {message}");
    }

    fn debug_message(&mut self, message: &str) {
        debug!("{message}");
    }

    fn progress(&mut self, _percent: u8) {}

    fn all_done(&mut self) {
        self.driver.send(InstallerEvent::Shutdown);
    }
}

/// Console skin printing percentage/status lines.
pub struct VerboseSkin {
    driver: RunLoopSender,
    last_percent: u8,
}

impl VerboseSkin {
    pub fn new(driver: RunLoopSender) -> Self {
        Self {
            driver,
            last_percent: 0,
        }
    }
}

impl InstallerSkin for VerboseSkin {
    fn start_up(&mut self, _width: u32, _height: u32, title: &str) {
        println!("{title}");
        self.driver.send(InstallerEvent::BeginInstall);
    }

    fn status_message(&mut self, message: &str) {
        println!("{message}");
    }

    fn error_message(&mut self, message: &str) {
        eprintln!("error: {message}");
    }

    fn debug_message(&mut self, message: &str) {
        debug!("{message}");
    }

    fn progress(&mut self, percent: u8) {
        if percent != self.last_percent {
            self.last_percent = percent;
            println!("{percent}%");
        }
    }

    fn all_done(&mut self) {
        println!("done");
        self.driver.send(InstallerEvent::Shutdown);
    }

    fn ended(&mut self) {
        println!("exiting");
    }
}

/// Installation state as seen by an embedding UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallState {
    Started,
    Installing,
    Complete,
    Error,
}

/// The small state document mirrored for an embedding UI:
/// `{state, progress, desc?, errorDetails?}`.
#[derive(Debug, Clone, Serialize)]
pub struct StateDocument {
    pub state: InstallState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(rename = "errorDetails", skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            state: InstallState::Started,
            progress: 0,
            desc: None,
            error_details: None,
        }
    }
}

impl StateDocument {
    /// Once in the error state the document stays there; status text no
    /// longer replaces the error description.
    pub fn set_status(&mut self, status: &str) {
        if self.state != InstallState::Error {
            self.desc = Some(status.to_string());
        }
    }

    pub fn set_progress(&mut self, progress: u8) {
        if self.state != InstallState::Error {
            self.state = if progress < 100 {
                InstallState::Installing
            } else {
                InstallState::Complete
            };
        }
        self.progress = progress;
    }

    pub fn set_error(&mut self, localized: &str, details: &str) {
        self.state = InstallState::Error;
        self.desc = Some(localized.to_string());
        self.error_details = Some(details.to_string());
    }
}

/// Skin that mirrors the installation into a JSON state document on disk,
/// for a rendered dialog or scripting environment to poll. Begins
/// immediately, like the silent skin.
pub struct StateDocSkin {
    driver: RunLoopSender,
    path: PathBuf,
    doc: StateDocument,
}

impl StateDocSkin {
    pub fn new(driver: RunLoopSender, path: PathBuf) -> Self {
        Self {
            driver,
            path,
            doc: StateDocument::default(),
        }
    }

    fn flush(&self) {
        if let Ok(json) = serde_json::to_string(&self.doc) {
            if let Err(e) = std::fs::write(&self.path, json) {
                debug!("unable to write state document: {e}");
            }
        }
    }
}

impl InstallerSkin for StateDocSkin {
    fn start_up(&mut self, _width: u32, _height: u32, _title: &str) {
        self.flush();
        self.driver.send(InstallerEvent::BeginInstall);
    }

    fn status_message(&mut self, message: &str) {
        self.doc.set_status(message);
        self.flush();
    }

    fn error_message(&mut self, message: &str) {
        self.doc.set_error(message, message);
        self.flush();
    }

    fn debug_message(&mut self, message: &str) {
        debug!("{message}");
    }

    fn progress(&mut self, percent: u8) {
        self.doc.set_progress(percent);
        self.flush();
    }

    fn all_done(&mut self) {
        self.driver.send(InstallerEvent::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runloop::RunLoop;

    #[test]
    fn test_state_document_lifecycle() {
        let mut doc = StateDocument::default();
        assert_eq!(doc.state, InstallState::Started);

        doc.set_status("downloading");
        doc.set_progress(40);
        assert_eq!(doc.state, InstallState::Installing);
        assert_eq!(doc.desc.as_deref(), Some("downloading"));

        doc.set_progress(100);
        assert_eq!(doc.state, InstallState::Complete);
    }

    #[test]
    fn test_error_state_is_terminal() {
        let mut doc = StateDocument::default();
        doc.set_error("failed", "copy failed: /tmp/x");
        doc.set_status("still going");
        doc.set_progress(80);

        assert_eq!(doc.state, InstallState::Error);
        assert_eq!(doc.desc.as_deref(), Some("failed"));
        assert_eq!(doc.error_details.as_deref(), Some("copy failed: /tmp/x"));
        // progress value itself still tracks
        assert_eq!(doc.progress, 80);
    }

    #[test]
    fn test_document_serializes_expected_keys() {
        let mut doc = StateDocument::default();
        doc.set_progress(10);
        doc.set_status("working");
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["state"], "installing");
        assert_eq!(json["progress"], 10);
        assert_eq!(json["desc"], "working");
        assert!(json.get("errorDetails").is_none());
    }

    #[test]
    fn test_silent_skin_begins_then_shuts_down() {
        let rl = RunLoop::new();
        let mut skin = SilentSkin::new(rl.sender());
        skin.start_up(400, 440, "t");
        skin.all_done();

        let mut seen = Vec::new();
        rl.run(|ev| seen.push(ev));
        assert_eq!(
            seen,
            vec![InstallerEvent::BeginInstall, InstallerEvent::Shutdown]
        );
    }

    #[test]
    fn test_statedoc_skin_writes_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        let rl = RunLoop::new();
        let mut skin = StateDocSkin::new(rl.sender(), path.clone());
        skin.start_up(400, 440, "t");
        skin.progress(55);

        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["state"], "installing");
        assert_eq!(json["progress"], 55);
    }
}
