//! The privileged install-process collaborator.
//!
//! The orchestrator prepares a platform directory and hands execution to an
//! external `nimbus-updater` process which performs the actual placement
//! into protected locations. The child reports status/progress/error/done
//! as line-delimited JSON on its stdout; this runner forwards each message
//! to the registered listener.

use nimbus_core::{paths, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::strings;

/// Listener interface for install-process events.
pub trait InstallerEvents {
    fn on_status(&mut self, message: &str);
    fn on_error(&mut self, message: &str);
    fn on_progress(&mut self, percent: u8);
    fn on_done(&mut self);
}

/// One message on the updater's stdout protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UpdaterMessage {
    Status { message: String },
    Progress { percent: u8 },
    Error { message: String },
    Done,
}

/// Seam for launching the privileged installer, so the orchestrator can be
/// exercised without spawning a real child process.
pub trait InstallProcess {
    /// Run the privileged installer against a prepared platform directory,
    /// blocking until it finishes. Returns `Ok` even when the child
    /// reported errors; only the inability to drive the child at all is an
    /// `Err`.
    fn run(&mut self, platform_dir: &Path, listener: &mut dyn InstallerEvents) -> Result<()>;
}

/// Spawns `nimbus-updater` from the platform directory and pumps its stdout.
#[derive(Default)]
pub struct InstallProcessRunner;

impl InstallProcess for InstallProcessRunner {
    fn run(&mut self, platform_dir: &Path, listener: &mut dyn InstallerEvents) -> Result<()> {
        let exe = platform_dir.join(paths::updater_exe_name());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(async {
            let mut child = match tokio::process::Command::new(&exe)
                .arg(platform_dir)
                .current_dir(platform_dir)
                .stdout(Stdio::piped())
                .spawn()
            {
                Ok(child) => child,
                Err(e) => {
                    warn!("failed to spawn {}: {e}", exe.display());
                    listener.on_error(strings::UNABLE_TO_LAUNCH_UPDATER);
                    return;
                }
            };

            if let Some(stdout) = child.stdout.take() {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => dispatch(&line, listener),
                        Ok(None) => break,
                        Err(e) => {
                            warn!("updater pipe error: {e}");
                            break;
                        }
                    }
                }
            }

            match child.wait().await {
                Ok(status) => debug!("updater exits with status {status}"),
                Err(e) => warn!("waiting for updater failed: {e}"),
            }
        });
        Ok(())
    }
}

fn dispatch(line: &str, listener: &mut dyn InstallerEvents) {
    match serde_json::from_str::<UpdaterMessage>(line) {
        Ok(UpdaterMessage::Status { message }) => listener.on_status(&message),
        Ok(UpdaterMessage::Progress { percent }) => listener.on_progress(percent),
        Ok(UpdaterMessage::Error { message }) => listener.on_error(&message),
        Ok(UpdaterMessage::Done) => listener.on_done(),
        Err(e) => warn!("unrecognized updater message {line:?} ignored: {e}"),
    }
}
