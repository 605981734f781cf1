//! The installation orchestrator.
//!
//! Top-level state machine sequencing version discovery, platform download
//! or local-package unpack, service downloads, permission seeding,
//! uninstaller staging, and the handoff to the privileged install process,
//! while translating multi-phase progress into a single monotonic 0-100
//! percentage for the skin.
//!
//! Every phase returns a `Result`; `begin_install` is the single
//! aggregation point that maps any failure to one skin error call. No
//! partial rollback is attempted: a failed run leaves already-written
//! files in place except the working directory, which exit cleanup always
//! removes.

use crate::fetch::{FetchCommand, FetchListener, Fetcher};
use crate::process::{InstallProcess, InstallerEvents};
use crate::runloop::RunLoopSender;
use crate::runner::{FetchOutcome, TransactionRunner};
use crate::skin::InstallerSkin;
use crate::strings;
use crate::telemetry::InstallReporter;
use nimbus_core::{fsx, paths, system, NimbusError, PlatformUnpacker, PlatformVersion, ProcessLock, ProductPaths, Result, ServiceRequest};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_WINDOW_WIDTH: u32 = 400;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 440;

// Progress bucketing: 0-5% startup, 5-41% attaining the platform,
// 41-66% services, 66-69% seeding, 69-100% privileged installation.
// The band boundaries are fixed design constants.
fn scale_platform_download(raw: u8) -> u8 {
    (u32::from(raw) * 37 / 100 + 3) as u8
}

fn scale_service_download(raw: u8) -> u8 {
    (u32::from(raw) * 23 / 100 + 42) as u8
}

fn scale_install(raw: u8) -> u8 {
    (u32::from(raw) * 30 / 100 + 70) as u8
}

/// Installation state machine. Transitions are one-directional; nothing
/// leaves `AllDone` or `Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Just started up.
    Started,
    /// Waiting for the skin to let us begin (user confirm).
    WaitingToBegin,
    /// Actively installing bits.
    Installing,
    /// Waiting for the skin to acknowledge completion.
    WaitingToEnd,
    /// All done.
    AllDone,
    /// We got canceled.
    Canceled,
}

type SharedSkin = Rc<RefCell<dyn InstallerSkin>>;

/// Everything the orchestrator is constructed from.
pub struct OrchestratorSetup {
    pub exe_dir: PathBuf,
    /// Temporary working directory; always removed during exit cleanup.
    pub dest_dir: PathBuf,
    /// Local update package, when installing without a network fetch.
    pub update_pkg: Option<PathBuf>,
    pub platform_version: Option<PlatformVersion>,
    pub servers: Vec<String>,
    pub services: Vec<ServiceRequest>,
    pub permissions: Option<serde_json::Value>,
    pub auto_update_permissions: Option<serde_json::Value>,
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub product_paths: ProductPaths,
    /// Single-instance lock name; overridable so tests do not contend.
    pub lock_name: String,
}

pub struct InstallOrchestrator {
    setup: OrchestratorSetup,
    skin: Option<SharedSkin>,
    driver: RunLoopSender,
    fetcher: Box<dyn Fetcher>,
    process: Box<dyn InstallProcess>,
    reporter: Box<dyn InstallReporter>,
    installer_lock: Option<ProcessLock>,
    platform_size: u64,
    state: OrchestratorState,
    exit_status: Option<i32>,
}

impl InstallOrchestrator {
    pub fn new(
        setup: OrchestratorSetup,
        skin: Option<SharedSkin>,
        driver: RunLoopSender,
        fetcher: Box<dyn Fetcher>,
        process: Box<dyn InstallProcess>,
        reporter: Box<dyn InstallReporter>,
    ) -> Self {
        Self {
            setup,
            skin,
            driver,
            fetcher,
            process,
            reporter,
            installer_lock: None,
            platform_size: 0,
            state: OrchestratorState::Started,
            exit_status: None,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Exit status recorded by exit cleanup; `None` when the run ended
    /// without reaching an exit path (lock refused, or an error the skin
    /// did not act on).
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Start the orchestrator: verify single-instance, resolve a local
    /// package, then wait for the skin's go-ahead.
    pub fn run(&mut self) {
        self.installer_lock = ProcessLock::acquire(&self.setup.lock_name, false);
        if self.installer_lock.is_none() {
            self.ui_error(strings::ALREADY_RUNNING);
            return;
        }

        // A configured local package must exist, either as given or
        // relative to the executable directory, before installation may
        // begin.
        if let Some(pkg) = self.setup.update_pkg.clone() {
            if !pkg.exists() {
                let resolved = self.setup.exe_dir.join(&pkg);
                if resolved.exists() {
                    self.setup.update_pkg = Some(resolved);
                } else {
                    self.ui_error(&strings::package_not_found(&pkg));
                    return;
                }
            }
        }

        self.state = OrchestratorState::WaitingToBegin;
        info!("orchestrator ready, waiting to begin");
        match self.skin.clone() {
            Some(skin) => {
                skin.borrow_mut()
                    .start_up(self.setup.width, self.setup.height, &self.setup.title);
            }
            None => self.begin_install(),
        }
    }

    /// Invoked by the skin to continue installation after `start_up`.
    pub fn begin_install(&mut self) {
        if self.state != OrchestratorState::WaitingToBegin {
            debug!("begin_install ignored in state {:?}", self.state);
            return;
        }
        self.state = OrchestratorState::Installing;
        match self.do_install() {
            Ok(true) => {
                self.state = OrchestratorState::WaitingToEnd;
                match self.skin.clone() {
                    Some(skin) => skin.borrow_mut().all_done(),
                    None => self.shutdown(),
                }
            }
            Ok(false) => {
                // The privileged installer went away without completing.
                // Any error it reported has already reached the skin.
                warn!("install process ended without completion");
            }
            Err(e) => {
                error!("install failed: {e}");
                self.ui_error(&format!("{}{e}", strings::ERROR_ENCOUNTERED));
            }
        }
    }

    /// Invoked by the skin to cancel; valid from any pre-completion state.
    pub fn cancel_installation(&mut self) {
        if matches!(
            self.state,
            OrchestratorState::AllDone | OrchestratorState::Canceled
        ) {
            return;
        }
        self.state = OrchestratorState::Canceled;
        self.do_exit(0);
    }

    /// Invoked by the skin after it observed `all_done`.
    pub fn shutdown(&mut self) {
        if self.state == OrchestratorState::WaitingToEnd {
            self.state = OrchestratorState::AllDone;
            self.do_exit(0);
        }
    }

    /// The body of the installation; each phase either advances the
    /// progress contract or returns the error that aborts the remainder.
    /// Returns whether the privileged installer reported completion.
    fn do_install(&mut self) -> Result<bool> {
        self.ui_progress(1);
        self.ui_status(strings::PLATFORM_DOWNLOADING);

        let dest_dir = self.setup.dest_dir.clone();
        let platform_dir = if let Some(pkg) = self.setup.update_pkg.clone() {
            self.install_local_package(&pkg, &dest_dir)?
        } else {
            self.fetch_platform(&dest_dir)?
        };

        self.ui_progress(41);

        if !self.setup.services.is_empty() {
            self.ui_status(strings::SERVICES_DOWNLOADING);
            self.run_transaction(
                FetchCommand::DownloadServices,
                &platform_dir,
                ProgressBand::Services,
            )?;
        }

        self.ui_progress(66);

        self.seed_permissions(&platform_dir)?;
        self.ui_progress(67);

        self.stage_uninstaller(&platform_dir)?;
        self.ui_progress(69);

        // The working directory's leaf is the version the just-installed
        // platform is named after; an unparseable name is fatal.
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
        let product_dir = self.setup.product_paths.platform_dir(&version);
        std::fs::create_dir_all(&product_dir).map_err(|_| {
            NimbusError::environment(format!("unable to create {}", product_dir.display()))
        })?;

        // platform_dir is all set up, install from it.
        let mut listener = InstallPhaseListener {
            skin: self.skin.clone(),
            done: false,
        };
        self.process.run(&platform_dir, &mut listener)?;
        Ok(listener.done)
    }

    /// Network path: discover the latest version, then download and unpack.
    fn fetch_platform(&mut self, dest_dir: &Path) -> Result<PathBuf> {
        self.ui_debug(&format!("fetch to {}", dest_dir.display()));
        std::fs::create_dir_all(dest_dir).map_err(|_| {
            NimbusError::environment(format!("unable to create {}", dest_dir.display()))
        })?;

        let outcome = self.run_transaction(
            FetchCommand::PlatformVersionAndSize,
            dest_dir,
            ProgressBand::Platform,
        )?;
        let version = PlatformVersion::parse(&outcome.version)?;
        self.setup.platform_version = Some(version);
        self.platform_size = outcome.size;
        info!("latest platform is {version} ({} bytes)", self.platform_size);

        self.ui_progress(2);

        self.run_transaction(
            FetchCommand::DownloadPlatform,
            dest_dir,
            ProgressBand::Platform,
        )?;
        Ok(dest_dir.join(version.to_string()))
    }

    /// Local path: copy the supplied package into the working directory,
    /// unpack it, and run its embedded install step.
    fn install_local_package(&mut self, pkg: &Path, dest_dir: &Path) -> Result<PathBuf> {
        self.ui_progress(5);

        let version = self
            .setup
            .platform_version
            .ok_or_else(|| NimbusError::environment("update package version unknown"))?;
        let platform_dir = dest_dir.join(version.to_string());

        std::fs::create_dir_all(dest_dir).map_err(|_| {
            NimbusError::environment(format!("unable to create {}", dest_dir.display()))
        })?;

        let file_name = pkg.file_name().ok_or_else(|| {
            NimbusError::environment(format!("bad package path {}", pkg.display()))
        })?;
        let dest_pkg = dest_dir.join(file_name);
        self.ui_debug(&format!("installing from {}", dest_pkg.display()));
        fsx::remove_best_effort(&dest_pkg);
        fsx::copy_file(pkg, &dest_pkg).map_err(|_| {
            NimbusError::Other(format!(
                "unable to copy {} -> {}",
                pkg.display(),
                dest_pkg.display()
            ))
        })?;
        self.ui_progress(15);

        let unpacker = PlatformUnpacker::new(&dest_pkg, dest_dir, version);
        unpacker.unpack()?;
        self.ui_progress(25);
        unpacker.install()?;
        fsx::remove_best_effort(&dest_pkg);
        self.ui_progress(35);
        Ok(platform_dir)
    }

    /// Write pre-seeded permission documents where the privileged
    /// installer will find them.
    fn seed_permissions(&mut self, platform_dir: &Path) -> Result<()> {
        let pairs = [
            (self.setup.permissions.clone(), "configDomainPermissions"),
            (
                self.setup.auto_update_permissions.clone(),
                "configAutoUpdatePermissions",
            ),
        ];
        for (blob, name) in pairs {
            let Some(blob) = blob else { continue };
            let path = platform_dir.join("permissions").join(name);
            let text = serde_json::to_string_pretty(&blob)?;
            fsx::write_string(&path, &text)
                .map_err(|_| NimbusError::Other(format!("unable to write {}", path.display())))?;
        }
        Ok(())
    }

    /// Copy the uninstaller next to the platform if it shipped with us.
    fn stage_uninstaller(&mut self, platform_dir: &Path) -> Result<()> {
        let src = self.setup.exe_dir.join(paths::UNINSTALLER_NAME);
        if !src.exists() {
            return Ok(());
        }
        let dst = platform_dir.join(paths::UNINSTALLER_NAME);
        fsx::copy_file(&src, &dst).map_err(|_| {
            NimbusError::Other(format!(
                "unable to copy {} -> {}",
                src.display(),
                dst.display()
            ))
        })
    }

    /// Drive one fetch command through the blocking runner, translating a
    /// non-empty error slot into a transfer error.
    fn run_transaction(
        &mut self,
        command: FetchCommand,
        dest_dir: &Path,
        band: ProgressBand,
    ) -> Result<FetchOutcome> {
        let relay: Rc<dyn FetchListener> = Rc::new(ProgressRelay {
            skin: self.skin.clone(),
            band,
        });
        let outcome = TransactionRunner::run(
            self.fetcher.as_mut(),
            command,
            dest_dir,
            &self.setup.services,
            Rc::downgrade(&relay),
        );
        if !outcome.error.is_empty() {
            return Err(NimbusError::Transfer {
                message: outcome.error,
            });
        }
        Ok(outcome)
    }

    /// Exit cleanup shared by completion and cancellation.
    fn do_exit(&mut self, status: i32) {
        debug!("exit with status {status}");
        self.driver.stop();
        fsx::remove_best_effort(&self.setup.dest_dir);
        if let Some(skin) = self.skin.clone() {
            skin.borrow_mut().ended();
        }
        self.detach_install_media();

        // Fresh successful installs report identity telemetry, best-effort.
        if self.state == OrchestratorState::AllDone && self.setup.update_pkg.is_none() {
            if let Some(version) = &self.setup.platform_version {
                let os = format!("{} {}", system::os_name(), system::os_version());
                let id = system::install_id(&self.setup.product_paths);
                self.reporter.report_install(
                    &self.setup.servers,
                    &os,
                    &version.to_string(),
                    &id,
                );
            }
        }

        self.installer_lock = None;
        self.exit_status = Some(status);
    }

    #[cfg(target_os = "macos")]
    fn detach_install_media(&self) {
        // The installer may be running from a mounted disk image; detach it
        // so the volume does not linger after we exit.
        if self.setup.exe_dir.starts_with("/Volumes/NimbusInstaller") {
            debug!("detach /Volumes/NimbusInstaller");
            let _ = std::process::Command::new("hdiutil")
                .args(["detach", "/Volumes/NimbusInstaller", "-force"])
                .spawn();
        } else {
            debug!("{} not on installer media", self.setup.exe_dir.display());
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn detach_install_media(&self) {}

    fn ui_progress(&self, percent: u8) {
        if let Some(skin) = &self.skin {
            skin.borrow_mut().progress(percent);
        }
    }

    fn ui_status(&self, message: &str) {
        if let Some(skin) = &self.skin {
            skin.borrow_mut().status_message(message);
        }
    }

    fn ui_error(&self, message: &str) {
        if let Some(skin) = &self.skin {
            skin.borrow_mut().error_message(message);
        }
    }

    fn ui_debug(&self, message: &str) {
        if let Some(skin) = &self.skin {
            skin.borrow_mut().debug_message(message);
        }
    }
}

/// Which rescale band a transaction's raw download percentage maps into.
#[derive(Debug, Clone, Copy)]
enum ProgressBand {
    Platform,
    Services,
}

/// Forwards fine-grained download progress to the skin during a blocking
/// transaction. Held by the orchestrator only for the duration of the
/// call; the runner sees it weakly.
struct ProgressRelay {
    skin: Option<SharedSkin>,
    band: ProgressBand,
}

impl FetchListener for ProgressRelay {
    fn on_download_progress(&self, _tid: u32, _item: &str, percent: u8) {
        let scaled = match self.band {
            ProgressBand::Platform => scale_platform_download(percent),
            ProgressBand::Services => scale_service_download(percent),
        };
        if let Some(skin) = &self.skin {
            skin.borrow_mut().progress(scaled);
        }
    }
}

/// Listener for the privileged install process: status and errors pass
/// through, progress is rescaled into the 70-100 band, and completion is
/// latched for the orchestrator to act on.
struct InstallPhaseListener {
    skin: Option<SharedSkin>,
    done: bool,
}

impl InstallerEvents for InstallPhaseListener {
    fn on_status(&mut self, message: &str) {
        if let Some(skin) = &self.skin {
            skin.borrow_mut().status_message(message);
        }
    }

    fn on_error(&mut self, message: &str) {
        if let Some(skin) = &self.skin {
            skin.borrow_mut().error_message(message);
        }
    }

    fn on_progress(&mut self, percent: u8) {
        if let Some(skin) = &self.skin {
            skin.borrow_mut().progress(scale_install(percent));
        }
    }

    fn on_done(&mut self) {
        self.done = true;
    }
}
