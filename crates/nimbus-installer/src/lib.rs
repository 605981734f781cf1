//! Nimbus Installer - installation orchestration engine.
//!
//! The orchestrator sequences version discovery, platform download or
//! local-package unpack, service downloads, permission seeding, uninstaller
//! staging, and the handoff to the privileged install process, reporting
//! progress to a replaceable skin.
//!
//! # Modules
//!
//! - `orchestrator` - the top-level state machine
//! - `runner` - blocking driver for one asynchronous fetch transaction
//! - `fetch` - the distribution-server collaborator
//! - `process` - the privileged install-process collaborator
//! - `skin` - pluggable UI variants
//! - `runloop` - the single-threaded event loop owning the orchestrator
//! - `updater` - the privileged install step run by `nimbus-updater`

pub mod fetch;
pub mod orchestrator;
pub mod process;
pub mod runloop;
pub mod runner;
pub mod skin;
pub mod strings;
pub mod telemetry;
pub mod updater;

// Re-export commonly used types
pub use fetch::{DistroFetcher, FetchCommand, FetchEvent, FetchListener, Fetcher};
pub use orchestrator::{InstallOrchestrator, OrchestratorSetup, OrchestratorState};
pub use process::{InstallProcess, InstallProcessRunner, InstallerEvents, UpdaterMessage};
pub use runloop::{InstallerEvent, RunLoop, RunLoopSender};
pub use runner::{FetchOutcome, TransactionRunner};
pub use skin::{InstallerSkin, SilentSkin, StateDocSkin, VerboseSkin};
pub use telemetry::{HttpReporter, InstallReporter};

// Re-export nimbus-core types commonly needed alongside the engine
pub use nimbus_core::{NimbusError, PlatformVersion, ProductPaths, Result};
