//! nimbus-installer - CLI entry point.
//!
//! Flag surface: skin selection (`--silent`/`--nogui`, `--verbose`,
//! `--statefile`), log destination/level, locale override, and an optional
//! local package and/or version overriding the configuration document. The
//! default presentation is the console skin; a rendered dialog would slot
//! in through the same `InstallerSkin` seam.

use clap::Parser;
use nimbus_core::{fsx, paths, pkg, InstallerConfig, PlatformVersion, ProductPaths};
use nimbus_installer::orchestrator::{DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH};
use nimbus_installer::{
    DistroFetcher, HttpReporter, InstallOrchestrator, InstallProcessRunner, InstallerEvent,
    InstallerSkin, OrchestratorSetup, RunLoop, SilentSkin, StateDocSkin, VerboseSkin,
};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nimbus_installer::strings;

#[derive(Parser, Debug)]
#[command(
    name = "nimbus-installer",
    about = "Installs the Nimbus platform and configured services",
    disable_version_flag = true
)]
struct Cli {
    /// Run with no UI output at all
    #[arg(long)]
    silent: bool,

    /// Run without a graphical interface (same console presentation)
    #[arg(long)]
    nogui: bool,

    /// Print percentage/status lines to the console
    #[arg(long)]
    verbose: bool,

    /// Install from a local platform package (Name_x.y.z.npkg)
    #[arg(long, value_name = "PATH")]
    pkg: Option<PathBuf>,

    /// Override the platform version to install
    #[arg(long, value_name = "VERSION")]
    version: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "debug", value_name = "LEVEL")]
    log: String,

    /// Log destination: a file path, or "console"
    #[arg(long, value_name = "PATH|console")]
    logfile: Option<String>,

    /// Append to the log file instead of truncating it
    #[arg(long)]
    append_to_log: bool,

    /// Override the user's locale (recorded only; strings are not localized)
    #[arg(long, value_name = "LOCALE")]
    locale: Option<String>,

    /// Mirror installation state into a JSON document at PATH
    #[arg(long, value_name = "PATH")]
    statefile: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli);
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.canonicalize().ok())
        .and_then(|p| p.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    info!("exe_dir = {}", exe_dir.display());

    if let Some(locale) = &cli.locale {
        info!("locale override: {locale}");
    }

    let config_path = exe_dir.join("installer.config");
    let config = match InstallerConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            return 1;
        }
    };

    // Command line package and version take precedence over the
    // configuration document.
    let update_pkg;
    let mut platform_version;
    if let Some(pkg_path) = cli.pkg.clone() {
        match pkg::version_from_package(&pkg_path) {
            Some(version) => {
                platform_version = Some(version);
                update_pkg = Some(pkg_path);
            }
            None => {
                eprintln!(
                    "error: package {} not of form Nimbus_x.x.x.{}",
                    pkg_path.display(),
                    pkg::PACKAGE_EXT
                );
                return 2;
            }
        }
    } else {
        update_pkg = config.package.clone();
        platform_version = config.package_version;
    }
    if let Some(text) = &cli.version {
        match PlatformVersion::parse(text) {
            Ok(version) => platform_version = Some(version),
            Err(e) => {
                eprintln!("error: {e}");
                return 2;
            }
        }
    }
    info!("update package: {update_pkg:?}");
    info!("update version: {platform_version:?}");

    let product_paths = match ProductPaths::system() {
        Ok(paths) => paths,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            return 1;
        }
    };

    // Some platforms hand back the same temp path every run; start clean.
    let dest_dir = paths::working_dir();
    fsx::remove_best_effort(&dest_dir);

    let rl = RunLoop::new();
    let skin: Rc<RefCell<dyn InstallerSkin>> = if cli.silent || cli.nogui {
        Rc::new(RefCell::new(SilentSkin::new(rl.sender())))
    } else if let Some(path) = cli.statefile.clone() {
        Rc::new(RefCell::new(StateDocSkin::new(rl.sender(), path)))
    } else {
        // default console presentation; --verbose lands here too
        Rc::new(RefCell::new(VerboseSkin::new(rl.sender())))
    };

    let setup = OrchestratorSetup {
        exe_dir,
        dest_dir: dest_dir.clone(),
        update_pkg,
        platform_version,
        servers: config.distro_servers.clone(),
        services: config.services.clone(),
        permissions: config.permissions.clone(),
        auto_update_permissions: config.auto_update_permissions.clone(),
        width: config.window.width.unwrap_or(DEFAULT_WINDOW_WIDTH),
        height: config.window.height.unwrap_or(DEFAULT_WINDOW_HEIGHT),
        title: config
            .window
            .title
            .clone()
            .unwrap_or_else(|| strings::INSTALLER_TITLE.to_string()),
        product_paths,
        lock_name: paths::INSTALLER_LOCK_NAME.to_string(),
    };

    let mut orchestrator = InstallOrchestrator::new(
        setup,
        Some(skin),
        rl.sender(),
        Box::new(DistroFetcher::new(config.distro_servers)),
        Box::new(InstallProcessRunner),
        Box::new(HttpReporter),
    );

    rl.sender().send(InstallerEvent::Run);
    rl.run(|event| match event {
        InstallerEvent::Run => orchestrator.run(),
        InstallerEvent::BeginInstall => orchestrator.begin_install(),
        InstallerEvent::CancelInstallation => orchestrator.cancel_installation(),
        InstallerEvent::Shutdown => orchestrator.shutdown(),
    });

    // Exit cleanup removes the working directory on the normal paths; this
    // covers runs that never reached one.
    fsx::remove_best_effort(&dest_dir);
    orchestrator.exit_status().unwrap_or(1)
}

fn setup_logging(cli: &Cli) {
    let filter = EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("debug"));
    match cli.logfile.as_deref() {
        Some("console") => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        other => {
            // The log file cannot live next to the executable: installers
            // run from read-only mounted media.
            let path = other
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("NimbusInstaller.log"));
            let mut options = std::fs::OpenOptions::new();
            options.create(true).write(true);
            if cli.append_to_log {
                options.append(true);
            } else {
                options.truncate(true);
            }
            match options.open(&path) {
                Ok(file) => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file))
                        .init();
                }
                Err(_) => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(std::io::stderr)
                        .init();
                }
            }
        }
    }
}
