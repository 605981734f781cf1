//! End-to-end orchestrator scenarios against in-process fakes of the fetch
//! and install-process collaborators.

use async_trait::async_trait;
use nimbus_installer::fetch::{EventSink, FetchEvent, Fetcher};
use nimbus_installer::orchestrator::{DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH};
use nimbus_installer::process::{InstallProcess, InstallerEvents};
use nimbus_installer::telemetry::InstallReporter;
use nimbus_installer::{
    InstallOrchestrator, InstallerEvent, InstallerSkin, OrchestratorSetup, OrchestratorState,
    ProductPaths, RunLoop, RunLoopSender,
};
use nimbus_core::{PlatformVersion, ServiceRequest};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

const PLATFORM_VERSION: &str = "2.5.0";

/// Fetcher fake: version discovery, platform "download" (creates the
/// version directory the way the real fetcher unpacks into it), service
/// download with progress.
struct FakeFetcher {
    version: Option<String>,
}

impl FakeFetcher {
    fn new() -> Self {
        Self { version: None }
    }
}

#[async_trait(?Send)]
impl Fetcher for FakeFetcher {
    async fn get_platform_version_and_size(&mut self, _dest: &Path, events: &EventSink) {
        self.version = Some(PLATFORM_VERSION.to_string());
        let _ = events.send(FetchEvent::PlatformVersionAndSize {
            tid: 1,
            version: PLATFORM_VERSION.into(),
            size: 4096,
        });
    }

    async fn get_platform(&mut self, dest: &Path, events: &EventSink) {
        for percent in [50, 100] {
            let _ = events.send(FetchEvent::DownloadProgress {
                tid: 2,
                item: PLATFORM_VERSION.into(),
                percent,
            });
        }
        let platform_dir = dest.join(PLATFORM_VERSION);
        std::fs::create_dir_all(platform_dir.join("daemon")).unwrap();
        std::fs::write(platform_dir.join("daemon/nimbusd"), "bits").unwrap();
        let _ = events.send(FetchEvent::PlatformDownloaded { tid: 2 });
    }

    async fn get_services(
        &mut self,
        dest: &Path,
        services: &[ServiceRequest],
        events: &EventSink,
    ) {
        for request in services {
            for percent in [50, 100] {
                let _ = events.send(FetchEvent::DownloadProgress {
                    tid: 3,
                    item: request.name.clone(),
                    percent,
                });
            }
            let service_dir = dest.join("services").join(&request.name);
            std::fs::create_dir_all(&service_dir).unwrap();
        }
        let _ = events.send(FetchEvent::ServicesDownloaded { tid: 3 });
    }

    fn platform_version(&self) -> Option<String> {
        self.version.clone()
    }

    fn platform_size(&self) -> u64 {
        4096
    }
}

/// Install-process fake following the updater's reporting shape.
struct FakeProcess;

impl InstallProcess for FakeProcess {
    fn run(
        &mut self,
        platform_dir: &Path,
        listener: &mut dyn InstallerEvents,
    ) -> nimbus_core::Result<()> {
        assert!(platform_dir.exists(), "handoff requires a prepared dir");
        listener.on_status("Copying platform");
        for percent in [0, 50, 100] {
            listener.on_progress(percent);
        }
        listener.on_done();
        Ok(())
    }
}

#[derive(Default)]
struct SkinRecord {
    progress: Vec<u8>,
    statuses: Vec<String>,
    errors: Vec<String>,
    ended: bool,
}

/// Skin that records everything and drives begin/shutdown like the silent
/// variant.
struct RecordingSkin {
    driver: RunLoopSender,
    record: Rc<RefCell<SkinRecord>>,
}

impl InstallerSkin for RecordingSkin {
    fn start_up(&mut self, width: u32, height: u32, _title: &str) {
        assert_eq!(width, DEFAULT_WINDOW_WIDTH);
        assert_eq!(height, DEFAULT_WINDOW_HEIGHT);
        self.driver.send(InstallerEvent::BeginInstall);
    }

    fn status_message(&mut self, message: &str) {
        self.record.borrow_mut().statuses.push(message.to_string());
    }

    fn error_message(&mut self, message: &str) {
        self.record.borrow_mut().errors.push(message.to_string());
    }

    fn debug_message(&mut self, _message: &str) {}

    fn progress(&mut self, percent: u8) {
        self.record.borrow_mut().progress.push(percent);
    }

    fn all_done(&mut self) {
        self.driver.send(InstallerEvent::Shutdown);
    }

    fn ended(&mut self) {
        self.record.borrow_mut().ended = true;
    }
}

struct CountingReporter {
    count: Rc<Cell<usize>>,
}

impl InstallReporter for CountingReporter {
    fn report_install(&self, servers: &[String], _os: &str, version: &str, id: &str) {
        assert_eq!(servers, ["https://dist.example/"]);
        assert_eq!(version, PLATFORM_VERSION);
        assert!(!id.is_empty());
        self.count.set(self.count.get() + 1);
    }
}

struct Fixture {
    rl: RunLoop,
    orchestrator: InstallOrchestrator,
    record: Rc<RefCell<SkinRecord>>,
    reports: Rc<Cell<usize>>,
    dest_dir: PathBuf,
}

fn fixture(
    tmp: &tempfile::TempDir,
    lock_name: &str,
    update_pkg: Option<PathBuf>,
    platform_version: Option<PlatformVersion>,
    services: Vec<ServiceRequest>,
) -> Fixture {
    let rl = RunLoop::new();
    let record = Rc::new(RefCell::new(SkinRecord::default()));
    let reports = Rc::new(Cell::new(0));
    let dest_dir = tmp.path().join("work");

    let skin = RecordingSkin {
        driver: rl.sender(),
        record: Rc::clone(&record),
    };
    let orchestrator = InstallOrchestrator::new(
        OrchestratorSetup {
            exe_dir: tmp.path().to_path_buf(),
            dest_dir: dest_dir.clone(),
            update_pkg,
            platform_version,
            servers: vec!["https://dist.example/".into()],
            services,
            permissions: Some(serde_json::json!({"allowDomains": ["example.com"]})),
            auto_update_permissions: None,
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
            title: "Nimbus Installer".into(),
            product_paths: ProductPaths::new(tmp.path().join("root")),
            lock_name: lock_name.into(),
        },
        Some(Rc::new(RefCell::new(skin))),
        rl.sender(),
        Box::new(FakeFetcher::new()),
        Box::new(FakeProcess),
        Box::new(CountingReporter {
            count: Rc::clone(&reports),
        }),
    );

    Fixture {
        rl,
        orchestrator,
        record,
        reports,
        dest_dir,
    }
}

fn drive(fixture: &mut Fixture) {
    fixture.rl.sender().send(InstallerEvent::Run);
    let orchestrator = &mut fixture.orchestrator;
    fixture.rl.run(|event| match event {
        InstallerEvent::Run => orchestrator.run(),
        InstallerEvent::BeginInstall => orchestrator.begin_install(),
        InstallerEvent::CancelInstallation => orchestrator.cancel_installation(),
        InstallerEvent::Shutdown => orchestrator.shutdown(),
    });
}

#[test]
fn test_network_install_end_to_end() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut fx = fixture(
        &tmp,
        "nimbus-flow-network",
        None,
        None,
        vec![ServiceRequest {
            name: "Foo".into(),
            version: None,
            min_version: Some("1.0".into()),
        }],
    );
    drive(&mut fx);

    assert_eq!(fx.orchestrator.state(), OrchestratorState::AllDone);
    assert_eq!(fx.orchestrator.exit_status(), Some(0));

    let record = fx.record.borrow();
    assert!(record.errors.is_empty(), "errors: {:?}", record.errors);
    assert!(record.ended);

    // Monotonic progress through the documented markers.
    let progress = &record.progress;
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    for marker in [1, 2, 41, 66, 67, 69, 70, 100] {
        assert!(progress.contains(&marker), "missing {marker} in {progress:?}");
    }
    // download bands were exercised
    assert!(progress.contains(&40), "platform band end in {progress:?}");
    assert!(progress.contains(&65), "service band end in {progress:?}");

    // fresh install telemetry exactly once
    assert_eq!(fx.reports.get(), 1);

    // working directory is gone after exit cleanup
    assert!(!fx.dest_dir.exists());

    // the skin narrated both download phases
    assert!(record.statuses.iter().any(|s| s.contains("platform")));
    assert!(record.statuses.iter().any(|s| s.contains("services")));
}

#[test]
fn test_missing_local_package_fails_before_installing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut fx = fixture(
        &tmp,
        "nimbus-flow-missing-pkg",
        Some(PathBuf::from("Nimbus_9.9.9.npkg")),
        Some(PlatformVersion::parse("9.9.9").unwrap()),
        Vec::new(),
    );
    drive(&mut fx);

    // Environment error surfaced before any state transition.
    assert_eq!(fx.orchestrator.state(), OrchestratorState::Started);
    assert_eq!(fx.orchestrator.exit_status(), None);
    let record = fx.record.borrow();
    assert_eq!(record.errors.len(), 1);
    assert!(record.errors[0].contains("not found"), "{:?}", record.errors);
    assert_eq!(fx.reports.get(), 0);
}

#[test]
fn test_local_package_install_skips_network_and_telemetry() {
    let tmp = tempfile::TempDir::new().unwrap();

    // Build a real package: Nimbus_1.0.0.npkg with a daemon payload.
    let payload = tmp.path().join("payload");
    std::fs::create_dir_all(payload.join("daemon")).unwrap();
    std::fs::write(payload.join("daemon/nimbusd"), "bits").unwrap();
    let pkg_path = tmp.path().join("Nimbus_1.0.0.npkg");
    let pkg_file = std::fs::File::create(&pkg_path).unwrap();
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        pkg_file,
        flate2::Compression::default(),
    ));
    builder.append_dir_all(".", &payload).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let mut fx = fixture(
        &tmp,
        "nimbus-flow-local-pkg",
        Some(pkg_path),
        Some(PlatformVersion::parse("1.0.0").unwrap()),
        Vec::new(),
    );
    drive(&mut fx);

    assert_eq!(fx.orchestrator.state(), OrchestratorState::AllDone);
    assert_eq!(fx.orchestrator.exit_status(), Some(0));

    let record = fx.record.borrow();
    assert!(record.errors.is_empty(), "errors: {:?}", record.errors);

    let progress = &record.progress;
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    for marker in [1, 5, 15, 25, 35, 41, 66, 67, 69, 100] {
        assert!(progress.contains(&marker), "missing {marker} in {progress:?}");
    }

    // an update-package install is not a fresh install
    assert_eq!(fx.reports.get(), 0);
}

#[test]
fn test_permissions_seeded_into_platform_dir() {
    let tmp = tempfile::TempDir::new().unwrap();

    // Capture the platform dir before exit cleanup deletes the working
    // directory: the fake process checks it, and the permissions document
    // must be in place by handoff time.
    struct CheckingProcess {
        saw_permissions: Rc<Cell<bool>>,
    }
    impl InstallProcess for CheckingProcess {
        fn run(
            &mut self,
            platform_dir: &Path,
            listener: &mut dyn InstallerEvents,
        ) -> nimbus_core::Result<()> {
            let perms = platform_dir.join("permissions/configDomainPermissions");
            self.saw_permissions.set(perms.exists());
            listener.on_done();
            Ok(())
        }
    }

    let rl = RunLoop::new();
    let record = Rc::new(RefCell::new(SkinRecord::default()));
    let saw_permissions = Rc::new(Cell::new(false));
    let skin = RecordingSkin {
        driver: rl.sender(),
        record: Rc::clone(&record),
    };
    let mut orchestrator = InstallOrchestrator::new(
        OrchestratorSetup {
            exe_dir: tmp.path().to_path_buf(),
            dest_dir: tmp.path().join("work"),
            update_pkg: None,
            platform_version: None,
            servers: vec!["https://dist.example/".into()],
            services: Vec::new(),
            permissions: Some(serde_json::json!({"allowDomains": ["example.com"]})),
            auto_update_permissions: Some(serde_json::json!({"silent": true})),
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
            title: "Nimbus Installer".into(),
            product_paths: ProductPaths::new(tmp.path().join("root")),
            lock_name: "nimbus-flow-perms".into(),
        },
        Some(Rc::new(RefCell::new(skin))),
        rl.sender(),
        Box::new(FakeFetcher::new()),
        Box::new(CheckingProcess {
            saw_permissions: Rc::clone(&saw_permissions),
        }),
        Box::new(CountingReporter {
            count: Rc::new(Cell::new(0)),
        }),
    );

    rl.sender().send(InstallerEvent::Run);
    rl.run(|event| match event {
        InstallerEvent::Run => orchestrator.run(),
        InstallerEvent::BeginInstall => orchestrator.begin_install(),
        InstallerEvent::CancelInstallation => orchestrator.cancel_installation(),
        InstallerEvent::Shutdown => orchestrator.shutdown(),
    });

    assert_eq!(orchestrator.state(), OrchestratorState::AllDone);
    assert!(saw_permissions.get());
}
