// tests/portable.rs

//! Portable version manager integration tests

mod common;

use common::{FakeFetcher, TestServer, node_distribution, shasums_for, test_target};
use npmkit::portable::{PortableConfig, PortableVersionManager, VersionRegistry};
use npmkit::{
    Arch, Error, InstallStrategy, InstallationSelector, OsFamily, PlatformInfo, PortableInstaller,
    ProcessExecutor, StrategyKind,
};
use std::collections::HashMap;
use std::fs;
use std::thread;
use tempfile::TempDir;

const MIRROR: &str = "https://mirror.test/dist";
const VERSION: &str = "20.11.1";

fn archive_url(version: &str) -> String {
    format!(
        "{}/v{}/{}",
        MIRROR,
        version,
        test_target().file_name(version)
    )
}

fn manager(root: &TempDir, fetcher: &FakeFetcher) -> PortableVersionManager {
    let config = PortableConfig::new()
        .with_mirror(MIRROR)
        .with_target(test_target());
    PortableVersionManager::new(root.path(), config)
        .unwrap()
        .with_fetcher(Box::new(fetcher.clone()))
}

/// Serve a well-formed distribution and its checksum listing
fn publish(fetcher: &FakeFetcher, version: &str) {
    let archive = node_distribution(version);
    fetcher.serve(
        format!("{}/v{}/SHASUMS256.txt", MIRROR, version),
        shasums_for(&test_target().file_name(version), &archive),
    );
    fetcher.serve(archive_url(version), archive);
}

fn leftover_entries(root: &TempDir) -> Vec<String> {
    let versions = root.path().join("versions");
    match fs::read_dir(&versions) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn test_install_registers_version() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    publish(&fetcher, VERSION);

    let manager = manager(&root, &fetcher);
    let record = manager.install(VERSION).unwrap();

    assert_eq!(record.version, VERSION);
    assert_eq!(record.install_path, manager.version_dir(VERSION));
    assert!(record.runtime_path.is_file());
    assert!(record.package_manager_path.is_file());
    assert!(record.runtime_path.ends_with("bin/node"));

    let registry = VersionRegistry::load(&manager.registry_path()).unwrap();
    assert_eq!(registry.get(VERSION), Some(&record));
    assert_eq!(leftover_entries(&root), vec![format!("v{}", VERSION)]);
}

#[test]
fn test_install_twice_downloads_once() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    publish(&fetcher, VERSION);

    let manager = manager(&root, &fetcher);
    let first = manager.install(VERSION).unwrap();
    let second = manager.install(&format!("v{}", VERSION)).unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.downloads(), 1);
    assert_eq!(manager.list_installed().unwrap().len(), 1);
}

#[test]
fn test_checksum_mismatch_is_rejected() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    fetcher.serve(archive_url(VERSION), node_distribution(VERSION));
    fetcher.serve(
        format!("{}/v{}/SHASUMS256.txt", MIRROR, VERSION),
        shasums_for(&test_target().file_name(VERSION), b"something else"),
    );

    let manager = manager(&root, &fetcher);
    let err = manager.install(VERSION).unwrap_err();
    assert!(matches!(err, Error::IntegrityError { .. }), "got {err:?}");
    assert!(manager.record(VERSION).unwrap().is_none());
    assert!(!manager.version_dir(VERSION).exists());
}

#[test]
fn test_missing_checksum_listing_still_installs() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    fetcher.serve(archive_url(VERSION), node_distribution(VERSION));

    let record = manager(&root, &fetcher).install(VERSION).unwrap();
    assert!(record.runtime_path.is_file());
}

#[test]
fn test_failed_extraction_leaves_nothing_behind() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    fetcher.serve(archive_url(VERSION), b"this is not a gzip stream".to_vec());

    let manager = manager(&root, &fetcher);
    let err = manager.install(VERSION).unwrap_err();
    assert!(matches!(err, Error::ArchiveError(_)), "got {err:?}");

    assert!(manager.record(VERSION).unwrap().is_none());
    assert!(!manager.version_dir(VERSION).exists());
    assert!(leftover_entries(&root).is_empty());
}

#[test]
fn test_archive_without_executables_is_rejected() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    fetcher.serve(
        archive_url(VERSION),
        common::tar_gz(&[("node-v20.11.1-linux-x64/README.md", b"hi".as_slice(), 0o644)]),
    );

    let manager = manager(&root, &fetcher);
    assert!(matches!(
        manager.install(VERSION),
        Err(Error::ArchiveError(_))
    ));
    assert!(leftover_entries(&root).is_empty());
}

#[test]
fn test_download_failure_is_reported() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();

    let manager = manager(&root, &fetcher);
    assert!(matches!(
        manager.install(VERSION),
        Err(Error::DownloadError(_))
    ));
    assert!(manager.list_installed().unwrap().is_empty());
}

#[test]
fn test_uninstall_removes_directory_and_entry() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    publish(&fetcher, VERSION);

    let manager = manager(&root, &fetcher);
    let record = manager.install(VERSION).unwrap();
    let removed = manager.uninstall(VERSION).unwrap();

    assert_eq!(removed, record);
    assert!(!record.install_path.exists());
    assert!(manager.list_installed().unwrap().is_empty());
    assert!(matches!(
        manager.uninstall(VERSION),
        Err(Error::VersionNotInstalled(_))
    ));
}

#[test]
fn test_client_uses_installed_binaries() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    publish(&fetcher, VERSION);

    let manager = manager(&root, &fetcher);
    let record = manager.install(VERSION).unwrap();
    let client = manager.create_client(VERSION).unwrap();

    assert_eq!(client.runtime_path(), record.runtime_path.as_path());
    assert_eq!(client.package_manager_path(), record.package_manager_path.as_path());
    assert_eq!(client.bin_dir(), record.bin_dir());
}

#[test]
fn test_resolve_lts_from_index() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    fetcher.serve(
        format!("{}/index.json", MIRROR),
        r#"[{"version":"v21.6.2","lts":false},{"version":"v20.11.1","lts":"Iron"}]"#,
    );
    publish(&fetcher, VERSION);

    let manager = manager(&root, &fetcher);
    assert_eq!(manager.resolve_version("lts").unwrap(), VERSION);
    assert_eq!(manager.resolve_version("latest").unwrap(), "21.6.2");

    let record = manager.install_portable("lts").unwrap();
    assert_eq!(record.version, VERSION);
}

#[test]
fn test_unknown_fields_survive_install() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    publish(&fetcher, VERSION);

    let manager = manager(&root, &fetcher);
    fs::write(
        manager.registry_path(),
        r#"{"versions": {}, "written_by": "a newer npmkit"}"#,
    )
    .unwrap();
    manager.install(VERSION).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(manager.registry_path()).unwrap()).unwrap();
    assert_eq!(raw["written_by"], "a newer npmkit");
    assert!(raw["versions"][VERSION].is_object());
}

#[test]
fn test_concurrent_installs_of_different_versions() {
    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    let versions: Vec<String> = (0..8).map(|i| format!("20.{}.0", i)).collect();
    for version in &versions {
        publish(&fetcher, version);
    }

    thread::scope(|scope| {
        for version in &versions {
            let (root, fetcher) = (&root, &fetcher);
            scope.spawn(move || manager(root, fetcher).install(version).unwrap());
        }
    });

    let manager = manager(&root, &fetcher);
    let registry = VersionRegistry::load(&manager.registry_path()).unwrap();
    assert_eq!(registry.len(), versions.len());
    for version in &versions {
        let record = registry.get(version).unwrap();
        assert!(record.runtime_path.is_file());
    }

    let mut entries = leftover_entries(&root);
    entries.sort();
    let expected: Vec<String> = versions.iter().map(|v| format!("v{}", v)).collect();
    assert_eq!(entries, expected);
}

#[cfg(unix)]
#[test]
fn test_reinstall_after_crash_cleans_leftovers() {
    use std::time::{Duration, SystemTime};

    let root = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new();
    publish(&fetcher, VERSION);
    let manager = manager(&root, &fetcher);

    // Renamed into place but never recorded
    let orphan = manager.version_dir(VERSION);
    fs::create_dir_all(&orphan).unwrap();
    fs::write(orphan.join("junk"), b"half-written").unwrap();

    // Staging left by a crashed install, and one still in use by another installer
    let crashed = manager.versions_dir().join(".partial-crashed");
    fs::create_dir_all(crashed.join("tree")).unwrap();
    let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 3600);
    fs::File::open(&crashed)
        .unwrap()
        .set_modified(two_hours_ago)
        .unwrap();
    let in_flight = manager.versions_dir().join(".partial-inflight");
    fs::create_dir_all(&in_flight).unwrap();

    let record = manager.install(VERSION).unwrap();

    assert!(record.runtime_path.is_file());
    assert!(!orphan.join("junk").exists());
    assert!(!crashed.exists());
    assert!(in_flight.exists());
    assert_eq!(manager.list_installed().unwrap(), vec![record]);
}

#[test]
fn test_unsupported_platform_fails_at_install_time() {
    let root = TempDir::new().unwrap();
    let riscv = PlatformInfo::new(OsFamily::Linux, Arch::Other("riscv64".to_string()));
    let manager = PortableVersionManager::new(root.path(), PortableConfig::new().with_mirror(MIRROR))
        .unwrap()
        .with_platform(riscv)
        .with_fetcher(Box::new(FakeFetcher::new()));

    // Registry operations still work
    assert!(manager.list_installed().unwrap().is_empty());
    assert!(matches!(
        manager.download_url(VERSION),
        Err(Error::UnsupportedPlatform(_))
    ));

    let strategies = vec![
        InstallStrategy::Portable {
            version: VERSION.to_string(),
        },
        InstallStrategy::Manual {
            instructions: "build Node.js from source".to_string(),
        },
    ];
    let err = InstallationSelector::new(ProcessExecutor::default())
        .with_portable(&manager)
        .run(&strategies)
        .unwrap_err();

    let attempts = err.attempts().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].strategy, StrategyKind::Portable);
    assert!(attempts[0].failure().unwrap().contains("riscv64"));
}

#[test]
fn test_install_over_http() {
    let archive = node_distribution(VERSION);
    let file_name = test_target().file_name(VERSION);
    let mut routes = HashMap::new();
    routes.insert(
        format!("/dist/v{}/SHASUMS256.txt", VERSION),
        shasums_for(&file_name, &archive).into_bytes(),
    );
    routes.insert(format!("/dist/v{}/{}", VERSION, file_name), archive);
    let server = TestServer::start(routes);

    let root = TempDir::new().unwrap();
    let config = PortableConfig::new()
        .with_mirror(server.url("/dist"))
        .with_target(test_target());
    let manager = PortableVersionManager::new(root.path(), config).unwrap();

    let record = manager.install(VERSION).unwrap();
    assert!(record.runtime_path.is_file());
    assert!(server.hits() >= 2);
}
