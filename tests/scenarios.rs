//! End-to-end repository scenarios: ingest, versioning, prefix scans,
//! delete/re-add, and threshold sealing.

use tempfile::TempDir;
use warcrepo::{ArtifactData, RepoConfig, WarcRepository};
use warcrepo_core::sha256_hex;

fn open_repo(dir: &TempDir) -> WarcRepository {
    WarcRepository::open(quiet_config(dir)).unwrap()
}

fn quiet_config(dir: &TempDir) -> RepoConfig {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut config = RepoConfig::new(dir.path());
    config.gc_interval_ms = 3_600_000;
    config
}

fn response(uri: &str, body: &[u8]) -> ArtifactData {
    ArtifactData::new(
        "c1",
        "a1",
        uri,
        "HTTP/1.1 200 OK",
        vec![
            ("key1".to_string(), "val1".to_string()),
            ("key2".to_string(), "val2".to_string()),
        ],
        body.to_vec(),
    )
}

#[test]
fn round_trip_add_commit_get() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);

    let artifact = repo
        .add_artifact(response("http://h/p", b"content string 1"))
        .unwrap();
    assert_eq!(artifact.version(), 1);
    assert!(!artifact.committed());

    let committed = repo
        .commit_artifact("c1", artifact.id())
        .unwrap()
        .wait()
        .unwrap()
        .expect("commit should resolve with the descriptor");

    assert!(committed.committed());
    assert_eq!(committed.content_length(), 16);
    assert_eq!(committed.content_digest(), sha256_hex(b"content string 1"));
    let tmp_dir = dir.path().join("tmp").join("warcs");
    assert!(
        !committed.storage_url().to_path().starts_with(&tmp_dir),
        "committed artifact must leave temp storage"
    );

    let mut data = repo.get_artifact_data("c1", artifact.id()).unwrap();
    assert_eq!(data.status_line(), "HTTP/1.1 200 OK");
    assert_eq!(
        data.headers(),
        &[
            ("key1".to_string(), "val1".to_string()),
            ("key2".to_string(), "val2".to_string()),
        ]
    );
    let body = data.take_payload().unwrap().into_bytes().unwrap();
    assert_eq!(body, b"content string 1");

    repo.shutdown();
}

#[test]
fn versioning_skips_uncommitted_in_enumeration() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);

    let v1 = repo
        .add_artifact(response("http://h/u1", &[b'a'; 10]))
        .unwrap();
    let _v2 = repo
        .add_artifact(response("http://h/u1", &[b'b'; 20]))
        .unwrap();
    let v3 = repo
        .add_artifact(response("http://h/u1", &[b'c'; 30]))
        .unwrap();

    repo.commit_artifact("c1", v1.id())
        .unwrap()
        .wait()
        .unwrap()
        .unwrap();
    repo.commit_artifact("c1", v3.id())
        .unwrap()
        .wait()
        .unwrap()
        .unwrap();

    let latest = repo.get_artifact("c1", "a1", "http://h/u1").unwrap();
    assert_eq!(latest.version(), 3);

    let versions: Vec<u32> = repo
        .get_artifact_all_versions("c1", "a1", "http://h/u1")
        .map(|a| a.version())
        .collect();
    assert_eq!(versions, vec![3, 1], "v2 is uncommitted and must be omitted");

    assert_eq!(repo.au_size("c1", "a1"), 30);
    repo.shutdown();
}

#[test]
fn prefix_scan_in_url_order() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);

    for uri in ["http://h/a", "http://h/aa", "http://h/b"] {
        let artifact = repo.add_artifact(response(uri, b"body")).unwrap();
        repo.commit_artifact("c1", artifact.id())
            .unwrap()
            .wait()
            .unwrap()
            .unwrap();
    }

    let uris: Vec<String> = repo
        .get_artifacts_with_prefix("c1", "a1", "http://h/a")
        .map(|a| a.uri().to_string())
        .collect();
    assert_eq!(uris, vec!["http://h/a", "http://h/aa"]);

    assert_eq!(
        repo.get_artifacts_with_prefix("c1", "a1", "http://h/z").count(),
        0
    );
    repo.shutdown();
}

#[test]
fn delete_then_re_add_gets_next_version() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);

    let v1 = repo.add_artifact(response("http://h/u", b"first")).unwrap();
    repo.commit_artifact("c1", v1.id())
        .unwrap()
        .wait()
        .unwrap()
        .unwrap();

    repo.delete_artifact("c1", v1.id()).unwrap();
    assert!(repo.get_artifact("c1", "a1", "http://h/u").is_none());

    let v2 = repo.add_artifact(response("http://h/u", b"xyz")).unwrap();
    assert_eq!(v2.version(), 2);
    repo.commit_artifact("c1", v2.id())
        .unwrap()
        .wait()
        .unwrap()
        .unwrap();

    let latest = repo.get_artifact("c1", "a1", "http://h/u").unwrap();
    assert_eq!(latest.version(), 2);
    assert_eq!(repo.au_size("c1", "a1"), 3);

    let versions: Vec<u32> = repo
        .get_artifact_all_versions("c1", "a1", "http://h/u")
        .map(|a| a.version())
        .collect();
    assert_eq!(versions, vec![2], "deleted v1 must be gone");
    repo.shutdown();
}

#[test]
fn threshold_seal_rolls_the_active_warc() {
    let dir = TempDir::new().unwrap();
    let mut config = quiet_config(&dir);
    config.threshold_warc_size = 1024;
    let repo = WarcRepository::open(config).unwrap();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let artifact = repo
            .add_artifact(response("http://h/p", &[b'x'; 500]))
            .unwrap();
        repo.commit_artifact("c1", artifact.id())
            .unwrap()
            .wait()
            .unwrap()
            .unwrap();
        ids.push(artifact.id());
    }

    let sealed_dir = dir.path().join("sealed");
    let sealed: Vec<String> = std::fs::read_dir(&sealed_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(!sealed.is_empty(), "threshold must have sealed a WARC");
    for name in &sealed {
        assert!(name.starts_with("c1_au-"), "bad sealed name {}", name);
        assert!(name.ends_with("artifacts.warc"), "bad sealed name {}", name);
    }

    // Every version stays retrievable across the seals
    for id in ids {
        let mut data = repo.get_artifact_data("c1", id).unwrap();
        let body = data.take_payload().unwrap().into_bytes().unwrap();
        assert_eq!(body.len(), 500);
    }
    repo.shutdown();
}

#[test]
fn collections_and_aus_enumerate_committed_only() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);

    let committed = repo.add_artifact(response("http://h/a", b"x")).unwrap();
    repo.commit_artifact("c1", committed.id())
        .unwrap()
        .wait()
        .unwrap()
        .unwrap();

    // A second AU with only uncommitted content stays invisible
    let other = ArtifactData::new(
        "c1",
        "a2",
        "http://h/b",
        "HTTP/1.1 200 OK",
        vec![],
        b"y".to_vec(),
    );
    repo.add_artifact(other).unwrap();

    let collections: Vec<String> = repo.collection_ids().collect();
    assert_eq!(collections, vec!["c1"]);
    let aus: Vec<String> = repo.au_ids("c1").collect();
    assert_eq!(aus, vec!["a1"]);
    repo.shutdown();
}

#[test]
fn concurrent_adds_assign_contiguous_versions() {
    let dir = TempDir::new().unwrap();
    let repo = std::sync::Arc::new(open_repo(&dir));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let repo = std::sync::Arc::clone(&repo);
        handles.push(std::thread::spawn(move || {
            for _ in 0..5 {
                repo.add_artifact(response("http://h/shared", b"concurrent"))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut versions: Vec<u32> = (1..=20)
        .filter_map(|v| {
            repo.get_artifact_version("c1", "a1", "http://h/shared", v, true)
                .map(|a| a.version())
        })
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, (1..=20).collect::<Vec<u32>>());
    repo.shutdown();
}

#[test]
fn storage_info_is_populated() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);
    let info = repo.storage_info().unwrap();
    assert!(info.total > 0);
    assert!(info.used <= info.total);
    repo.shutdown();
}
