use assert_cmd::Command;
use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::Server;
use std::io::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn create_tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let mut tar_builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_path(name).unwrap();
        header.set_mode(0o644);
        header.set_cksum();
        tar_builder.append(&header, content.as_bytes()).unwrap();
    }
    let tar = tar_builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn write_edition(root: &Path, name: &str, contents: &str) {
    let editions = root.join("editions");
    std::fs::create_dir_all(&editions).unwrap();
    std::fs::write(editions.join(format!("{name}.json")), contents).unwrap();
}

fn edist() -> Command {
    Command::cargo_bin("edist").unwrap()
}

#[test]
fn test_engine_version_resolves_through_parent_chain() {
    let root = tempdir().unwrap();
    write_edition(root.path(), "base", r#"{"engine-version": "2024.1.1"}"#);
    write_edition(root.path(), "app", r#"{"parent": "base"}"#);

    edist()
        .args(["--root", root.path().to_str().unwrap(), "engine-version", "app"])
        .assert()
        .success()
        .stdout(predicates::str::contains("2024.1.1"));
}

#[test]
fn test_engine_version_falls_back_to_default() {
    let root = tempdir().unwrap();
    write_edition(root.path(), "plain", "{}");

    edist()
        .args([
            "--root",
            root.path().to_str().unwrap(),
            "engine-version",
            "plain",
            "--default-engine-version",
            "2023.12.0",
        ])
        .assert()
        .success()
        .stdout(predicates::str::contains("2023.12.0"));
}

#[test]
fn test_resolve_merges_child_over_parent() {
    let root = tempdir().unwrap();
    write_edition(
        root.path(),
        "base",
        r#"{
            "engine-version": "1.0.0",
            "repositories": [
                {"name": "A", "url": "https://a.example"},
                {"name": "B", "url": "https://b.example"}
            ]
        }"#,
    );
    write_edition(
        root.path(),
        "app",
        r#"{
            "parent": "base",
            "repositories": [
                {"name": "B", "url": "https://b.example"},
                {"name": "C", "url": "https://c.example"}
            ]
        }"#,
    );

    let output = edist()
        .args(["--root", root.path().to_str().unwrap(), "resolve", "app"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let resolved: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(resolved["engine-version"], "1.0.0");
    let names: Vec<&str> = resolved["repositories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["B", "C", "A"]);
}

#[test]
fn test_resolve_reports_cycles() {
    let root = tempdir().unwrap();
    write_edition(root.path(), "a", r#"{"parent": "b"}"#);
    write_edition(root.path(), "b", r#"{"parent": "a"}"#);

    edist()
        .args(["--root", root.path().to_str().unwrap(), "resolve", "a"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("cycle"));
}

#[test]
fn test_install_list_uninstall_engine() {
    let mut server = Server::new();
    let url = server.url();

    let archive = create_tar_gz(&[
        ("engine-1.0.0/bin/engine", "#!/bin/sh"),
        ("engine-1.0.0/manifest.txt", "engine"),
    ]);
    let digest = sha256_hex(&archive);

    let _manifest = server
        .mock("GET", "/engines/1.0.0/manifest.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{
                "runtime-version": "21.0.0",
                "artifacts": [
                    {{"name": "engine.tar.gz", "url": "{url}/download/engine.tar.gz",
                      "sha256": "{digest}"}}
                ]
            }}"#
        ))
        .create();

    let runtime_archive = create_tar_gz(&[("runtime-21.0.0/bin/java", "#!/bin/sh")]);
    let _runtime_manifest = server
        .mock("GET", "/runtimes/21.0.0/manifest.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{
                "artifacts": [
                    {{"name": "runtime.tar.gz", "url": "{url}/download/runtime.tar.gz"}}
                ]
            }}"#
        ))
        .create();

    let _engine_download = server
        .mock("GET", "/download/engine.tar.gz")
        .with_status(200)
        .with_body(archive)
        .create();
    let _runtime_download = server
        .mock("GET", "/download/runtime.tar.gz")
        .with_status(200)
        .with_body(runtime_archive)
        .create();

    let root = tempdir().unwrap();
    let root_arg = root.path().to_str().unwrap();

    edist()
        .args(["--root", root_arg, "--release-url", &url, "install-engine", "1.0.0"])
        .assert()
        .success();

    let engine_dir = root.path().join("engines").join("1.0.0");
    assert!(engine_dir.join("bin").join("engine").exists());
    assert!(engine_dir.join(".installed.json").exists());
    assert!(
        root.path()
            .join("runtimes")
            .join("21.0.0")
            .join(".installed.json")
            .exists()
    );

    edist()
        .args(["--root", root_arg, "list-engines"])
        .assert()
        .success()
        .stdout(predicates::str::contains("1.0.0"));

    edist()
        .args(["--root", root_arg, "uninstall-engine", "1.0.0"])
        .assert()
        .success();
    assert!(!engine_dir.exists());

    // Uninstalling again fails cleanly and changes nothing.
    edist()
        .args(["--root", root_arg, "uninstall-engine", "1.0.0"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("not installed"));
}

#[test]
fn test_install_engine_rejects_corrupt_artifact() {
    let mut server = Server::new();
    let url = server.url();

    let archive = create_tar_gz(&[("engine-2.0.0/manifest.txt", "engine")]);
    let _manifest = server
        .mock("GET", "/engines/2.0.0/manifest.json")
        .with_status(200)
        .with_body(format!(
            r#"{{
                "artifacts": [
                    {{"name": "engine.tar.gz", "url": "{url}/download/engine.tar.gz",
                      "sha256": "{}"}}
                ]
            }}"#,
            "0".repeat(64)
        ))
        .create();
    let _download = server
        .mock("GET", "/download/engine.tar.gz")
        .with_status(200)
        .with_body(archive)
        .create();

    let root = tempdir().unwrap();
    edist()
        .args([
            "--root",
            root.path().to_str().unwrap(),
            "--release-url",
            &url,
            "install-engine",
            "2.0.0",
        ])
        .assert()
        .failure()
        .stderr(predicates::str::contains("checksum mismatch"));

    assert!(!root.path().join("engines").join("2.0.0").exists());
}

#[test]
fn test_package_query_fetches_then_caches() {
    let mut server = Server::new();
    let url = server.url();

    let descriptor = server
        .mock("GET", "/libraries/Standard/Table/1.2.0/package.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"namespace": "Standard", "name": "Table", "license": "MIT"}"#)
        .expect(1)
        .create();

    let root = tempdir().unwrap();
    let root_arg = root.path().to_str().unwrap();
    let args = [
        "--root",
        root_arg,
        "package",
        "Standard.Table",
        "--version",
        "1.2.0",
        "--repository",
        &url,
    ];

    let output = edist()
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let reply: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(reply["status"], "result");
    assert_eq!(reply["license"], "MIT");
    assert!(reply.get("component-groups").is_none());

    // Second query is answered from the cache; expect(1) fails on a refetch.
    edist()
        .args(args)
        .assert()
        .success()
        .stdout(predicates::str::contains("MIT"));
    descriptor.assert();
}

#[test]
fn test_package_query_not_found_reply() {
    let mut server = Server::new();
    let url = server.url();
    let _missing = server
        .mock("GET", "/libraries/Standard/Ghost/1.0.0/package.json")
        .with_status(404)
        .create();

    let root = tempdir().unwrap();
    let output = edist()
        .args([
            "--root",
            root.path().to_str().unwrap(),
            "package",
            "Standard.Ghost",
            "--version",
            "1.0.0",
            "--repository",
            &url,
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let reply: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["kind"], "not-found");
}
