use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::{Matcher, Server};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

const API: &str = "/suite/deployment-management/v2";

/// Write a real zip archive big enough to pass local package validation.
fn create_test_package(path: &Path) {
    use zip::CompressionMethod;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    let file = std::fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options: FileOptions<()> =
        FileOptions::default().compression_method(CompressionMethod::Stored);

    zip.start_file("application.xml", options).unwrap();
    zip.write_all("<application/>\n".repeat(128).as_bytes()).unwrap();
    zip.finish().unwrap();
}

fn deployctl(url: &str) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("deployctl"));
    cmd.env_remove("DEPLOY_API_ROOT")
        .arg("--base-url")
        .arg(url)
        .arg("--api-key")
        .arg("test-key");
    cmd
}

#[test]
fn test_end_to_end_export() {
    let mut server = Server::new();
    let url = server.url();

    let submit = server
        .mock("POST", format!("{}/deployments", API).as_str())
        .match_header("appian-api-key", "test-key")
        .match_header("action-type", "export")
        .match_body(Matcher::Regex(r#""exportType":"application""#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"uuid": "J1"}"#)
        .create();

    let status = server
        .mock("GET", format!("{}/deployments/J1", API).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"status": "COMPLETED", "packageZip": "{}/dl/J1/package-zip"}}"#,
            url
        ))
        .create();

    let source_dir = tempdir().unwrap();
    let source = source_dir.path().join("source.zip");
    create_test_package(&source);
    let package_bytes = std::fs::read(&source).unwrap();

    let download = server
        .mock("GET", "/dl/J1/package-zip")
        .match_header("accept", "application/zip")
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body(&package_bytes)
        .create();

    let out_dir = tempdir().unwrap();

    deployctl(&url)
        .arg("export")
        .arg("--kind")
        .arg("app")
        .arg("--id")
        .arg("_a-0001")
        .arg("--name")
        .arg("Sales")
        .arg("--output-dir")
        .arg(out_dir.path())
        .arg("--poll-interval")
        .arg("1")
        .assert()
        .success()
        .stdout(predicates::str::contains(r#""job_id": "J1""#))
        .stdout(predicates::str::contains("application-_a-0001-Sales.zip"))
        .stderr(predicates::str::contains("export.status=COMPLETED id=J1"));

    submit.assert();
    status.assert();
    download.assert();

    let written = std::fs::read(out_dir.path().join("application-_a-0001-Sales.zip")).unwrap();
    assert_eq!(written, package_bytes);
}

#[test]
fn test_inspect_with_errors_fails() {
    let mut server = Server::new();
    let url = server.url();

    let _submit = server
        .mock("POST", format!("{}/inspections", API).as_str())
        .match_header(
            "content-type",
            Matcher::Regex("multipart/form-data; boundary=.*".to_string()),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"uuid": "I1"}"#)
        .create();

    let _status = server
        .mock("GET", format!("{}/inspections/I1", API).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "status": "COMPLETED",
                "summary": {
                    "problems": {
                        "totalErrors": 1,
                        "totalWarnings": 0,
                        "errors": [
                            {"objectName": "Sales Rule", "objectUuid": "u-1", "errorMessage": "missing precedent"}
                        ]
                    }
                }
            }"#,
        )
        .create();

    let dir = tempdir().unwrap();
    let package = dir.path().join("app.zip");
    create_test_package(&package);

    deployctl(&url)
        .arg("inspect")
        .arg("--package")
        .arg(&package)
        .arg("--poll-interval")
        .arg("1")
        .assert()
        .failure()
        .stdout(predicates::str::is_empty())
        .stderr(predicates::str::contains("Sales Rule (u-1): missing precedent"));
}

#[test]
fn test_import_rejects_invalid_package_before_submitting() {
    let mut server = Server::new();
    let url = server.url();

    let submit = server
        .mock("POST", format!("{}/deployments", API).as_str())
        .expect(0)
        .create();

    let dir = tempdir().unwrap();
    let package = dir.path().join("broken.zip");
    std::fs::write(&package, b"<html>not a package</html>").unwrap();

    deployctl(&url)
        .arg("import")
        .arg("--package")
        .arg(&package)
        .assert()
        .failure()
        .stderr(predicates::str::contains("not a valid package archive"));

    submit.assert();
}

#[test]
fn test_missing_base_url_fails() {
    Command::new(cargo::cargo_bin!("deployctl"))
        .env_remove("DEPLOY_BASE_URL")
        .arg("inspect")
        .arg("--package")
        .arg("app.zip")
        .assert()
        .failure()
        .stderr(predicates::str::contains("No base URL given"));
}
