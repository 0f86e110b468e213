use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_paste"))
}

/// A `paste` invocation isolated from the caller's environment and config.
fn paste(store: &Path) -> Command {
    let mut cmd = Command::new(bin());
    cmd.env_clear()
        .env("PASTE_STORAGE_PATH", store)
        .arg("--config")
        .arg(store.join("missing-config.toml"));
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("paste should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn create_json(store: &Path, extra: &[&str], body: &str) -> serde_json::Value {
    let output = run(paste(store).args(["--json", "create", "--body", body]).args(extra));
    assert!(output.status.success(), "create failed: {}", stderr(&output));
    serde_json::from_str(&stdout(&output)).expect("create should print JSON")
}

#[test]
fn create_get_delete_flow() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let created = create_json(dir.path(), &[], "hello world");
    let key = created["key"].as_str().expect("key should be a string").to_string();
    let secret = created["secret"].as_str().expect("secret should be a string").to_string();
    assert_eq!(key.chars().count(), 10);

    let output = run(paste(dir.path()).args(["get", &key]));
    assert!(output.status.success(), "get failed: {}", stderr(&output));
    assert_eq!(stdout(&output), "hello world\n");

    let output = run(paste(dir.path()).args(["delete", &key, "wrong-secret"]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("You entered the wrong secret or the document does not exist"));

    let output = run(paste(dir.path()).args(["delete", &key, &secret]));
    assert!(output.status.success(), "delete failed: {}", stderr(&output));

    let output = run(paste(dir.path()).args(["get", &key]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No document found"));

    // A second delete looks exactly like a wrong secret.
    let output = run(paste(dir.path()).args(["delete", &key, &secret]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("You entered the wrong secret or the document does not exist"));
}

#[test]
fn create_reads_body_from_stdin() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut child = paste(dir.path())
        .args(["--quiet", "create"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("paste should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(b"line one\nline two\n")
        .expect("stdin write should succeed");
    let output = child.wait_with_output().expect("paste should finish");
    assert!(output.status.success(), "create failed: {}", stderr(&output));

    let printed = stdout(&output);
    let key = printed.lines().next().expect("quiet create prints the key first");

    let output = run(paste(dir.path()).args(["get", key]));
    assert_eq!(stdout(&output), "line one\nline two\n");
}

#[test]
fn static_documents_and_trusted_remove() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let created = create_json(dir.path(), &["--static", "--key", "about"], "pinned text");
    assert_eq!(created["key"], "about");

    let output = run(paste(dir.path()).args(["create", "--static", "--key", "about", "--body", "again"]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("already exists"));

    let output = run(paste(dir.path()).args(["--json", "get", "about"]));
    let document: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("get should print JSON");
    assert_eq!(document["text"], "pinned text");

    let output = run(paste(dir.path()).args(["remove", "about"]));
    assert!(output.status.success(), "remove failed: {}", stderr(&output));
    let output = run(paste(dir.path()).args(["remove", "about"]));
    assert!(!output.status.success());
}

#[test]
fn rejects_empty_and_oversized_text() {
    let dir = tempfile::tempdir().expect("tempdir should be created");

    let output = run(paste(dir.path()).args(["create", "--body", ""]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("You have to enter the text of the paste"));

    let output = run(paste(dir.path())
        .env("PASTE_DOCUMENT_MAX_LENGTH", "5")
        .args(["create", "--body", "too long"]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Text too long (max. 5)"));
}

#[test]
fn sqlite_backend_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let created = create_json(dir.path(), &["--storage", "sqlite"], "relational text");
    let key = created["key"].as_str().expect("key should be a string");

    assert!(dir.path().join("pasteServer.sqlite3").exists());
    let output = run(paste(dir.path()).args(["--storage", "sqlite", "get", key]));
    assert_eq!(stdout(&output), "relational text\n");

    // The file backend does not see documents in the database.
    let output = run(paste(dir.path()).args(["get", key]));
    assert!(!output.status.success());
}

#[test]
fn encrypted_documents_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let output = run(paste(dir.path()).arg("keygen"));
    let key_hex = stdout(&output).trim().to_string();
    assert_eq!(key_hex.len(), 64);
    assert!(key_hex.chars().all(|c| c.is_ascii_hexdigit()));

    let output = run(paste(dir.path())
        .env("PASTE_ENCRYPTION", "true")
        .env("PASTE_ENCRYPTION_KEY", &key_hex)
        .args(["--json", "create", "--body", "classified"]));
    assert!(output.status.success(), "create failed: {}", stderr(&output));
    let created: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("create should print JSON");
    let key = created["key"].as_str().expect("key should be a string");

    let mut documents = 0;
    for entry in std::fs::read_dir(dir.path()).expect("store should exist") {
        let path = entry.expect("entry should be readable").path();
        let contents = std::fs::read_to_string(&path).expect("document should be readable");
        assert!(!contents.contains("classified"));
        documents += 1;
    }
    assert_eq!(documents, 1);

    // Reading back works with encryption switched off: the stored flag decides.
    let output = run(paste(dir.path())
        .env("PASTE_ENCRYPTION_KEY", &key_hex)
        .args(["get", key]));
    assert_eq!(stdout(&output), "classified\n");
}

#[test]
fn prepare_and_sweep_report_json() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = dir.path().join("nested").join("store");

    let output = run(paste(&store).args(["--json", "prepare"]));
    assert!(output.status.success(), "prepare failed: {}", stderr(&output));
    let report: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("prepare should print JSON");
    assert_eq!(report["storage"], "file");
    assert!(store.is_dir());

    let output = run(paste(&store).args(["--json", "sweep"]));
    assert!(output.status.success(), "sweep failed: {}", stderr(&output));
    let report: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("sweep should print JSON");
    assert_eq!(report["removed"], 0);
}

#[test]
fn unknown_storage_kind_fails() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let output = run(paste(dir.path()).args(["--storage", "postgres", "prepare"]));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unsupported storage kind"));
}
