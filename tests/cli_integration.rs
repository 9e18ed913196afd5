//! Purpose: End-to-end tests for the cardfile command line interface.
//! Exports: None (integration test module).
//! Role: Validate stdout JSON, stderr error envelopes, and exit codes.
//! Invariants: Client commands run against a loopback server with a temp store.
//! Invariants: stdout stays machine-readable even when assertions inspect it.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Child, Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use serde_json::Value;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

struct TestServer {
    child: Child,
    base_url: String,
}

impl TestServer {
    fn start(store_path: &std::path::Path) -> TestResult<Self> {
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut child = Command::new(env!("CARGO_BIN_EXE_cardfile"))
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .arg("--store")
                .arg(store_path)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => return Ok(Self { child, base_url }),
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn run(&self, args: &[&str]) -> TestResult<Output> {
        let output = Command::new(env!("CARGO_BIN_EXE_cardfile"))
            .arg("--url")
            .arg(&self.base_url)
            .args(args)
            .output()?;
        Ok(output)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(status) = child.try_wait()? {
            return Err(format!("server exited early: {status}").into());
        }
        if TcpStream::connect_timeout(&addr, Duration::from_millis(100)).is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err("server did not become reachable".into());
        }
        sleep(Duration::from_millis(20));
    }
}

fn stdout_json(output: &Output) -> TestResult<Value> {
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn stderr_error(output: &Output) -> TestResult<Value> {
    let value: Value = serde_json::from_slice(&output.stderr)?;
    value
        .get("error")
        .cloned()
        .ok_or_else(|| "missing error envelope".into())
}

#[test]
fn add_edit_list_remove_flow() -> TestResult<()> {
    let temp = tempfile::tempdir()?;
    let server = TestServer::start(&temp.path().join("items.json"))?;

    let output = server.run(&["add", "Pen", "--description", "Blue ink"])?;
    assert!(output.status.success(), "add failed: {output:?}");
    let created = stdout_json(&output)?;
    let id = created
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or("missing id")?
        .to_string();
    assert_eq!(created.get("name").and_then(|v| v.as_str()), Some("Pen"));
    assert_eq!(
        created.get("description").and_then(|v| v.as_str()),
        Some("Blue ink")
    );

    let output = server.run(&["edit", &id, "Pencil"])?;
    assert!(output.status.success(), "edit failed: {output:?}");
    let edited = stdout_json(&output)?;
    assert_eq!(edited.get("name").and_then(|v| v.as_str()), Some("Pencil"));
    assert!(edited.get("description").is_none());

    let output = server.run(&["list"])?;
    assert!(output.status.success(), "list failed: {output:?}");
    let listed = stdout_json(&output)?;
    let rows = listed.as_array().ok_or("expected array")?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name").and_then(|v| v.as_str()), Some("Pencil"));

    let output = server.run(&["remove", &id])?;
    assert!(output.status.success(), "remove failed: {output:?}");
    let removed = stdout_json(&output)?;
    assert_eq!(removed.get("ok").and_then(|v| v.as_bool()), Some(true));

    let output = server.run(&["list"])?;
    let listed = stdout_json(&output)?;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn list_filter_matches_names_case_insensitively() -> TestResult<()> {
    let temp = tempfile::tempdir()?;
    let server = TestServer::start(&temp.path().join("items.json"))?;

    server.run(&["add", "Blue Pen"])?;
    server.run(&["add", "Eraser", "--description", "pen-shaped"])?;

    let output = server.run(&["list", "--filter", "PEN"])?;
    assert!(output.status.success(), "list failed: {output:?}");
    let listed = stdout_json(&output)?;
    let names: Vec<_> = listed
        .as_array()
        .ok_or("expected array")?
        .iter()
        .filter_map(|row| row.get("name").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(names, vec!["Blue Pen"]);
    Ok(())
}

#[test]
fn empty_name_exits_with_validation_code() -> TestResult<()> {
    let temp = tempfile::tempdir()?;
    let server = TestServer::start(&temp.path().join("items.json"))?;

    let output = server.run(&["add", ""])?;
    assert_eq!(output.status.code(), Some(3));
    let error = stderr_error(&output)?;
    assert_eq!(
        error.get("kind").and_then(|v| v.as_str()),
        Some("Validation")
    );
    assert!(output.stdout.is_empty());
    Ok(())
}

#[test]
fn editing_a_missing_id_exits_with_not_found_code() -> TestResult<()> {
    let temp = tempfile::tempdir()?;
    let server = TestServer::start(&temp.path().join("items.json"))?;

    let output = server.run(&["edit", "0000000000000000deadbeef", "Pen"])?;
    assert_eq!(output.status.code(), Some(4));
    let error = stderr_error(&output)?;
    assert_eq!(error.get("kind").and_then(|v| v.as_str()), Some("NotFound"));
    assert_eq!(
        error.get("id").and_then(|v| v.as_str()),
        Some("0000000000000000deadbeef")
    );
    Ok(())
}

#[test]
fn remove_is_idempotent_at_the_cli() -> TestResult<()> {
    let temp = tempfile::tempdir()?;
    let server = TestServer::start(&temp.path().join("items.json"))?;

    let output = server.run(&["add", "Pen"])?;
    let id = stdout_json(&output)?
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or("missing id")?
        .to_string();

    assert!(server.run(&["remove", &id])?.status.success());
    assert!(server.run(&["remove", &id])?.status.success());
    Ok(())
}

#[test]
fn unreachable_server_exits_with_connectivity_code() -> TestResult<()> {
    let port = pick_port()?;
    let output = Command::new(env!("CARGO_BIN_EXE_cardfile"))
        .arg("--url")
        .arg(format!("http://127.0.0.1:{port}"))
        .arg("list")
        .output()?;
    assert_eq!(output.status.code(), Some(5));
    let error: Value = serde_json::from_slice(&output.stderr)?;
    assert_eq!(
        error
            .get("error")
            .and_then(|body| body.get("kind"))
            .and_then(|v| v.as_str()),
        Some("Connectivity")
    );
    Ok(())
}

#[test]
fn missing_arguments_exit_with_usage_code() -> TestResult<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_cardfile"))
        .arg("edit")
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}
