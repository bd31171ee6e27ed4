use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_sisd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn sisd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn list_names(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    kind: &str,
) -> Vec<String> {
    let result = request_ok(
        stdin,
        reader,
        id,
        "attributes.list",
        json!({ "kind": kind }),
    );
    result
        .get("items")
        .and_then(|v| v.as_array())
        .expect("items")
        .iter()
        .filter_map(|e| e.get("name").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
        .collect()
}

fn open_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    workspace
}

#[test]
fn create_rejects_duplicate_names() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "sisd-attr-dup");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attributes.create",
        json!({ "kind": "faculty", "name": "Economics" }),
    );
    assert!(created.get("id").and_then(|v| v.as_str()).is_some());

    let dup = request(
        &mut stdin,
        &mut reader,
        "2",
        "attributes.create",
        json!({ "kind": "faculty", "name": "Economics" }),
    );
    assert_eq!(error_code(&dup), "conflict");

    // Seeded names collide too.
    let seeded = request(
        &mut stdin,
        &mut reader,
        "3",
        "attributes.create",
        json!({ "kind": "faculty", "name": "Law" }),
    );
    assert_eq!(error_code(&seeded), "conflict");
}

#[test]
fn status_create_requires_order() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "sisd-attr-ord");

    let missing = request(
        &mut stdin,
        &mut reader,
        "1",
        "attributes.create",
        json!({ "kind": "status", "name": "Suspended" }),
    );
    assert_eq!(error_code(&missing), "bad_params");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attributes.create",
        json!({ "kind": "status", "name": "Suspended", "order": 5 }),
    );
    assert_eq!(created.get("order").and_then(|v| v.as_i64()), Some(5));
}

#[test]
fn rename_moves_name_and_noops_on_existing_target() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "sisd-attr-rename");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attributes.rename",
        json!({ "kind": "faculty", "oldName": "Law", "newName": "Civil Law" }),
    );
    let names = list_names(&mut stdin, &mut reader, "2", "faculty");
    assert!(names.contains(&"Civil Law".to_string()));
    assert!(!names.contains(&"Law".to_string()));

    // Renaming onto itself must not throw and must not change anything.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attributes.rename",
        json!({ "kind": "faculty", "oldName": "Civil Law", "newName": "Civil Law" }),
    );
    let names = list_names(&mut stdin, &mut reader, "4", "faculty");
    assert_eq!(
        names.iter().filter(|n| n.as_str() == "Civil Law").count(),
        1
    );

    // Renaming onto another existing entity is a silent no-op, not a merge.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attributes.rename",
        json!({ "kind": "faculty", "oldName": "Civil Law", "newName": "Japanese" }),
    );
    let names = list_names(&mut stdin, &mut reader, "6", "faculty");
    assert!(names.contains(&"Civil Law".to_string()));
    assert_eq!(names.iter().filter(|n| n.as_str() == "Japanese").count(), 1);

    let missing = request(
        &mut stdin,
        &mut reader,
        "7",
        "attributes.rename",
        json!({ "kind": "faculty", "oldName": "Astrology", "newName": "Astronomy" }),
    );
    assert_eq!(error_code(&missing), "not_found");
}

#[test]
fn status_order_update_rejects_unchanged_order() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "sisd-attr-statord");

    let unchanged = request(
        &mut stdin,
        &mut reader,
        "1",
        "attributes.updateStatusOrder",
        json!({ "name": "Active", "order": 2 }),
    );
    assert_eq!(error_code(&unchanged), "conflict");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attributes.updateStatusOrder",
        json!({ "name": "Active", "order": 6 }),
    );
    let statuses = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attributes.list",
        json!({ "kind": "status" }),
    );
    let last = statuses
        .get("items")
        .and_then(|v| v.as_array())
        .and_then(|a| a.last())
        .cloned()
        .expect("statuses");
    assert_eq!(last.get("name").and_then(|v| v.as_str()), Some("Active"));
    assert_eq!(last.get("order").and_then(|v| v.as_i64()), Some(6));

    let missing = request(
        &mut stdin,
        &mut reader,
        "4",
        "attributes.updateStatusOrder",
        json!({ "name": "Enrolled", "order": 9 }),
    );
    assert_eq!(error_code(&missing), "not_found");
}
