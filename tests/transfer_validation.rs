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

fn record_count(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
) -> usize {
    let listed = request_ok(stdin, reader, id, "records.list", json!({}));
    listed
        .get("records")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0)
}

#[test]
fn missing_upload_and_unknown_mime_are_bad_input() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "sisd-tv-mime");

    let no_file = request(&mut stdin, &mut reader, "1", "records.import", json!({}));
    assert_eq!(error_code(&no_file), "bad_input");

    let no_content = request(
        &mut stdin,
        &mut reader,
        "2",
        "records.import",
        json!({ "mimeType": "application/json" }),
    );
    assert_eq!(error_code(&no_content), "bad_input");

    let bad_mime = request(
        &mut stdin,
        &mut reader,
        "3",
        "records.import",
        json!({
            "mimeType": "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "content": "username,email\na,b\n"
        }),
    );
    assert_eq!(error_code(&bad_mime), "bad_input");

    let empty = request(
        &mut stdin,
        &mut reader,
        "4",
        "records.import",
        json!({ "mimeType": "text/csv", "content": "  \n" }),
    );
    assert_eq!(error_code(&empty), "bad_input");
}

#[test]
fn unknown_reference_name_fails_the_whole_import() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "sisd-tv-ref");

    let csv = "username,email,faculty\n\
               sv001,sv001@student.example.edu,Law\n\
               sv002,sv002@student.example.edu,Alchemy\n";
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "records.import",
        json!({ "mimeType": "text/csv", "content": csv }),
    );
    assert_eq!(error_code(&resp), "not_found");

    // Resolution happens before the insert stage: the valid first row must
    // not have been inserted.
    assert_eq!(record_count(&mut stdin, &mut reader, "2"), 0);
}

#[test]
fn duplicate_natural_key_fails_the_whole_import() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "sisd-tv-dup");

    let csv = "username,email\n\
               sv001,sv001@student.example.edu\n\
               sv001,other@student.example.edu\n";
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "records.import",
        json!({ "mimeType": "text/csv", "content": csv }),
    );
    assert_eq!(error_code(&resp), "conflict");

    // The insert runs inside one transaction; a mid-insert failure rolls
    // everything back.
    assert_eq!(record_count(&mut stdin, &mut reader, "2"), 0);
}

#[test]
fn rows_missing_required_columns_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "sisd-tv-cols");

    let no_username_col = request(
        &mut stdin,
        &mut reader,
        "1",
        "records.import",
        json!({ "mimeType": "text/csv", "content": "email\nx@student.example.edu\n" }),
    );
    assert_eq!(error_code(&no_username_col), "bad_input");

    let blank_email = request(
        &mut stdin,
        &mut reader,
        "2",
        "records.import",
        json!({ "mimeType": "text/csv", "content": "username,email\nsv001,\n" }),
    );
    assert_eq!(error_code(&blank_email), "bad_input");

    let bad_year = request(
        &mut stdin,
        &mut reader,
        "3",
        "records.import",
        json!({
            "mimeType": "text/csv",
            "content": "username,email,classYear\nsv001,sv001@student.example.edu,soon\n"
        }),
    );
    assert_eq!(error_code(&bad_year), "bad_input");
}

#[test]
fn export_rejects_unknown_formats() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "sisd-tv-format");

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "records.export",
        json!({ "format": "xlsx" }),
    );
    assert_eq!(error_code(&resp), "bad_input");
}
