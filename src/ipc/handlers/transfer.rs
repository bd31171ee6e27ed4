use crate::ipc::error::{err, err_from, ok};
use crate::ipc::types::{AppState, Request};
use crate::transfer;
use serde_json::json;

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // A missing upload is the caller's mistake, reported with the transfer
    // taxonomy rather than as a malformed envelope.
    let Some(mime) = req.params.get("mimeType").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_input", "no file given", None);
    };
    let Some(content) = req.params.get("content").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_input", "no file given", None);
    };

    let rows = match transfer::parse_upload(mime, content) {
        Ok(v) => v,
        Err(e) => {
            log::error!("records.import: {}", e);
            return err_from(&req.id, e);
        }
    };
    let row_count = rows.len();

    match transfer::import_records(conn, rows) {
        Ok(inserted) => ok(&req.id, json!({ "inserted": inserted })),
        Err(e) => {
            log::error!("records.import ({} rows): {}", row_count, e);
            err_from(&req.id, e)
        }
    }
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let format = req
        .params
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("json");

    let records = match transfer::load_flat_records(conn) {
        Ok(v) => v,
        Err(e) => return err_from(&req.id, e),
    };

    let (payload, mime) = match format {
        "json" => match transfer::export_json(&records) {
            Ok(text) => (text, transfer::MIME_JSON),
            Err(e) => return err_from(&req.id, e),
        },
        "csv" => (transfer::export_csv(&records), transfer::MIME_CSV),
        other => {
            return err(
                &req.id,
                "bad_input",
                format!("unsupported export format '{}'", other),
                None,
            )
        }
    };

    log::info!("records.export format={} count={}", format, records.len());
    ok(
        &req.id,
        json!({
            "mimeType": mime,
            "count": records.len(),
            "content": payload
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.import" => Some(handle_import(state, req)),
        "records.export" => Some(handle_export(state, req)),
        _ => None,
    }
}
