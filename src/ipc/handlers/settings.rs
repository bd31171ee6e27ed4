use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let settings = match db::settings_load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match serde_json::to_value(&settings) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let email_suffix = req.params.get("emailSuffix").and_then(|v| v.as_str());
    let phone_prefix = req.params.get("phonePrefix").and_then(|v| v.as_str());
    if email_suffix.is_none() && phone_prefix.is_none() {
        return err(
            &req.id,
            "bad_params",
            "provide emailSuffix and/or phonePrefix",
            None,
        );
    }

    if let Some(v) = email_suffix {
        if let Err(e) = db::settings_set(conn, "email_suffix", v.trim()) {
            log::error!("settings.update email_suffix: {}", e);
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        log::info!("settings.update email_suffix='{}'", v.trim());
    }
    if let Some(v) = phone_prefix {
        if let Err(e) = db::settings_set(conn, "phone_prefix", v.trim()) {
            log::error!("settings.update phone_prefix: {}", e);
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        log::info!("settings.update phone_prefix='{}'", v.trim());
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_get(state, req)),
        "settings.update" => Some(handle_update(state, req)),
        _ => None,
    }
}
