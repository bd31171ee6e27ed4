use crate::attrs;
use crate::ipc::error::{err, err_from, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttrEntity, AttrKind};
use crate::policy;
use serde_json::json;

fn entity_json(e: &AttrEntity) -> serde_json::Value {
    match e.ord {
        Some(ord) => json!({ "id": e.id, "name": e.name, "order": ord }),
        None => json!({ "id": e.id, "name": e.name }),
    }
}

fn parse_kind(req: &Request) -> Result<AttrKind, serde_json::Value> {
    match req.params.get("kind").and_then(|v| v.as_str()) {
        Some(s) => AttrKind::parse(s).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "kind must be one of: faculty, program, status",
                Some(json!({ "kind": s })),
            )
        }),
        None => Err(err(&req.id, "bad_params", "missing kind", None)),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let kind = match parse_kind(req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    match attrs::list_all(conn, kind) {
        Ok(entities) => {
            let items: Vec<_> = entities.iter().map(entity_json).collect();
            ok(&req.id, json!({ "items": items }))
        }
        Err(e) => err_from(&req.id, e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let kind = match parse_kind(req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let order = req.params.get("order").and_then(|v| v.as_i64());
    if kind == AttrKind::Status && order.is_none() {
        return err(&req.id, "bad_params", "status requires order", None);
    }

    match attrs::create(conn, kind, &name, order) {
        Ok(entity) => ok(&req.id, entity_json(&entity)),
        Err(e) => err_from(&req.id, e),
    }
}

fn handle_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let kind = match parse_kind(req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let old_name = match req.params.get("oldName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing oldName", None),
    };
    let new_name = match req.params.get("newName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing newName", None),
    };

    match attrs::rename(conn, kind, &old_name, &new_name) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err_from(&req.id, e),
    }
}

fn handle_update_status_order(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let order = match req.params.get("order").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid order", None),
    };

    match attrs::update_status_order(conn, &name, order) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err_from(&req.id, e),
    }
}

// Advisory check the client runs before submitting a status change; the
// reconciler does not repeat it server-side.
fn handle_can_transition(req: &Request) -> serde_json::Value {
    let current = match req.params.get("currentOrder").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid currentOrder", None),
    };
    let candidate = match req.params.get("candidateOrder").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid candidateOrder", None),
    };

    ok(
        &req.id,
        json!({ "allowed": policy::is_forward_transition(current, candidate) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attributes.list" => Some(handle_list(state, req)),
        "attributes.create" => Some(handle_create(state, req)),
        "attributes.rename" => Some(handle_rename(state, req)),
        "attributes.updateStatusOrder" => Some(handle_update_status_order(state, req)),
        "status.canTransition" => Some(handle_can_transition(req)),
        _ => None,
    }
}
