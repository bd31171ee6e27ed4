use crate::attrs;
use crate::db;
use crate::error::SisError;
use crate::ipc::error::{err, err_from, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttrKind, Gender, Role};
use crate::reconcile::{self, Outcome, ReconcileItem, RecordPatch};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const BULK_UPDATE_MAX_ITEMS: usize = 1000;

fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().to_string();
    let digest = Sha256::digest(format!("{}{}", salt, password).as_bytes());
    format!("sha256${}${:x}", salt, digest)
}

fn resolve_optional_ref(
    conn: &Connection,
    kind: AttrKind,
    name: Option<&str>,
) -> Result<Option<String>, SisError> {
    match name {
        None => Ok(None),
        Some(n) => match attrs::find_by_name(conn, kind, n)? {
            Some(entity) => Ok(Some(entity.id)),
            None => Err(SisError::NotFound(format!(
                "unknown {} '{}'",
                kind.key(),
                n
            ))),
        },
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT r.id, r.username, r.email, r.fullname, r.birthday, r.gender,
                r.class_year, r.address, r.phone,
                f.name, p.name, s.name, r.role
         FROM records r
         LEFT JOIN faculties f ON f.id = r.faculty_id
         LEFT JOIN programs p ON p.id = r.program_id
         LEFT JOIN statuses s ON s.id = r.status_id
         ORDER BY r.username",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "username": row.get::<_, String>(1)?,
                "email": row.get::<_, String>(2)?,
                "fullname": row.get::<_, Option<String>>(3)?,
                "birthday": row.get::<_, Option<String>>(4)?,
                "gender": row.get::<_, Option<String>>(5)?,
                "classYear": row.get::<_, Option<i64>>(6)?,
                "address": row.get::<_, Option<String>>(7)?,
                "phone": row.get::<_, Option<String>>(8)?,
                "faculty": row.get::<_, Option<String>>(9)?,
                "program": row.get::<_, Option<String>>(10)?,
                "status": row.get::<_, Option<String>>(11)?,
                "role": row.get::<_, String>(12)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(records) => ok(&req.id, json!({ "records": records })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let username = match req.params.get("username").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing username", None),
    };
    let email = match req.params.get("email").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing email", None),
    };
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing password", None),
    };

    let gender = match req.params.get("gender").and_then(|v| v.as_str()) {
        None => None,
        Some(s) => match Gender::parse(s) {
            Some(g) => Some(g),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "gender must be one of: male, female, other",
                    Some(json!({ "gender": s })),
                )
            }
        },
    };
    let role = match req.params.get("role").and_then(|v| v.as_str()) {
        None => Role::Student,
        Some(s) => match Role::parse(s) {
            Some(r) => r,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "role must be one of: STUDENT, TEACHER, ADMIN",
                    Some(json!({ "role": s })),
                )
            }
        },
    };

    // Validation settings: an empty suffix/prefix disables the check.
    let settings = match db::settings_load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !settings.email_suffix.is_empty() && !email.ends_with(&settings.email_suffix) {
        return err(
            &req.id,
            "bad_input",
            format!("email must end with '{}'", settings.email_suffix),
            None,
        );
    }
    let phone = req
        .params
        .get("phone")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if let Some(p) = &phone {
        if !settings.phone_prefix.is_empty()
            && !p.starts_with(&settings.phone_prefix)
            && !p.starts_with('0')
        {
            return err(
                &req.id,
                "bad_input",
                format!("phone must start with '{}' or 0", settings.phone_prefix),
                None,
            );
        }
    }

    let str_param = |key: &str| {
        req.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let faculty_id =
        match resolve_optional_ref(conn, AttrKind::Faculty, str_param("faculty").as_deref()) {
            Ok(v) => v,
            Err(e) => return err_from(&req.id, e),
        };
    let program_id =
        match resolve_optional_ref(conn, AttrKind::Program, str_param("program").as_deref()) {
            Ok(v) => v,
            Err(e) => return err_from(&req.id, e),
        };
    let status_id =
        match resolve_optional_ref(conn, AttrKind::Status, str_param("status").as_deref()) {
            Ok(v) => v,
            Err(e) => return err_from(&req.id, e),
        };

    let id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        "INSERT INTO records(
            id, username, email, fullname, birthday, gender, class_year,
            address, phone, faculty_id, program_id, status_id, role,
            password_hash, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            username,
            email,
            str_param("fullname"),
            str_param("birthday"),
            gender.map(|g| g.as_str()),
            req.params.get("classYear").and_then(|v| v.as_i64()),
            str_param("address"),
            phone,
            faculty_id,
            program_id,
            status_id,
            role.as_str(),
            hash_password(&password),
            chrono::Utc::now().to_rfc3339(),
        ],
    );

    match insert {
        Ok(_) => {
            log::info!("records.create '{}' role={}", username, role.as_str());
            ok(&req.id, json!({ "id": id, "username": username }))
        }
        Err(rusqlite::Error::SqliteFailure(f, msg))
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let message = msg.unwrap_or_else(|| "duplicate natural key".to_string());
            log::error!("records.create '{}': {}", username, message);
            err(&req.id, "conflict", message, None)
        }
        Err(e) => {
            log::error!("records.create '{}': {}", username, e);
            err(&req.id, "db_insert_failed", e.to_string(), None)
        }
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let record_id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing id", None),
    };
    let Some(updates_value) = req.params.get("updates") else {
        return err(&req.id, "bad_params", "missing updates", None);
    };
    let updates: RecordPatch = match serde_json::from_value(updates_value.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid updates: {}", e), None),
    };
    if updates.is_empty() {
        return err(&req.id, "bad_params", "updates must not be empty", None);
    }

    let item = ReconcileItem {
        id: record_id,
        updates,
    };
    match reconcile::reconcile_batch(conn, std::slice::from_ref(&item)) {
        Ok(results) => match &results[0].outcome {
            Outcome::Updated => ok(&req.id, json!({ "ok": true })),
            Outcome::Error(message) => err(&req.id, "update_failed", message.clone(), None),
        },
        Err(e) => err_from(&req.id, e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let record_id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing id", None),
    };

    let row: Option<(String, String)> = match conn
        .query_row(
            "SELECT username, role FROM records WHERE id = ?",
            [&record_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((username, role)) = row else {
        return err(&req.id, "not_found", "record not found", None);
    };
    if role == Role::Admin.as_str() {
        log::error!("records.delete '{}': admin records cannot be deleted", username);
        return err(
            &req.id,
            "forbidden",
            "admin records cannot be deleted",
            None,
        );
    }

    match conn.execute("DELETE FROM records WHERE id = ?", [&record_id]) {
        Ok(_) => {
            log::info!("records.delete '{}'", username);
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => {
            log::error!("records.delete '{}': {}", username, e);
            err(&req.id, "db_delete_failed", e.to_string(), None)
        }
    }
}

fn handle_bulk_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(items_arr) = req.params.get("items").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing items[]", None);
    };
    if items_arr.is_empty() {
        return err(&req.id, "bad_params", "items must not be empty", None);
    }
    if items_arr.len() > BULK_UPDATE_MAX_ITEMS {
        return err(
            &req.id,
            "bad_params",
            "bulk payload exceeds max items",
            Some(json!({
                "items": items_arr.len(),
                "maxItems": BULK_UPDATE_MAX_ITEMS
            })),
        );
    }

    let mut items: Vec<ReconcileItem> = Vec::with_capacity(items_arr.len());
    for (i, raw) in items_arr.iter().enumerate() {
        let Some(obj) = raw.as_object() else {
            return err(
                &req.id,
                "bad_params",
                format!("item at index {} must be an object", i),
                None,
            );
        };
        let Some(id) = obj.get("id").and_then(|v| v.as_str()) else {
            return err(
                &req.id,
                "bad_params",
                format!("item at index {} missing id", i),
                None,
            );
        };
        let Some(updates_value) = obj.get("updates") else {
            return err(
                &req.id,
                "bad_params",
                format!("item at index {} missing updates", i),
                None,
            );
        };
        let updates: RecordPatch = match serde_json::from_value(updates_value.clone()) {
            Ok(v) => v,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("item at index {} has invalid updates: {}", i, e),
                    None,
                )
            }
        };
        if updates.is_empty() {
            return err(
                &req.id,
                "bad_params",
                format!("item at index {} has empty updates", i),
                None,
            );
        }
        items.push(ReconcileItem {
            id: id.to_string(),
            updates,
        });
    }

    match reconcile::reconcile_batch(conn, &items) {
        Ok(results) => {
            let results: Vec<_> = results
                .iter()
                .map(|r| match &r.outcome {
                    Outcome::Updated => json!({
                        "id": r.id,
                        "username": r.username,
                        "status": "updated"
                    }),
                    Outcome::Error(message) => json!({
                        "id": r.id,
                        "username": r.username,
                        "status": "error",
                        "message": message
                    }),
                })
                .collect();
            ok(&req.id, json!({ "results": results }))
        }
        Err(e) => err_from(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.list" => Some(handle_list(state, req)),
        "records.create" => Some(handle_create(state, req)),
        "records.update" => Some(handle_update(state, req)),
        "records.delete" => Some(handle_delete(state, req)),
        "records.bulkUpdate" => Some(handle_bulk_update(state, req)),
        _ => None,
    }
}
