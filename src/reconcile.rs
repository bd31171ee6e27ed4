//! Batch record reconciler: resolves human-readable reference names to
//! entity ids and applies field-level updates record by record.
//!
//! Identity problems (unknown record id, duplicate username) abort the whole
//! batch before anything is written; everything after that validation gate is
//! best effort, one outcome per item, in input order.

use crate::attrs;
use crate::error::SisError;
use crate::model::{AttrKind, Gender, Role};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub fullname: Option<String>,
    pub birthday: Option<String>,
    pub gender: Option<String>,
    pub class_year: Option<i64>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub faculty: Option<String>,
    pub program: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.fullname.is_none()
            && self.birthday.is_none()
            && self.gender.is_none()
            && self.class_year.is_none()
            && self.address.is_none()
            && self.phone.is_none()
            && self.faculty.is_none()
            && self.program.is_none()
            && self.status.is_none()
            && self.role.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileItem {
    pub id: String,
    pub updates: RecordPatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Updated,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ItemResult {
    pub id: String,
    pub username: String,
    pub outcome: Outcome,
}

pub fn reconcile_batch(
    conn: &Connection,
    items: &[ReconcileItem],
) -> Result<Vec<ItemResult>, SisError> {
    // Validation gate. Fails the whole call with nothing persisted, so a
    // bad id or username collision can never leave a half-applied batch.
    let mut current_usernames: HashMap<&str, String> = HashMap::new();
    let mut claimed: HashMap<&str, &str> = HashMap::new();

    for item in items {
        let username: Option<String> = conn
            .query_row(
                "SELECT username FROM records WHERE id = ?",
                [&item.id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(username) = username else {
            return Err(SisError::NotFound(format!(
                "record '{}' not found",
                item.id
            )));
        };
        current_usernames.insert(item.id.as_str(), username);

        if let Some(wanted) = item.updates.username.as_deref() {
            let holder: Option<String> = conn
                .query_row(
                    "SELECT id FROM records WHERE username = ? AND id <> ?",
                    (wanted, &item.id),
                    |r| r.get(0),
                )
                .optional()?;
            if holder.is_some() {
                return Err(SisError::Conflict(format!(
                    "username '{}' is already taken",
                    wanted
                )));
            }
            if let Some(other) = claimed.get(wanted) {
                if *other != item.id.as_str() {
                    return Err(SisError::Conflict(format!(
                        "username '{}' requested twice in one batch",
                        wanted
                    )));
                }
            }
            claimed.insert(wanted, item.id.as_str());
        }
    }

    // Apply loop. Per-item failures are recorded and do not stop the batch.
    let mut results: Vec<ItemResult> = Vec::with_capacity(items.len());
    let mut updated: usize = 0;

    for item in items {
        let username = item
            .updates
            .username
            .clone()
            .or_else(|| current_usernames.get(item.id.as_str()).cloned())
            .unwrap_or_default();

        match apply_item(conn, item) {
            Ok(()) => {
                updated += 1;
                results.push(ItemResult {
                    id: item.id.clone(),
                    username,
                    outcome: Outcome::Updated,
                });
            }
            Err(e) => {
                log::error!("reconcile item {}: {}", item.id, e);
                results.push(ItemResult {
                    id: item.id.clone(),
                    username,
                    outcome: Outcome::Error(e.message().to_string()),
                });
            }
        }
    }

    log::info!(
        "reconcile batch: {} updated, {} failed",
        updated,
        results.len() - updated
    );
    Ok(results)
}

/// Resolve a reference name for one item. Absent names surface as that
/// item's error instead of persisting a dangling reference.
fn resolve_ref(conn: &Connection, kind: AttrKind, name: &str) -> Result<String, SisError> {
    match attrs::find_by_name(conn, kind, name)? {
        Some(entity) => Ok(entity.id),
        None => Err(SisError::NotFound(format!(
            "unknown {} '{}'",
            kind.key(),
            name
        ))),
    }
}

fn apply_item(conn: &Connection, item: &ReconcileItem) -> Result<(), SisError> {
    let patch = &item.updates;
    let mut set_parts: Vec<String> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();

    if let Some(v) = &patch.username {
        set_parts.push("username = ?".into());
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.email {
        set_parts.push("email = ?".into());
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.fullname {
        set_parts.push("fullname = ?".into());
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.birthday {
        set_parts.push("birthday = ?".into());
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.gender {
        let Some(g) = Gender::parse(v) else {
            return Err(SisError::BadInput(format!("invalid gender '{}'", v)));
        };
        set_parts.push("gender = ?".into());
        binds.push(Value::Text(g.as_str().to_string()));
    }
    if let Some(v) = patch.class_year {
        set_parts.push("class_year = ?".into());
        binds.push(Value::Integer(v));
    }
    if let Some(v) = &patch.address {
        set_parts.push("address = ?".into());
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.phone {
        set_parts.push("phone = ?".into());
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.role {
        let Some(role) = Role::parse(v) else {
            return Err(SisError::BadInput(format!("invalid role '{}'", v)));
        };
        set_parts.push("role = ?".into());
        binds.push(Value::Text(role.as_str().to_string()));
    }
    if let Some(v) = &patch.faculty {
        set_parts.push("faculty_id = ?".into());
        binds.push(Value::Text(resolve_ref(conn, AttrKind::Faculty, v)?));
    }
    if let Some(v) = &patch.program {
        set_parts.push("program_id = ?".into());
        binds.push(Value::Text(resolve_ref(conn, AttrKind::Program, v)?));
    }
    if let Some(v) = &patch.status {
        // Deliberately no forward-transition check here: the ordering guard
        // is advisory and lives with the client (policy::is_forward_transition).
        set_parts.push("status_id = ?".into());
        binds.push(Value::Text(resolve_ref(conn, AttrKind::Status, v)?));
    }

    set_parts.push("updated_at = ?".into());
    binds.push(Value::Text(chrono::Utc::now().to_rfc3339()));
    binds.push(Value::Text(item.id.clone()));

    let sql = format!("UPDATE records SET {} WHERE id = ?", set_parts.join(", "));
    conn.execute(&sql, params_from_iter(binds))
        .map_err(|e| SisError::Internal(e.to_string()))?;
    Ok(())
}
