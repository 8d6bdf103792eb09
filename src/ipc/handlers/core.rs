use crate::config::{self, PolicyMode};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_db, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Opens (creating if needed) the workspace database and makes it current.
pub fn select_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    let mode = config::load_policy_mode(&conn)?;
    tracing::info!(workspace = %path.display(), policy = mode.as_str(), "workspace opened");
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    Ok(())
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let policy = state
        .db
        .as_ref()
        .and_then(|conn| match config::load_policy_mode(conn) {
            Ok(mode) => Some(mode),
            Err(e) => {
                tracing::warn!(error = %e, "policy setting unreadable");
                None
            }
        })
        .map(|m| m.as_str());
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "policy": policy,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match select_workspace(state, &path) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => {
            tracing::error!(workspace = %path.display(), error = %e, "workspace open failed");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

fn handle_policy_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mode = config::load_policy_mode(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "mode": mode.as_str() }))
}

fn handle_policy_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let raw = req.params.get("mode").and_then(|v| v.as_str()).unwrap_or("");
    let Some(mode) = PolicyMode::parse(raw) else {
        return Err(HandlerErr::new("bad_params", "mode must be one of: open, assigned")
            .with_details(json!({ "mode": raw })));
    };
    config::store_policy_mode(conn, mode).map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    tracing::info!(policy = mode.as_str(), "entry policy changed");
    Ok(json!({ "mode": mode.as_str() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => return Some(handle_health(state, req)),
        "workspace.select" => return Some(handle_workspace_select(state, req)),
        "policy.get" => handle_policy_get(state, req),
        "policy.set" => handle_policy_set(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
