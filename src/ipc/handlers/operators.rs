use crate::db;
use crate::ipc::helpers::{optional_str, require_db, required_str, required_str_list, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{Catalog, SqliteStore};
use rusqlite::TransactionBehavior;
use serde_json::json;

fn handle_operators_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let username = required_str(req, "username")?;

    let existing =
        db::operator_id_by_username(conn, &username).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if let Some(id) = existing {
        return Err(HandlerErr::new("bad_params", "username already taken")
            .with_details(json!({ "username": username, "operatorId": id })));
    }

    let operator_id =
        db::create_operator(conn, &username).map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    tracing::info!(operator = %operator_id, username = %username, "operator created");
    Ok(json!({ "operatorId": operator_id }))
}

fn handle_operators_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let operators = db::list_operators(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "operators": operators }))
}

fn handle_operators_deactivate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let operator_id = required_str(req, "operatorId")?;

    let found = db::deactivate_operator(conn, &operator_id)
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    if !found {
        return Err(HandlerErr::new("not_found", "operator not found")
            .with_details(json!({ "operatorId": operator_id })));
    }
    tracing::info!(operator = %operator_id, "operator deactivated");
    Ok(json!({ "ok": true }))
}

/// Grants every listed operator access to every listed assessment. All ids
/// are checked before anything is written.
fn handle_assignments_assign(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let operator_ids = required_str_list(req, "operatorIds")?;
    let assessment_ids = required_str_list(req, "assessmentIds")?;
    let Some(conn) = state.db.as_mut() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| HandlerErr::db("db_query_failed", e.into()))?;
    {
        let store = SqliteStore::new(&tx);
        for id in &operator_ids {
            let op = store.operator(id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
            if op.is_none() {
                return Err(HandlerErr::new("not_found", "operator not found")
                    .with_details(json!({ "operatorId": id })));
            }
        }
        for id in &assessment_ids {
            let exists = store
                .assessment_exists(id)
                .map_err(|e| HandlerErr::db("db_query_failed", e))?;
            if !exists {
                return Err(HandlerErr::new("not_found", "assessment not found")
                    .with_details(json!({ "assessmentId": id })));
            }
        }
    }

    let mut assigned = 0usize;
    for operator_id in &operator_ids {
        for assessment_id in &assessment_ids {
            db::set_assignment(&tx, operator_id, assessment_id, true)
                .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
            assigned += 1;
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::db("db_insert_failed", e.into()))?;

    tracing::info!(
        operators = operator_ids.len(),
        assessments = assessment_ids.len(),
        "assessment access granted"
    );
    Ok(json!({
        "assigned": assigned,
        "operators": operator_ids.len(),
        "assessments": assessment_ids.len(),
    }))
}

fn handle_assignments_revoke(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let operator_id = required_str(req, "operatorId")?;
    let assessment_ids = required_str_list(req, "assessmentIds")?;

    let mut revoked = 0usize;
    let mut missing: Vec<String> = Vec::new();
    for assessment_id in assessment_ids {
        let found = db::revoke_assignment(conn, &operator_id, &assessment_id)
            .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
        if found {
            revoked += 1;
        } else {
            missing.push(assessment_id);
        }
    }
    tracing::info!(operator = %operator_id, revoked, "assessment access revoked");

    let mut result = json!({ "revoked": revoked });
    if !missing.is_empty() {
        result["notAssigned"] = json!(missing);
    }
    Ok(result)
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let operator_id = optional_str(req, "operatorId");
    let assignments = db::list_assignments(conn, operator_id.as_deref())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "assignments": assignments }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "operators.create" => handle_operators_create(state, req),
        "operators.list" => handle_operators_list(state, req),
        "operators.deactivate" => handle_operators_deactivate(state, req),
        "assignments.assign" => handle_assignments_assign(state, req),
        "assignments.revoke" => handle_assignments_revoke(state, req),
        "assignments.list" => handle_assignments_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
