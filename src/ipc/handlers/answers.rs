use crate::config;
use crate::db;
use crate::entry;
use crate::ipc::helpers::{optional_str, require_db, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{EntryError, Reconciler};
use crate::store::{AnswerStore, Catalog, SqliteStore};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::json;
use std::collections::HashMap;

impl From<EntryError> for HandlerErr {
    fn from(e: EntryError) -> Self {
        let code = e.code();
        let message = e.to_string();
        match e {
            EntryError::Store(inner) => HandlerErr::db("db_query_failed", inner),
            EntryError::Write(inner) => HandlerErr::db("db_insert_failed", inner),
            EntryError::NotFound { kind, id } => {
                HandlerErr::new(code, message).with_details(json!({ "kind": kind, "id": id }))
            }
            _ => {
                tracing::warn!(code, error = %message, "answer entry rejected");
                HandlerErr::new(code, message)
            }
        }
    }
}

/// Entered values arrive as strings from the form, but bare JSON numbers are
/// accepted too.
fn value_param(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(HandlerErr::new("bad_params", format!("missing {}", key))),
    }
}

fn begin_entry(state: &mut AppState) -> Result<Transaction<'_>, HandlerErr> {
    let Some(conn) = state.db.as_mut() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| HandlerErr::db("db_query_failed", e.into()))
}

fn reconciler(
    conn: &Connection,
) -> Result<Reconciler<SqliteStore<'_>, Box<dyn crate::policy::EntryPolicy + '_>>, HandlerErr> {
    let mode = config::load_policy_mode(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(Reconciler::new(SqliteStore::new(conn), mode.policy(conn)))
}

fn handle_answers_submit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let question_id = required_str(req, "questionId")?;
    let operator_id = required_str(req, "operatorId")?;
    let value = value_param(req, "value")?;

    let tx = begin_entry(state)?;
    let answer = {
        let mut r = reconciler(&tx)?;
        r.submit(&student_id, &question_id, &value, &operator_id)?
    };
    tx.commit()
        .map_err(|e| HandlerErr::db("db_insert_failed", e.into()))?;

    Ok(json!({ "answer": answer }))
}

fn handle_answers_submit_sheet(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let assessment_id = required_str(req, "assessmentId")?;
    let operator_id = required_str(req, "operatorId")?;
    let Some(raw_fields) = req.params.get("fields").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new("bad_params", "missing fields{}"));
    };

    let mut fields: HashMap<String, String> = HashMap::with_capacity(raw_fields.len());
    for (k, v) in raw_fields {
        let value = match v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Null => String::new(),
            _ => {
                return Err(HandlerErr::new("bad_params", "field values must be strings")
                    .with_details(json!({ "field": k })))
            }
        };
        fields.insert(k.clone(), value);
    }

    let tx = begin_entry(state)?;
    let outcome = {
        let mut r = reconciler(&tx)?;
        r.submit_sheet(&student_id, &assessment_id, &fields, &operator_id)?
    };
    tx.commit()
        .map_err(|e| HandlerErr::db("db_insert_failed", e.into()))?;

    let mut result = json!({
        "saved": outcome.saved.len(),
        "skipped": outcome.skipped,
        "answers": outcome.saved,
    });
    if !outcome.rejected.is_empty() {
        result["rejected"] = json!(outcome.rejected.len());
        result["errors"] = json!(outcome.rejected);
    }
    Ok(result)
}

/// Either explicit `studentId`/`questionId` or the entry-form `field` name.
fn answer_key(req: &Request) -> Result<(String, String), HandlerErr> {
    if let Some(field) = optional_str(req, "field") {
        let Some((sid, qid)) = entry::parse_field_id(&field) else {
            return Err(HandlerErr::new(
                "bad_params",
                "field must look like student_<studentId>_<questionId>",
            )
            .with_details(json!({ "field": field })));
        };
        return Ok((sid.to_string(), qid.to_string()));
    }
    Ok((required_str(req, "studentId")?, required_str(req, "questionId")?))
}

fn handle_answers_validate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let (student_id, question_id) = answer_key(req)?;
    let candidate = match req.params.get("value") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(_) => value_param(req, "value")?,
    };

    let valid = reconciler(conn)?.validate(&student_id, &question_id, &candidate)?;
    Ok(json!({ "valid": valid }))
}

fn handle_answers_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let (student_id, question_id) = answer_key(req)?;

    let store = SqliteStore::new(conn);
    let question = store
        .question(&question_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let student = store
        .student_exists(&student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if question.is_none() || !student {
        return Err(HandlerErr::new("not_found", "student or question not found").with_details(
            json!({ "studentId": student_id, "questionId": question_id }),
        ));
    }

    let answer = store
        .get(&student_id, &question_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "answer": answer }))
}

fn handle_answers_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = required_str(req, "assessmentId")?;
    let student_id = optional_str(req, "studentId");

    let exists = SqliteStore::new(conn)
        .assessment_exists(&assessment_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if !exists {
        return Err(HandlerErr::new("not_found", "assessment not found")
            .with_details(json!({ "assessmentId": assessment_id })));
    }

    let answers = db::list_answers(conn, &assessment_id, student_id.as_deref())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "answers": answers }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "answers.submit" => handle_answers_submit(state, req),
        "answers.submitSheet" => handle_answers_submit_sheet(state, req),
        "answers.validate" => handle_answers_validate(state, req),
        "answers.get" => handle_answers_get(state, req),
        "answers.list" => handle_answers_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
