use crate::db;
use crate::entry::QuestionType;
use crate::ipc::helpers::{optional_str, require_db, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{Catalog, SqliteStore};
use serde_json::json;

fn handle_assessments_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = required_str(req, "name")?;
    let programme = optional_str(req, "programme");

    let assessment_id = db::create_assessment(conn, &name, programme.as_deref())
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    Ok(json!({ "assessmentId": assessment_id }))
}

fn handle_assessments_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessments = db::list_assessments(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "assessments": assessments }))
}

fn require_assessment(store: &SqliteStore<'_>, assessment_id: &str) -> Result<(), HandlerErr> {
    let exists = store
        .assessment_exists(assessment_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if !exists {
        return Err(HandlerErr::new("not_found", "assessment not found")
            .with_details(json!({ "assessmentId": assessment_id })));
    }
    Ok(())
}

fn handle_questions_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = required_str(req, "assessmentId")?;
    let name = required_str(req, "name")?;
    let question_type = req
        .params
        .get("questionType")
        .and_then(QuestionType::from_param)
        .ok_or_else(|| {
            HandlerErr::new("bad_params", "questionType must be one of: marks, grade")
                .with_details(json!({ "questionType": req.params.get("questionType") }))
        })?;

    require_assessment(&SqliteStore::new(conn), &assessment_id)?;

    let question_id = db::create_question(conn, &assessment_id, &name, question_type)
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    Ok(json!({ "questionId": question_id }))
}

fn handle_questions_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = required_str(req, "assessmentId")?;
    require_assessment(&SqliteStore::new(conn), &assessment_id)?;

    let questions =
        db::list_questions(conn, &assessment_id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "questions": questions }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = required_str(req, "name")?;
    let student_no = optional_str(req, "studentNo");

    let student_id = db::create_student(conn, &name, student_no.as_deref())
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    Ok(json!({ "studentId": student_id }))
}

fn handle_students_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let students = db::list_students(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assessments.create" => handle_assessments_create(state, req),
        "assessments.list" => handle_assessments_list(state, req),
        "questions.create" => handle_questions_create(state, req),
        "questions.list" => handle_questions_list(state, req),
        "students.create" => handle_students_create(state, req),
        "students.list" => handle_students_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
