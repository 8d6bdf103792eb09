use crate::entry::{AnswerRecord, QuestionType};
use crate::store::{answer_from_row, ANSWER_COLUMNS};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("answers.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            programme TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            name TEXT NOT NULL,
            question_type INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_assessment ON questions(assessment_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            student_no TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS operators(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            operator_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            access INTEGER NOT NULL,
            PRIMARY KEY(operator_id, assessment_id),
            FOREIGN KEY(operator_id) REFERENCES operators(id),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS answers(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            answer_grade TEXT,
            answer_score TEXT,
            status INTEGER,
            double_entry INTEGER NOT NULL DEFAULT 0,
            user1 TEXT NOT NULL,
            user2 TEXT,
            last_modified_by TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(question_id) REFERENCES questions(id),
            UNIQUE(student_id, question_id)
        )",
        [],
    )?;
    // Workspaces created before timestamps were tracked lack updated_at.
    ensure_answers_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_answers_question ON answers(question_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_answers_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "answers", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE answers ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRow {
    pub id: String,
    pub name: String,
    pub programme: Option<String>,
    pub question_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRow {
    pub id: String,
    pub assessment_id: String,
    pub name: String,
    pub question_type: QuestionType,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub name: String,
    pub student_no: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorRow {
    pub id: String,
    pub username: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRow {
    pub operator_id: String,
    pub assessment_id: String,
    pub access: bool,
}

pub fn create_assessment(conn: &Connection, name: &str, programme: Option<&str>) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO assessments(id, name, programme) VALUES(?, ?, ?)",
        (&id, name, programme),
    )?;
    Ok(id)
}

pub fn list_assessments(conn: &Connection) -> anyhow::Result<Vec<AssessmentRow>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.name, a.programme,
                (SELECT COUNT(*) FROM questions q WHERE q.assessment_id = a.id)
         FROM assessments a
         ORDER BY a.name, a.id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(AssessmentRow {
                id: r.get(0)?,
                name: r.get(1)?,
                programme: r.get(2)?,
                question_count: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Appends a question to the end of the assessment's question order.
pub fn create_question(
    conn: &Connection,
    assessment_id: &str,
    name: &str,
    question_type: QuestionType,
) -> anyhow::Result<String> {
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM questions WHERE assessment_id = ?",
        [assessment_id],
        |r| r.get(0),
    )?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO questions(id, assessment_id, name, question_type, sort_order)
         VALUES(?, ?, ?, ?, ?)",
        (&id, assessment_id, name, question_type.code(), sort_order),
    )?;
    Ok(id)
}

pub fn list_questions(conn: &Connection, assessment_id: &str) -> anyhow::Result<Vec<QuestionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, assessment_id, name, question_type, sort_order
         FROM questions WHERE assessment_id = ? ORDER BY sort_order",
    )?;
    let raw = stmt
        .query_map([assessment_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, i64>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(raw.len());
    for (id, assessment_id, name, code, sort_order) in raw {
        let Some(question_type) = QuestionType::from_code(code) else {
            anyhow::bail!("question {} has unknown type code {}", id, code);
        };
        out.push(QuestionRow {
            id,
            assessment_id,
            name,
            question_type,
            sort_order,
        });
    }
    Ok(out)
}

pub fn create_student(conn: &Connection, name: &str, student_no: Option<&str>) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, name, student_no) VALUES(?, ?, ?)",
        (&id, name, student_no),
    )?;
    Ok(id)
}

pub fn list_students(conn: &Connection) -> anyhow::Result<Vec<StudentRow>> {
    let mut stmt =
        conn.prepare("SELECT id, name, student_no FROM students ORDER BY name, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                name: r.get(1)?,
                student_no: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn operator_id_by_username(conn: &Connection, username: &str) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM operators WHERE username = ?",
            [username],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn create_operator(conn: &Connection, username: &str) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO operators(id, username, active) VALUES(?, ?, 1)",
        (&id, username),
    )?;
    Ok(id)
}

/// Active operators only, ordered by username.
pub fn list_operators(conn: &Connection) -> anyhow::Result<Vec<OperatorRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, active FROM operators WHERE active = 1 ORDER BY username",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(OperatorRow {
                id: r.get(0)?,
                username: r.get(1)?,
                active: r.get::<_, i64>(2)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns false when no such operator exists.
pub fn deactivate_operator(conn: &Connection, operator_id: &str) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE operators SET active = 0 WHERE id = ?",
        [operator_id],
    )?;
    Ok(changed > 0)
}

pub fn set_assignment(
    conn: &Connection,
    operator_id: &str,
    assessment_id: &str,
    access: bool,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO assignments(operator_id, assessment_id, access) VALUES(?, ?, ?)
         ON CONFLICT(operator_id, assessment_id) DO UPDATE SET access = excluded.access",
        (operator_id, assessment_id, if access { 1 } else { 0 }),
    )?;
    Ok(())
}

/// Revokes an existing assignment; returns false if there was none.
pub fn revoke_assignment(conn: &Connection, operator_id: &str, assessment_id: &str) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE assignments SET access = 0 WHERE operator_id = ? AND assessment_id = ?",
        (operator_id, assessment_id),
    )?;
    Ok(changed > 0)
}

pub fn list_assignments(conn: &Connection, operator_id: Option<&str>) -> anyhow::Result<Vec<AssignmentRow>> {
    let mut stmt = conn.prepare(
        "SELECT operator_id, assessment_id, access FROM assignments
         WHERE (?1 IS NULL OR operator_id = ?1)
         ORDER BY operator_id, assessment_id",
    )?;
    let rows = stmt
        .query_map([operator_id], |r| {
            Ok(AssignmentRow {
                operator_id: r.get(0)?,
                assessment_id: r.get(1)?,
                access: r.get::<_, i64>(2)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Stored answers for an assessment, in question order, optionally for one
/// student.
pub fn list_answers(
    conn: &Connection,
    assessment_id: &str,
    student_id: Option<&str>,
) -> anyhow::Result<Vec<AnswerRecord>> {
    let cols = ANSWER_COLUMNS
        .split(", ")
        .map(|c| format!("a.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM answers a
         JOIN questions q ON q.id = a.question_id
         WHERE q.assessment_id = ?1 AND (?2 IS NULL OR a.student_id = ?2)
         ORDER BY a.student_id, q.sort_order",
        cols
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((assessment_id, student_id), answer_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
