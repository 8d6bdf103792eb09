use crate::entry::{AnswerRecord, AnswerStatus, EntryPhase, QuestionType};
use rusqlite::{Connection, OptionalExtension, Row};

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionInfo {
    pub id: String,
    pub assessment_id: String,
    pub question_type: QuestionType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorInfo {
    pub id: String,
    pub active: bool,
}

/// Read-only lookups the reconciler needs around a submission.
pub trait Catalog {
    fn question(&self, question_id: &str) -> anyhow::Result<Option<QuestionInfo>>;
    fn questions_for_assessment(&self, assessment_id: &str) -> anyhow::Result<Vec<QuestionInfo>>;
    fn assessment_exists(&self, assessment_id: &str) -> anyhow::Result<bool>;
    fn student_exists(&self, student_id: &str) -> anyhow::Result<bool>;
    fn operator(&self, operator_id: &str) -> anyhow::Result<Option<OperatorInfo>>;
}

/// Answer records keyed by (student, question).
pub trait AnswerStore {
    fn get(&self, student_id: &str, question_id: &str) -> anyhow::Result<Option<AnswerRecord>>;
    fn create(&mut self, record: &AnswerRecord) -> anyhow::Result<()>;
    fn update(&mut self, record: &AnswerRecord) -> anyhow::Result<()>;
}

/// Both traits over one workspace connection (or an open transaction, which
/// derefs to one).
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn question_info(raw: (String, String, i64)) -> anyhow::Result<QuestionInfo> {
    let (id, assessment_id, code) = raw;
    let question_type = QuestionType::from_code(code)
        .ok_or_else(|| anyhow::anyhow!("question {} has unknown type code {}", id, code))?;
    Ok(QuestionInfo {
        id,
        assessment_id,
        question_type,
    })
}

pub(crate) fn answer_from_row(row: &Row<'_>) -> rusqlite::Result<AnswerRecord> {
    let status: Option<i64> = row.get(4)?;
    let phase: i64 = row.get(5)?;
    let entry_phase =
        EntryPhase::from_code(phase).ok_or(rusqlite::Error::IntegralValueOutOfRange(5, phase))?;
    Ok(AnswerRecord {
        student_id: row.get(0)?,
        question_id: row.get(1)?,
        grade: row.get(2)?,
        score: row.get(3)?,
        status: AnswerStatus::from_code(status),
        entry_phase,
        first_entered_by: row.get(6)?,
        second_entered_by: row.get(7)?,
        last_modified_by: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub(crate) const ANSWER_COLUMNS: &str = "student_id, question_id, answer_grade, answer_score, status, \
     double_entry, user1, user2, last_modified_by, updated_at";

impl Catalog for SqliteStore<'_> {
    fn question(&self, question_id: &str) -> anyhow::Result<Option<QuestionInfo>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, assessment_id, question_type FROM questions WHERE id = ?",
                [question_id],
                question_from_row,
            )
            .optional()?;
        raw.map(question_info).transpose()
    }

    fn questions_for_assessment(&self, assessment_id: &str) -> anyhow::Result<Vec<QuestionInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, assessment_id, question_type FROM questions
             WHERE assessment_id = ? ORDER BY sort_order",
        )?;
        let rows = stmt
            .query_map([assessment_id], question_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(question_info).collect()
    }

    fn assessment_exists(&self, assessment_id: &str) -> anyhow::Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM assessments WHERE id = ?",
                [assessment_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn student_exists(&self, student_id: &str) -> anyhow::Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn operator(&self, operator_id: &str) -> anyhow::Result<Option<OperatorInfo>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, active FROM operators WHERE id = ?",
                [operator_id],
                |r| {
                    Ok(OperatorInfo {
                        id: r.get(0)?,
                        active: r.get::<_, i64>(1)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

impl AnswerStore for SqliteStore<'_> {
    fn get(&self, student_id: &str, question_id: &str) -> anyhow::Result<Option<AnswerRecord>> {
        let sql = format!(
            "SELECT {} FROM answers WHERE student_id = ? AND question_id = ?",
            ANSWER_COLUMNS
        );
        let rec = self
            .conn
            .query_row(&sql, (student_id, question_id), answer_from_row)
            .optional()?;
        Ok(rec)
    }

    fn create(&mut self, record: &AnswerRecord) -> anyhow::Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO answers(
               id, student_id, question_id, answer_grade, answer_score, status,
               double_entry, user1, user2, last_modified_by, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &record.student_id,
                &record.question_id,
                record.grade.as_deref(),
                record.score.as_deref(),
                record.status.code(),
                record.entry_phase.code(),
                &record.first_entered_by,
                record.second_entered_by.as_deref(),
                &record.last_modified_by,
                record.updated_at.as_deref(),
            ),
        )?;
        Ok(())
    }

    fn update(&mut self, record: &AnswerRecord) -> anyhow::Result<()> {
        let changed = self.conn.execute(
            "UPDATE answers SET
               answer_grade = ?,
               answer_score = ?,
               status = ?,
               double_entry = ?,
               user2 = ?,
               last_modified_by = ?,
               updated_at = ?
             WHERE student_id = ? AND question_id = ?",
            (
                record.grade.as_deref(),
                record.score.as_deref(),
                record.status.code(),
                record.entry_phase.code(),
                record.second_entered_by.as_deref(),
                &record.last_modified_by,
                record.updated_at.as_deref(),
                &record.student_id,
                &record.question_id,
            ),
        )?;
        if changed == 0 {
            anyhow::bail!(
                "no answer row for student {} question {}",
                record.student_id,
                record.question_id
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::entry::{apply_submission, EnteredValue};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn workspace(label: &str) -> Connection {
        let p = std::env::temp_dir().join(format!(
            "answerd-store-{}-{}",
            label,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        db::open_db(&p).expect("open db")
    }

    #[test]
    fn answers_keep_legacy_status_codes() {
        let conn = workspace("codes");
        let assessment = db::create_assessment(&conn, "A", None).expect("assessment");
        let question =
            db::create_question(&conn, &assessment, "Q", QuestionType::Marks).expect("question");
        let student = db::create_student(&conn, "S", None).expect("student");

        let mut store = SqliteStore::new(&conn);
        let rec = apply_submission(None, &student, &question, EnteredValue::Absent, "opA");
        store.create(&rec).expect("create");

        let status: Option<i64> = conn
            .query_row("SELECT status FROM answers", [], |r| r.get(0))
            .expect("status");
        assert_eq!(status, Some(-99999));

        let rec = apply_submission(Some(rec), &student, &question, EnteredValue::Score("8".into()), "opB");
        store.update(&rec).expect("update");

        let (status, phase, user2): (Option<i64>, i64, Option<String>) = conn
            .query_row("SELECT status, double_entry, user2 FROM answers", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .expect("row");
        assert_eq!(status, None);
        assert_eq!(phase, 2);
        assert_eq!(user2.as_deref(), Some("opB"));

        let back = store.get(&student, &question).expect("get").expect("present");
        assert_eq!(back, rec);
    }

    #[test]
    fn update_without_row_is_an_error() {
        let conn = workspace("update");
        let mut store = SqliteStore::new(&conn);
        let rec = apply_submission(None, "s", "q", EnteredValue::Unknown, "opA");
        assert!(store.update(&rec).is_err());
    }

    #[test]
    fn unknown_phase_code_fails_to_load() {
        let conn = workspace("phase");
        let assessment = db::create_assessment(&conn, "A", None).expect("assessment");
        let question =
            db::create_question(&conn, &assessment, "Q", QuestionType::Marks).expect("question");
        let student = db::create_student(&conn, "S", None).expect("student");

        let mut store = SqliteStore::new(&conn);
        let rec = apply_submission(None, &student, &question, EnteredValue::Score("3".into()), "opA");
        store.create(&rec).expect("create");
        conn.execute("UPDATE answers SET double_entry = 7", [])
            .expect("corrupt phase");

        assert!(store.get(&student, &question).is_err());
    }

    #[test]
    fn students_list_by_name_with_roll_numbers() {
        let conn = workspace("students");
        let zara = db::create_student(&conn, "Zara", None).expect("zara");
        let asha = db::create_student(&conn, "Asha", Some("R-07")).expect("asha");

        let rows = db::list_students(&conn).expect("list");
        let ids: Vec<&str> = rows.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![asha.as_str(), zara.as_str()]);

        let first = serde_json::to_value(&rows[0]).expect("json");
        assert_eq!(first["studentNo"], "R-07");
        assert!(first.get("active").is_none());
        assert!(SqliteStore::new(&conn).student_exists(&zara).expect("exists"));
    }

    #[test]
    fn questions_come_back_in_entry_order() {
        let conn = workspace("order");
        let assessment = db::create_assessment(&conn, "A", Some("P")).expect("assessment");
        let q1 = db::create_question(&conn, &assessment, "Q1", QuestionType::Grade).expect("q1");
        let q2 = db::create_question(&conn, &assessment, "Q2", QuestionType::Marks).expect("q2");

        let store = SqliteStore::new(&conn);
        let qs = store.questions_for_assessment(&assessment).expect("questions");
        let ids: Vec<&str> = qs.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec![q1.as_str(), q2.as_str()]);
        assert_eq!(qs[0].question_type, QuestionType::Grade);
        assert!(store.assessment_exists(&assessment).expect("exists"));
        assert!(store.question("nope").expect("lookup").is_none());
    }
}
