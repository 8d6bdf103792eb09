use crate::entry::{self, AnswerRecord, EntryPhase};
use crate::policy::EntryPolicy;
use crate::store::{AnswerStore, Catalog, QuestionInfo};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("operator {0} is inactive")]
    InactiveOperator(String),

    #[error("operator {operator_id} may not enter answers for assessment {assessment_id}")]
    Forbidden {
        operator_id: String,
        assessment_id: String,
    },

    #[error("answer value must not be empty")]
    EmptyValue,

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("failed to save answer: {0:#}")]
    Write(anyhow::Error),
}

impl EntryError {
    pub fn code(&self) -> &'static str {
        match self {
            EntryError::NotFound { .. } => "not_found",
            EntryError::InactiveOperator(_) => "inactive_operator",
            EntryError::Forbidden { .. } => "forbidden",
            EntryError::EmptyValue => "bad_params",
            EntryError::Store(_) => "db_query_failed",
            EntryError::Write(_) => "db_insert_failed",
        }
    }

    fn not_found(kind: &'static str, id: &str) -> Self {
        EntryError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRejection {
    pub field: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetOutcome {
    pub saved: Vec<AnswerRecord>,
    pub skipped: usize,
    pub rejected: Vec<FieldRejection>,
}

/// Double-entry reconciler over an injected store and entry policy.
pub struct Reconciler<S, P> {
    store: S,
    policy: P,
}

impl<S, P> Reconciler<S, P>
where
    S: AnswerStore + Catalog,
    P: EntryPolicy,
{
    pub fn new(store: S, policy: P) -> Self {
        Self { store, policy }
    }

    #[cfg(test)]
    pub fn into_store(self) -> S {
        self.store
    }

    fn require_question(&self, question_id: &str) -> Result<QuestionInfo, EntryError> {
        self.store
            .question(question_id)?
            .ok_or_else(|| EntryError::not_found("question", question_id))
    }

    fn require_student(&self, student_id: &str) -> Result<(), EntryError> {
        if !self.store.student_exists(student_id)? {
            return Err(EntryError::not_found("student", student_id));
        }
        Ok(())
    }

    fn require_operator_for(&self, operator_id: &str, assessment_id: &str) -> Result<(), EntryError> {
        let Some(op) = self.store.operator(operator_id)? else {
            return Err(EntryError::not_found("operator", operator_id));
        };
        if !op.active {
            return Err(EntryError::InactiveOperator(op.id));
        }
        if !self.policy.may_enter(operator_id, assessment_id)? {
            return Err(EntryError::Forbidden {
                operator_id: operator_id.to_string(),
                assessment_id: assessment_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn submit(
        &mut self,
        student_id: &str,
        question_id: &str,
        raw_value: &str,
        operator_id: &str,
    ) -> Result<AnswerRecord, EntryError> {
        if raw_value.is_empty() {
            return Err(EntryError::EmptyValue);
        }
        self.require_student(student_id)?;
        let question = self.require_question(question_id)?;
        self.require_operator_for(operator_id, &question.assessment_id)?;
        self.write_answer(student_id, &question, raw_value, operator_id)
    }

    fn write_answer(
        &mut self,
        student_id: &str,
        question: &QuestionInfo,
        raw_value: &str,
        operator_id: &str,
    ) -> Result<AnswerRecord, EntryError> {
        let value = entry::normalize(raw_value, question.question_type);
        let existing = self.store.get(student_id, &question.id)?;
        let before = existing.as_ref().map(|r| r.entry_phase);

        let mut rec = entry::apply_submission(existing, student_id, &question.id, value, operator_id);
        rec.updated_at = Some(chrono::Utc::now().to_rfc3339());

        let saved = match before {
            None => self.store.create(&rec),
            Some(_) => self.store.update(&rec),
        };
        saved.map_err(EntryError::Write)?;

        match (before, rec.entry_phase) {
            (None, _) => tracing::info!(
                student = student_id,
                question = %question.id,
                operator = operator_id,
                "first entry recorded"
            ),
            (Some(EntryPhase::First), EntryPhase::Both) => tracing::info!(
                student = student_id,
                question = %question.id,
                operator = operator_id,
                "second entry recorded"
            ),
            _ => tracing::debug!(
                student = student_id,
                question = %question.id,
                operator = operator_id,
                phase = ?rec.entry_phase,
                "answer overwritten"
            ),
        }
        Ok(rec)
    }

    /// True when `candidate` agrees with what the first operator keyed, or
    /// when there is nothing left to reconcile. A pair with no stored answer
    /// is `NotFound`.
    pub fn validate(
        &self,
        student_id: &str,
        question_id: &str,
        candidate: &str,
    ) -> Result<bool, EntryError> {
        self.require_student(student_id)?;
        let question = self.require_question(question_id)?;
        let Some(rec) = self.store.get(student_id, question_id)? else {
            return Err(EntryError::not_found(
                "answer",
                &entry::field_id(student_id, question_id),
            ));
        };
        let valid = entry::candidate_matches(&rec, question.question_type, candidate);
        if !valid {
            tracing::debug!(
                student = student_id,
                question = question_id,
                "double entry mismatch"
            );
        }
        Ok(valid)
    }

    /// Saves one student's answer sheet. `fields` are keyed by entry-form
    /// field names; blank values are skipped. Fields that do not name a
    /// question of this assessment for this student are rejected without
    /// aborting the rest of the sheet.
    pub fn submit_sheet(
        &mut self,
        student_id: &str,
        assessment_id: &str,
        fields: &HashMap<String, String>,
        operator_id: &str,
    ) -> Result<SheetOutcome, EntryError> {
        self.require_student(student_id)?;
        if !self.store.assessment_exists(assessment_id)? {
            return Err(EntryError::not_found("assessment", assessment_id));
        }
        self.require_operator_for(operator_id, assessment_id)?;

        let questions = self.store.questions_for_assessment(assessment_id)?;
        let mut outcome = SheetOutcome::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(questions.len());

        for question in &questions {
            let field = entry::field_id(student_id, &question.id);
            let Some(raw) = fields.get(&field) else {
                outcome.skipped += 1;
                continue;
            };
            seen.insert(field);
            if raw.is_empty() {
                outcome.skipped += 1;
                continue;
            }
            let rec = self.write_answer(student_id, question, raw, operator_id)?;
            outcome.saved.push(rec);
        }

        let mut stray: Vec<&String> = fields
            .keys()
            .filter(|k| !seen.contains(k.as_str()))
            .collect();
        stray.sort();
        for field in stray {
            let message = match entry::parse_field_id(field) {
                Some((sid, _)) if sid != student_id => {
                    format!("field belongs to another student: {}", sid)
                }
                Some((_, qid)) => format!("question {} is not part of this assessment", qid),
                None => "field name must look like student_<studentId>_<questionId>".to_string(),
            };
            tracing::warn!(field = %field, "answer sheet field rejected");
            outcome.rejected.push(FieldRejection {
                field: field.clone(),
                code: if entry::parse_field_id(field).is_some() {
                    "not_found"
                } else {
                    "bad_params"
                },
                message,
            });
        }

        Ok(outcome)
    }
}
