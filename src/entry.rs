use serde::{Deserialize, Serialize};

/// Status code stored for an "ab" (absent) entry.
pub const STATUS_ABSENT: i64 = -99999;
/// Status code stored for a "uk" (unknown) entry.
pub const STATUS_UNKNOWN: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Marks,
    Grade,
}

impl QuestionType {
    pub fn code(self) -> i64 {
        match self {
            QuestionType::Marks => 1,
            QuestionType::Grade => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(QuestionType::Marks),
            2 => Some(QuestionType::Grade),
            _ => None,
        }
    }

    /// Accepts `"marks"`/`"grade"` (any case) or the numeric codes 1/2.
    pub fn from_param(v: &serde_json::Value) -> Option<Self> {
        if let Some(code) = v.as_i64() {
            return Self::from_code(code);
        }
        match v.as_str()?.trim().to_ascii_lowercase().as_str() {
            "marks" | "1" => Some(QuestionType::Marks),
            "grade" | "2" => Some(QuestionType::Grade),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Normal,
    Absent,
    Unknown,
}

impl AnswerStatus {
    /// Legacy column value. Normal answers carry no status code.
    pub fn code(self) -> Option<i64> {
        match self {
            AnswerStatus::Normal => None,
            AnswerStatus::Absent => Some(STATUS_ABSENT),
            AnswerStatus::Unknown => Some(STATUS_UNKNOWN),
        }
    }

    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(STATUS_ABSENT) => AnswerStatus::Absent,
            Some(STATUS_UNKNOWN) => AnswerStatus::Unknown,
            _ => AnswerStatus::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPhase {
    None,
    First,
    Both,
}

impl EntryPhase {
    pub fn code(self) -> i64 {
        match self {
            EntryPhase::None => 0,
            EntryPhase::First => 1,
            EntryPhase::Both => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(EntryPhase::None),
            1 => Some(EntryPhase::First),
            2 => Some(EntryPhase::Both),
            _ => None,
        }
    }
}

/// What an operator's keystrokes mean once sentinels and the question type
/// are applied.
#[derive(Debug, Clone, PartialEq)]
pub enum EnteredValue {
    Absent,
    Unknown,
    Grade(String),
    /// Raw text as typed; may not parse as a number.
    Score(String),
}

pub fn normalize(raw: &str, question_type: QuestionType) -> EnteredValue {
    if raw.eq_ignore_ascii_case("ab") {
        return EnteredValue::Absent;
    }
    if raw.eq_ignore_ascii_case("uk") {
        return EnteredValue::Unknown;
    }
    match question_type {
        QuestionType::Grade => EnteredValue::Grade(raw.to_string()),
        QuestionType::Marks => EnteredValue::Score(raw.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub student_id: String,
    pub question_id: String,
    pub grade: Option<String>,
    pub score: Option<String>,
    pub status: AnswerStatus,
    pub entry_phase: EntryPhase,
    pub first_entered_by: String,
    pub second_entered_by: Option<String>,
    pub last_modified_by: String,
    pub updated_at: Option<String>,
}

impl AnswerRecord {
    /// Stored score as a number, if it parses.
    pub fn score_value(&self) -> Option<f64> {
        self.score.as_deref().and_then(parse_number)
    }

    fn store_value(&mut self, value: EnteredValue) {
        // Only one of grade/score/status is ever authoritative.
        self.grade = None;
        self.score = None;
        self.status = AnswerStatus::Normal;
        match value {
            EnteredValue::Absent => self.status = AnswerStatus::Absent,
            EnteredValue::Unknown => self.status = AnswerStatus::Unknown,
            EnteredValue::Grade(g) => self.grade = Some(g),
            EnteredValue::Score(s) => self.score = Some(s),
        }
    }
}

/// Applies one submission to the current record (if any) and returns the
/// record to persist.
///
/// `NONE -> FIRST` on create, `FIRST -> FIRST` when the first operator
/// corrects their own entry, anything else lands in `BOTH` with the
/// submitting operator recorded as the second entrant.
pub fn apply_submission(
    existing: Option<AnswerRecord>,
    student_id: &str,
    question_id: &str,
    value: EnteredValue,
    operator_id: &str,
) -> AnswerRecord {
    let mut rec = match existing {
        None => {
            let mut rec = AnswerRecord {
                student_id: student_id.to_string(),
                question_id: question_id.to_string(),
                grade: None,
                score: None,
                status: AnswerStatus::Normal,
                entry_phase: EntryPhase::First,
                first_entered_by: operator_id.to_string(),
                second_entered_by: None,
                last_modified_by: operator_id.to_string(),
                updated_at: None,
            };
            rec.store_value(value);
            return rec;
        }
        Some(rec) => rec,
    };

    rec.store_value(value);
    if rec.entry_phase == EntryPhase::First && rec.first_entered_by == operator_id {
        rec.last_modified_by = operator_id.to_string();
    } else {
        rec.entry_phase = EntryPhase::Both;
        rec.second_entered_by = Some(operator_id.to_string());
        rec.last_modified_by = operator_id.to_string();
    }
    rec
}

/// Double-entry check of a candidate keying against a stored record.
///
/// Records with no entry yet, or with both entries already made, always pass.
/// Only a record waiting for its second entry is compared.
pub fn candidate_matches(rec: &AnswerRecord, question_type: QuestionType, candidate: &str) -> bool {
    match rec.entry_phase {
        EntryPhase::None | EntryPhase::Both => return true,
        EntryPhase::First => {}
    }
    if candidate.is_empty() {
        return false;
    }

    if candidate.eq_ignore_ascii_case("ab") {
        return rec.status == AnswerStatus::Absent;
    }
    if candidate.eq_ignore_ascii_case("uk") {
        return rec.status == AnswerStatus::Unknown;
    }

    match question_type {
        QuestionType::Grade => {
            let Some(grade) = rec.grade.as_deref() else {
                return false;
            };
            if grade.to_lowercase() == candidate.to_lowercase() {
                return true;
            }
            numbers_equal(grade, candidate)
        }
        QuestionType::Marks => match (rec.score_value(), parse_number(candidate)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn numbers_equal(stored: &str, candidate: &str) -> bool {
    match (parse_number(stored), parse_number(candidate)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Splits an entry-form field name `student_<studentId>_<questionId>`.
pub fn parse_field_id(field: &str) -> Option<(&str, &str)> {
    let rest = field.strip_prefix("student_")?;
    let (student_id, question_id) = rest.split_once('_')?;
    if student_id.is_empty() || question_id.is_empty() || question_id.contains('_') {
        return None;
    }
    Some((student_id, question_id))
}

pub fn field_id(student_id: &str, question_id: &str) -> String {
    format!("student_{}_{}", student_id, question_id)
}
