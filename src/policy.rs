use rusqlite::{Connection, OptionalExtension};

/// Decides whether an operator may key answers for an assessment.
pub trait EntryPolicy {
    fn may_enter(&self, operator_id: &str, assessment_id: &str) -> anyhow::Result<bool>;
}

impl<P: EntryPolicy + ?Sized> EntryPolicy for Box<P> {
    fn may_enter(&self, operator_id: &str, assessment_id: &str) -> anyhow::Result<bool> {
        (**self).may_enter(operator_id, assessment_id)
    }
}

/// Any active operator may enter any assessment.
pub struct OpenPolicy;

impl EntryPolicy for OpenPolicy {
    fn may_enter(&self, _operator_id: &str, _assessment_id: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Only operators holding a live assignment for the assessment.
pub struct AssignedPolicy<'c> {
    conn: &'c Connection,
}

impl<'c> AssignedPolicy<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl EntryPolicy for AssignedPolicy<'_> {
    fn may_enter(&self, operator_id: &str, assessment_id: &str) -> anyhow::Result<bool> {
        let access: Option<i64> = self
            .conn
            .query_row(
                "SELECT access FROM assignments WHERE operator_id = ? AND assessment_id = ?",
                (operator_id, assessment_id),
                |r| r.get(0),
            )
            .optional()?;
        Ok(access.unwrap_or(0) != 0)
    }
}
