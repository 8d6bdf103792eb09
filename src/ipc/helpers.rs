use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn db(code: &'static str, e: anyhow::Error) -> Self {
        tracing::error!(code, error = %e, "database call failed");
        Self::new(code, format!("{e:#}"))
    }
}

pub fn require_db<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Trimmed, non-empty string param.
pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(HandlerErr::new("bad_params", format!("missing {}", key))),
    }
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .and_then(|s| if s.is_empty() { None } else { Some(s) })
}

pub fn required_str_list(req: &Request, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(arr) = req.params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", format!("missing {}[]", key)));
    };
    let mut out = Vec::with_capacity(arr.len());
    for (i, v) in arr.iter().enumerate() {
        match v.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => {
                if !out.iter().any(|seen| seen == s) {
                    out.push(s.to_string());
                }
            }
            _ => {
                return Err(HandlerErr::new(
                    "bad_params",
                    format!("{}[{}] must be a non-empty string", key, i),
                ))
            }
        }
    }
    if out.is_empty() {
        return Err(HandlerErr::new(
            "bad_params",
            format!("select at least one entry in {}", key),
        )
        .with_details(json!({ "param": key })));
    }
    Ok(out)
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}
