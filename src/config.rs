use crate::db;
use crate::policy::{AssignedPolicy, EntryPolicy, OpenPolicy};
use clap::Parser;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

pub const POLICY_SETTING_KEY: &str = "entry.policy";
pub const DEFAULT_LOG_FILTER: &str = "answerd=info";

/// Double-entry answer sidecar. Reads JSON requests on stdin, one per line.
#[derive(Debug, Parser)]
#[command(name = "answerd", version)]
pub struct Args {
    /// Workspace directory to open at startup.
    #[arg(long, env = "ANSWERD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// tracing filter directive for stderr logging.
    #[arg(long, env = "ANSWERD_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyMode {
    #[default]
    Open,
    Assigned,
}

impl PolicyMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Some(PolicyMode::Open),
            "assigned" => Some(PolicyMode::Assigned),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyMode::Open => "open",
            PolicyMode::Assigned => "assigned",
        }
    }

    pub fn policy<'c>(self, conn: &'c Connection) -> Box<dyn EntryPolicy + 'c> {
        match self {
            PolicyMode::Open => Box::new(OpenPolicy),
            PolicyMode::Assigned => Box::new(AssignedPolicy::new(conn)),
        }
    }
}

/// Unset or unreadable settings fall back to the open policy.
pub fn load_policy_mode(conn: &Connection) -> anyhow::Result<PolicyMode> {
    let Some(v) = db::settings_get_json(conn, POLICY_SETTING_KEY)? else {
        return Ok(PolicyMode::default());
    };
    Ok(v
        .get("mode")
        .and_then(|m| m.as_str())
        .and_then(PolicyMode::parse)
        .unwrap_or_default())
}

pub fn store_policy_mode(conn: &Connection, mode: PolicyMode) -> anyhow::Result<()> {
    db::settings_set_json(conn, POLICY_SETTING_KEY, &json!({ "mode": mode.as_str() }))
}
