mod config;
mod db;
mod entry;
mod ipc;
mod policy;
mod reconcile;
mod store;

use clap::Parser;
use serde_json::json;
use std::io::{self, BufRead, Write};

/// stdout carries the protocol, so logs go to stderr.
fn init_tracing(filter: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let (env_filter, rejected) = match EnvFilter::try_new(filter) {
        Ok(f) => (f, None),
        Err(e) => (EnvFilter::new(config::DEFAULT_LOG_FILTER), Some(e)),
    };
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))?;
    if let Some(e) = rejected {
        tracing::warn!(
            filter,
            fallback = config::DEFAULT_LOG_FILTER,
            error = %e,
            "invalid log filter"
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = config::Args::parse();
    init_tracing(&args.log_filter)?;

    let mut state = ipc::AppState::default();
    if let Some(path) = args.workspace.as_deref() {
        // A bad startup workspace is reported but does not stop the daemon;
        // the client can still select another one.
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            tracing::error!(workspace = %path.display(), error = %e, "startup workspace not opened");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "unparseable request line");
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("stdin closed, exiting");
    Ok(())
}
