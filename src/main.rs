mod calc;
mod config;
mod db;
mod ipc;
mod model;
mod store;

use anyhow::Context;
use std::io::{self, BufRead, Write};

fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;
    config.init_tracing()?;

    let mut state = ipc::AppState::new(config.missing_policy);
    if let Some(path) = config.workspace.as_ref() {
        state
            .open_workspace(path)
            .with_context(|| format!("open workspace {}", path.display()))?;
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        policy = config.missing_policy.as_str(),
        "raportd ready"
    );

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
                // No id to reply to.
                tracing::warn!(error = %e, "dropping malformed request");
                let _ = writeln!(
                    stdout,
                    "{}",
                    ipc::err("", "bad_json", e.to_string(), None)
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let method = req.method.clone();
        let resp = ipc::handle_request(&mut state, req);
        if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
            tracing::debug!(method = %method, response = %resp, "request failed");
        }
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    Ok(())
}
