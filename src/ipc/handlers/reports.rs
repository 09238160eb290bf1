use crate::calc::{self, MissingPolicy};
use crate::ipc::error::{bad_params, calc_err, ok};
use crate::ipc::helpers::{db_store, optional_str, required_str, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn parse_policy(state: &AppState, req: &Request) -> Result<MissingPolicy, serde_json::Value> {
    match optional_str(req, "policy")? {
        None => Ok(state.policy),
        Some(raw) => MissingPolicy::parse(&raw).ok_or_else(|| {
            bad_params(&req.id, "policy must be one of: zero_fill, renormalize")
        }),
    }
}

fn handle_report_generate(state: &AppState, req: &Request) -> HandlerResult {
    let store = db_store(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let subject_id = required_str(req, "subjectId")?;
    let policy = parse_policy(state, req)?;

    let report = calc::generate_report(store, &student_id, &subject_id, policy)
        .map_err(|e| calc_err(&req.id, &e))?;
    Ok(ok(&req.id, json!(report)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "report.generate" => Some(handle_report_generate(state, req).unwrap_or_else(|e| e)),
        _ => None,
    }
}
