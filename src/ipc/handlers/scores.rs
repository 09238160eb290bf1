use crate::ipc::error::bad_params;
use crate::ipc::helpers::{self, optional_str, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssessmentType, Score};
use crate::store::Filter;

const LIST_LIMIT: usize = 500;

fn handle_scores_list(state: &AppState, req: &Request) -> HandlerResult {
    let mut filter = Filter::new();
    if let Some(student_id) = optional_str(req, "studentId")? {
        filter = filter.eq("student_id", student_id);
    }
    if let Some(subject_id) = optional_str(req, "subjectId")? {
        filter = filter.eq("subject_id", subject_id);
    }
    if let Some(raw) = optional_str(req, "type")? {
        let Some(kind) = AssessmentType::parse(&raw) else {
            return Err(bad_params(
                &req.id,
                "type must be one of: tugas, kuis, uts, uas",
            ));
        };
        filter = filter.eq("type", kind);
    }
    helpers::list_records::<Score>(state, req, &filter, LIST_LIMIT)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "scores.create" => helpers::create_record::<Score>(state, req),
        "scores.list" => handle_scores_list(state, req),
        "scores.get" => helpers::get_record::<Score>(state, req),
        "scores.update" => helpers::update_record::<Score>(state, req),
        "scores.delete" => helpers::delete_record::<Score>(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
