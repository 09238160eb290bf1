use crate::ipc::error::{bad_params, store_err};
use crate::ipc::helpers::{self, db_store, optional_str, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Weight;
use crate::store::{Filter, RecordStore};

const LIST_LIMIT: usize = 200;

fn handle_weights_set(state: &AppState, req: &Request) -> HandlerResult {
    let store = db_store(state, req)?;
    let data: Weight = helpers::parse_entity(req, &req.params)?;
    let record = store
        .upsert_weight(&data)
        .map_err(|e| store_err(&req.id, &e))?;
    helpers::ok_keyed(req, "weight", record)
}

fn handle_weights_list(state: &AppState, req: &Request) -> HandlerResult {
    let mut filter = Filter::new();
    if let Some(subject_id) = optional_str(req, "subjectId")? {
        filter = filter.eq("subject_id", subject_id);
    }
    // An explicit null or blank className selects subject-wide weights only.
    match req.params.get("className") {
        None => {}
        Some(v) if v.is_null() => filter = filter.is_null("class_name"),
        Some(v) => match v.as_str().map(str::trim) {
            Some("") => filter = filter.is_null("class_name"),
            Some(class_name) => filter = filter.eq("class_name", class_name.to_string()),
            None => return Err(bad_params(&req.id, "className must be a string or null")),
        },
    }
    helpers::list_records::<Weight>(state, req, &filter, LIST_LIMIT)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "weights.set" => handle_weights_set(state, req),
        "weights.list" => handle_weights_list(state, req),
        "weights.get" => helpers::get_record::<Weight>(state, req),
        "weights.delete" => helpers::delete_record::<Weight>(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
