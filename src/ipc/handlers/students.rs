use crate::ipc::helpers::{self, optional_str, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::store::Filter;

const LIST_LIMIT: usize = 200;

fn handle_students_list(state: &AppState, req: &Request) -> HandlerResult {
    let mut filter = Filter::new();
    if let Some(q) = optional_str(req, "q")? {
        filter = filter.contains_any(&["full_name", "student_number", "class_name"], &q);
    }
    helpers::list_records::<Student>(state, req, &filter, LIST_LIMIT)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "students.create" => helpers::create_record::<Student>(state, req),
        "students.list" => handle_students_list(state, req),
        "students.get" => helpers::get_record::<Student>(state, req),
        "students.update" => helpers::update_record::<Student>(state, req),
        "students.delete" => helpers::delete_record::<Student>(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
