use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::model::Subject;
use crate::store::Filter;

const LIST_LIMIT: usize = 200;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "subjects.create" => helpers::create_record::<Subject>(state, req),
        "subjects.list" => {
            helpers::list_records::<Subject>(state, req, &Filter::new(), LIST_LIMIT)
        }
        "subjects.get" => helpers::get_record::<Subject>(state, req),
        "subjects.update" => helpers::update_record::<Subject>(state, req),
        "subjects.delete" => helpers::delete_record::<Subject>(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
