use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ipc::error::{bad_params, err, not_found, ok, store_err, validation_err};
use crate::ipc::types::{AppState, Request};
use crate::model::Record;
use crate::store::{Entity, Filter, RecordStore, SqliteStore};

pub type HandlerResult = Result<serde_json::Value, serde_json::Value>;

pub fn db_store<'a>(state: &'a AppState, req: &Request) -> Result<&'a SqliteStore, serde_json::Value> {
    state
        .store
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match optional_str(req, key)? {
        Some(v) => Ok(v),
        None => Err(bad_params(&req.id, format!("missing {}", key))),
    }
}

/// Absent, null and blank strings are all `None`.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(bad_params(&req.id, format!("{} must be a string", key)));
            };
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
    }
}

pub fn ok_keyed(req: &Request, key: &str, value: impl Serialize) -> HandlerResult {
    let value = serde_json::to_value(value)
        .map_err(|e| err(&req.id, "internal", e.to_string(), None))?;
    let mut out = serde_json::Map::new();
    out.insert(key.to_string(), value);
    Ok(ok(&req.id, serde_json::Value::Object(out)))
}

pub fn parse_entity<E>(req: &Request, raw: &serde_json::Value) -> Result<E, serde_json::Value>
where
    E: Entity + DeserializeOwned,
{
    let data: E = serde_json::from_value(raw.clone())
        .map_err(|e| bad_params(&req.id, format!("invalid {}: {}", E::KIND, e)))?;
    data.validate().map_err(|e| validation_err(&req.id, &e))
}

/// Shallow merge of `patch` over the current fields, re-validated as a whole.
pub fn apply_patch<E>(req: &Request, current: &E, patch: &serde_json::Value) -> Result<E, serde_json::Value>
where
    E: Entity + Serialize + DeserializeOwned,
{
    let Some(patch_obj) = patch.as_object() else {
        return Err(bad_params(&req.id, "patch must be an object"));
    };
    let mut merged = serde_json::to_value(current)
        .map_err(|e| err(&req.id, "internal", e.to_string(), None))?;
    if let Some(obj) = merged.as_object_mut() {
        for (k, v) in patch_obj {
            obj.insert(k.clone(), v.clone());
        }
    }
    parse_entity(req, &merged)
}

fn id_param<E: Entity>() -> String {
    format!("{}Id", E::KIND)
}

fn fetch<E: Entity>(store: &SqliteStore, req: &Request, id: &str) -> Result<Record<E>, serde_json::Value> {
    store
        .get_by_id::<E>(id)
        .map_err(|e| store_err(&req.id, &e))?
        .ok_or_else(|| not_found(&req.id, E::KIND, id))
}

pub fn create_record<E>(state: &AppState, req: &Request) -> HandlerResult
where
    E: Entity + Serialize + DeserializeOwned,
{
    let store = db_store(state, req)?;
    let data: E = parse_entity(req, &req.params)?;
    let id = store.create(&data).map_err(|e| store_err(&req.id, &e))?;
    let record = fetch::<E>(store, req, &id)?;
    ok_keyed(req, E::KIND, record)
}

pub fn list_records<E>(state: &AppState, req: &Request, filter: &Filter, limit: usize) -> HandlerResult
where
    E: Entity + Serialize,
{
    let Some(store) = state.store.as_ref() else {
        return ok_keyed(req, E::TABLE, Vec::<Record<E>>::new());
    };
    let records = store
        .find::<E>(filter, limit)
        .map_err(|e| store_err(&req.id, &e))?;
    ok_keyed(req, E::TABLE, records)
}

pub fn get_record<E>(state: &AppState, req: &Request) -> HandlerResult
where
    E: Entity + Serialize,
{
    let store = db_store(state, req)?;
    let id = required_str(req, &id_param::<E>())?;
    let record = fetch::<E>(store, req, &id)?;
    ok_keyed(req, E::KIND, record)
}

pub fn update_record<E>(state: &AppState, req: &Request) -> HandlerResult
where
    E: Entity + Serialize + DeserializeOwned,
{
    let store = db_store(state, req)?;
    let id = required_str(req, &id_param::<E>())?;
    let Some(patch) = req.params.get("patch") else {
        return Err(bad_params(&req.id, "missing patch"));
    };
    let current = fetch::<E>(store, req, &id)?;
    let next: E = apply_patch(req, &current.data, patch)?;
    let changed = store
        .update(&id, &next)
        .map_err(|e| store_err(&req.id, &e))?;
    if !changed {
        return Err(not_found(&req.id, E::KIND, &id));
    }
    let record = fetch::<E>(store, req, &id)?;
    ok_keyed(req, E::KIND, record)
}

pub fn delete_record<E: Entity>(state: &AppState, req: &Request) -> HandlerResult {
    let store = db_store(state, req)?;
    let id = required_str(req, &id_param::<E>())?;
    let deleted = store
        .delete::<E>(&id)
        .map_err(|e| store_err(&req.id, &e))?;
    if !deleted {
        return Err(not_found(&req.id, E::KIND, &id));
    }
    Ok(ok(&req.id, serde_json::json!({ "deleted": true, "id": id })))
}
