//! Shape detection for FlavorDB entity payloads.
//!
//! The API answers with the entity mapping itself, with the mapping nested
//! one level under a wrapper key, or with a one-element list around either.
//! When it is unhealthy it can also return an HTML page with a success status.

use serde_json::{Map, Value};

pub const ENTITY_ID_KEY: &str = "entity_id";
pub const MOLECULES_KEY: &str = "molecules";

/// Wrapper keys probed in order when the top-level mapping is not an entity.
pub const WRAPPER_KEYS: &[&str] = &["data", "entity", "result"];

/// Keys tried in order for the entity's display name.
pub const NAME_KEYS: &[&str] = &["entity_alias_readable", "entity_alias"];

#[derive(Debug, Clone, PartialEq)]
pub struct EntityPayload {
    pub entity_id: i64,
    pub name: Option<String>,
    pub category: Option<String>,
    pub molecules: Vec<Value>,
    /// The accepted mapping, exactly as received.
    pub document: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedResult {
    ValidEntity(EntityPayload),
    HtmlErrorPage,
    UnparseableJson,
    MissingRequiredFields,
}

impl ClassifiedResult {
    pub fn label(&self) -> &'static str {
        match self {
            ClassifiedResult::ValidEntity(_) => "valid entity",
            ClassifiedResult::HtmlErrorPage => "HTML error page",
            ClassifiedResult::UnparseableJson => "unparseable JSON",
            ClassifiedResult::MissingRequiredFields => "missing entity_id/molecules",
        }
    }
}

pub fn classify(raw: &[u8]) -> ClassifiedResult {
    if looks_like_html(raw) {
        return ClassifiedResult::HtmlErrorPage;
    }
    let value: Value = match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(_) => return ClassifiedResult::UnparseableJson,
    };
    match locate_entity(&value) {
        Some(map) => match payload_from(map) {
            Some(payload) => ClassifiedResult::ValidEntity(payload),
            None => ClassifiedResult::MissingRequiredFields,
        },
        None => ClassifiedResult::MissingRequiredFields,
    }
}

pub fn looks_like_html(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let head = text.trim_start();
    starts_with_ignore_case(head, "<!") || starts_with_ignore_case(head, "<html")
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn locate_entity(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) => locate_in_map(map),
        Value::Array(items) if items.len() == 1 => match &items[0] {
            Value::Object(map) => locate_in_map(map),
            _ => None,
        },
        _ => None,
    }
}

fn locate_in_map(map: &Map<String, Value>) -> Option<&Map<String, Value>> {
    if is_entity(map) {
        return Some(map);
    }
    WRAPPER_KEYS
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_object))
        .find(|inner| is_entity(inner))
}

fn is_entity(map: &Map<String, Value>) -> bool {
    map.contains_key(ENTITY_ID_KEY) && map.contains_key(MOLECULES_KEY)
}

fn payload_from(map: &Map<String, Value>) -> Option<EntityPayload> {
    let entity_id = map.get(ENTITY_ID_KEY).and_then(as_integer)?;
    let molecules = map.get(MOLECULES_KEY)?.as_array()?.clone();
    let name = NAME_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(|name| name.to_string());
    let category = map
        .get("category")
        .and_then(Value::as_str)
        .map(|category| category.to_string());
    Some(EntityPayload {
        entity_id,
        name,
        category,
        molecules,
        document: Value::Object(map.clone()),
    })
}

/// Integer ids arrive either as JSON numbers or as numeric strings.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}
