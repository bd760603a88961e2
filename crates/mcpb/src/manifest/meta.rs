//! Cached static responses in the manifest's vendor metadata bag.
//!
//! Layout: `_meta["com.microsoft.windows"].static_responses` with the
//! `initialize` and `tools/list` payloads stored verbatim.

use serde_json::{Map as JsonMap, Value as JsonValue};

use super::Manifest;

pub const WINDOWS_META_KEY: &str = "com.microsoft.windows";
pub const STATIC_RESPONSES_KEY: &str = "static_responses";
pub const INITIALIZE_KEY: &str = "initialize";
pub const TOOLS_LIST_KEY: &str = "tools/list";

impl Manifest {
    /// Cached payload stored under `key` (`initialize` or `tools/list`).
    pub fn static_response(&self, key: &str) -> Option<&JsonValue> {
        self.meta
            .as_ref()?
            .get(WINDOWS_META_KEY)?
            .get(STATIC_RESPONSES_KEY)?
            .get(key)
    }

    /// Replace cached payloads that differ from the given ones.
    ///
    /// `None` leaves the cached entry untouched. Returns true when anything
    /// changed. Sibling keys in the vendor bag are preserved.
    pub fn apply_static_responses(
        &mut self,
        initialize: Option<&JsonValue>,
        tools_list: Option<&JsonValue>,
    ) -> bool {
        let updates: Vec<(&str, &JsonValue)> = [
            (INITIALIZE_KEY, initialize),
            (TOOLS_LIST_KEY, tools_list),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .filter(|(k, v)| self.static_response(k) != Some(*v))
        .collect();
        if updates.is_empty() {
            return false;
        }

        let meta = self.meta.get_or_insert_with(JsonMap::new);
        let vendor = object_entry(meta, WINDOWS_META_KEY);
        let responses = object_entry(vendor, STATIC_RESPONSES_KEY);
        for (key, value) in updates {
            responses.insert(key.to_string(), value.clone());
        }
        true
    }
}

/// Get or create an object under `key`, replacing a non-object value.
fn object_entry<'a>(
    map: &'a mut JsonMap<String, JsonValue>,
    key: &str,
) -> &'a mut JsonMap<String, JsonValue> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| JsonValue::Object(JsonMap::new()));
    if !slot.is_object() {
        *slot = JsonValue::Object(JsonMap::new());
    }
    match slot {
        JsonValue::Object(obj) => obj,
        _ => unreachable!("slot was just set to an object"),
    }
}

/// Recursively drop null-valued object properties.
pub fn strip_nulls(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}
