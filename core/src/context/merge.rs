//! Deep-merge-by-section: the merge rule used both for inheritance
//! resolution and for delegation processing.

use serde_json::Value;

/// Merge `overlay` into `base`.
///
/// - objects merge key by key, recursively;
/// - arrays replace wholesale;
/// - scalars replace.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}
