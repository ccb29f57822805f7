//! Config deep merge.

use serde_json::Value;

/// Merge `override_val` onto `base`.
///
/// Objects merge recursively, arrays replace wholesale, and the
/// override wins on scalar conflict. Total over all JSON value shapes;
/// no key is ever silently dropped.
pub fn deep_merge(base: &Value, override_val: &Value) -> Value {
    match (base, override_val) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in override_map {
                match base_map.get(key) {
                    Some(existing) => {
                        merged.insert(key.clone(), deep_merge(existing, value));
                    }
                    None => {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        // Anything non-object on either side: override wins.
        _ => override_val.clone(),
    }
}
