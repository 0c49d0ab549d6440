//! Layered merge of YAML value trees.
//!
//! Maps merge recursively, everything else (scalars and lists) is replaced
//! by the later layer.

use serde_yaml::Value;

/// Merge `overlay` into `base`
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                let nested = matches!(
                    (base_map.get(&key), &value),
                    (Some(Value::Mapping(_)), Value::Mapping(_))
                );
                if nested {
                    if let Some(existing) = base_map.get_mut(&key) {
                        merge_values(existing, value);
                    }
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
