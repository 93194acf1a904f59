use serde_json::{Map, Value};

use crate::types::Change;

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Collect leaf-level differences between two JSON trees.
///
/// Objects and arrays are walked; any other value is compared as a whole.
/// Keys that disappear are reported with `new = null`.
pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<Change>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = join(path_prefix, key);
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None if curr_val.is_object() => {
                        diff_json(&Value::Object(Map::new()), curr_val, &path, changes)
                    }
                    None => changes.push(Change {
                        path,
                        old: Value::Null,
                        new: curr_val.clone(),
                    }),
                }
            }
            for (key, prev_val) in prev_map {
                if !curr_map.contains_key(key) {
                    changes.push(Change {
                        path: join(path_prefix, key),
                        old: prev_val.clone(),
                        new: Value::Null,
                    });
                }
            }
        }
        (Value::Array(prev_arr), Value::Array(curr_arr)) if prev_arr.len() == curr_arr.len() => {
            for (i, (p, c)) in prev_arr.iter().zip(curr_arr).enumerate() {
                diff_json(p, c, &join(path_prefix, &i.to_string()), changes);
            }
        }
        (prev, curr) if prev != curr => {
            changes.push(Change {
                path: path_prefix.to_string(),
                old: prev.clone(),
                new: curr.clone(),
            });
        }
        _ => {}
    }
}
