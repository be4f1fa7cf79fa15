//! Dotted-path access into a YAML document.
//!
//! Paths are `.`-separated segments. A segment addresses a mapping key, or a
//! sequence index when it is a non-negative integer. Writes through an index
//! require an existing sequence at that point:
//!
//! ```text
//! quality_thresholds.coverage_minimum
//! notifications.channels.0.level
//! ```

use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Errors from writing to a dotted path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Path '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("Index {index} out of range at '{segment}' (length {len})")]
    IndexOutOfRange {
        segment: String,
        index: usize,
        len: usize,
    },

    #[error("Segment '{segment}' is not a valid index into a list")]
    InvalidIndex { segment: String },

    #[error("Cannot descend into '{segment}': value is neither a mapping nor a list")]
    NotAContainer { segment: String },
}

fn segments(path: &str) -> Result<Vec<&str>, PathError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(PathError::EmptySegment(path.to_string()));
    }
    Ok(parts)
}

/// Read the value at `path`, if every segment resolves
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Mapping(map) => map.get(segment)?,
            Value::Sequence(seq) => seq.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `path`, returning the previous value (`Null` if absent).
///
/// Missing intermediate mappings are created. A `null` node on the way is
/// replaced by an empty mapping. Sequences are never extended, and a rejected
/// write leaves the document untouched.
pub fn set_path(root: &mut Value, path: &str, value: Value) -> Result<Value, PathError> {
    let parts = segments(path)?;
    let (last, parents) = match parts.split_last() {
        Some(split) => split,
        None => return Err(PathError::EmptySegment(path.to_string())),
    };
    check_indices(root, &parts)?;

    let mut current = root;
    for segment in parents {
        current = descend_mut(current, segment)?;
    }

    if current.is_null() {
        *current = Value::Mapping(Mapping::new());
    }

    match current {
        Value::Mapping(map) => Ok(map
            .insert(Value::String((*last).to_string()), value)
            .unwrap_or(Value::Null)),
        Value::Sequence(seq) => {
            let slot = index_mut(seq, last)?;
            Ok(std::mem::replace(slot, value))
        }
        _ => Err(PathError::NotAContainer {
            segment: (*last).to_string(),
        }),
    }
}

/// Every index segment must land on an existing sequence
fn check_indices(root: &Value, parts: &[&str]) -> Result<(), PathError> {
    let mut current = Some(root);
    for segment in parts {
        let is_index = segment.parse::<usize>().is_ok();
        current = match current {
            Some(Value::Sequence(seq)) => {
                let index = segment.parse::<usize>().map_err(|_| PathError::InvalidIndex {
                    segment: segment.to_string(),
                })?;
                seq.get(index)
            }
            _ if is_index => {
                return Err(PathError::InvalidIndex {
                    segment: segment.to_string(),
                })
            }
            Some(Value::Mapping(map)) => map.get(*segment),
            _ => None,
        };
    }
    Ok(())
}

fn descend_mut<'a>(value: &'a mut Value, segment: &str) -> Result<&'a mut Value, PathError> {
    if value.is_null() {
        *value = Value::Mapping(Mapping::new());
    }

    match value {
        Value::Mapping(map) => Ok(map
            .entry(Value::String(segment.to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()))),
        Value::Sequence(seq) => index_mut(seq, segment),
        _ => Err(PathError::NotAContainer {
            segment: segment.to_string(),
        }),
    }
}

fn index_mut<'a>(seq: &'a mut [Value], segment: &str) -> Result<&'a mut Value, PathError> {
    let index = segment
        .parse::<usize>()
        .map_err(|_| PathError::InvalidIndex {
            segment: segment.to_string(),
        })?;
    let len = seq.len();
    seq.get_mut(index).ok_or(PathError::IndexOutOfRange {
        segment: segment.to_string(),
        index,
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Value {
        serde_yaml::from_str(
            r#"
quality_thresholds:
  coverage_minimum: 80
notifications:
  enabled: true
  channels:
    - type: console
      level: INFO
cache:
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_get_nested_and_indexed() {
        let doc = doc();
        assert_eq!(
            get_path(&doc, "quality_thresholds.coverage_minimum"),
            Some(&Value::from(80))
        );
        assert_eq!(
            get_path(&doc, "notifications.channels.0.level"),
            Some(&Value::from("INFO"))
        );
        assert_eq!(get_path(&doc, "notifications.channels.3.level"), None);
        assert_eq!(get_path(&doc, "missing.key"), None);
    }

    #[test]
    fn test_set_returns_old_value() {
        let mut doc = doc();
        let old = set_path(&mut doc, "quality_thresholds.coverage_minimum", Value::from(90)).unwrap();
        assert_eq!(old, Value::from(80));
        assert_eq!(
            get_path(&doc, "quality_thresholds.coverage_minimum"),
            Some(&Value::from(90))
        );
    }

    #[test]
    fn test_set_creates_intermediate_mappings() {
        let mut doc = doc();
        let old = set_path(&mut doc, "environments.development.debug", Value::from(true)).unwrap();
        assert_eq!(old, Value::Null);
        assert_eq!(
            get_path(&doc, "environments.development.debug"),
            Some(&Value::from(true))
        );
    }

    #[test]
    fn test_set_replaces_null_node() {
        let mut doc = doc();
        set_path(&mut doc, "cache.enabled", Value::from(false)).unwrap();
        assert_eq!(get_path(&doc, "cache.enabled"), Some(&Value::from(false)));
    }

    #[test]
    fn test_set_into_list() {
        let mut doc = doc();
        let old = set_path(&mut doc, "notifications.channels.0.level", Value::from("DEBUG")).unwrap();
        assert_eq!(old, Value::from("INFO"));

        let err = set_path(&mut doc, "notifications.channels.2.level", Value::from("DEBUG")).unwrap_err();
        assert!(matches!(err, PathError::IndexOutOfRange { index: 2, len: 1, .. }));
    }

    #[test]
    fn test_index_into_missing_list_is_rejected() {
        let mut doc: Value =
            serde_yaml::from_str("notifications:\n  enabled: true\n").unwrap();
        let before = doc.clone();

        let err = set_path(&mut doc, "notifications.channels.0.level", Value::from("DEBUG")).unwrap_err();
        assert_eq!(
            err,
            PathError::InvalidIndex {
                segment: "0".to_string()
            }
        );
        // Nothing was created on the way down
        assert_eq!(doc, before);

        let err = set_path(&mut doc, "notifications.0", Value::from(1)).unwrap_err();
        assert!(matches!(err, PathError::InvalidIndex { .. }));
    }

    #[test]
    fn test_set_rejects_scalar_parent() {
        let mut doc = doc();
        let err = set_path(&mut doc, "notifications.enabled.level", Value::from(1)).unwrap_err();
        assert!(matches!(err, PathError::NotAContainer { .. }));
    }

    #[test]
    fn test_empty_segment() {
        let mut doc = doc();
        assert!(matches!(
            set_path(&mut doc, "cache..enabled", Value::from(true)),
            Err(PathError::EmptySegment(_))
        ));
    }
}
