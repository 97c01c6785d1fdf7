use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// A single live mix value. The engine language has no boolean literal, so
/// booleans travel as `1`/`0` (see [`ParamValue::engine_literal`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(Number),
}

impl ParamValue {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(ParamValue::Bool(*v)),
            Value::Number(n) => Some(ParamValue::Number(n.clone())),
            _ => None,
        }
    }

    pub fn engine_literal(&self) -> String {
        match self {
            ParamValue::Bool(true) => "1".to_string(),
            ParamValue::Bool(false) => "0".to_string(),
            ParamValue::Number(n) => n.to_string(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(Number::from(value))
    }
}

/// Insertion-ordered so the persisted file and rendered commands keep the caller's key order.
pub type LiveParameterMap = IndexMap<String, ParamValue>;

/// Converts a JSON object into a parameter map, collecting the keys whose
/// values are not numbers or booleans.
pub fn parameter_map_from_json(value: &Value) -> Result<LiveParameterMap, Vec<String>> {
    let Some(obj) = value.as_object() else {
        return Err(Vec::new());
    };
    let mut out = LiveParameterMap::new();
    let mut rejected = Vec::new();
    for (key, raw) in obj {
        match ParamValue::from_json(raw) {
            Some(v) => {
                out.insert(key.clone(), v);
            }
            None => rejected.push(key.clone()),
        }
    }
    if rejected.is_empty() {
        Ok(out)
    } else {
        Err(rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn booleans_render_as_numeric_pair() {
        assert_eq!(ParamValue::Bool(true).engine_literal(), "1");
        assert_eq!(ParamValue::Bool(false).engine_literal(), "0");
        assert_eq!(
            ParamValue::from_json(&json!(0.8)).unwrap().engine_literal(),
            "0.8"
        );
        assert_eq!(ParamValue::from(50).engine_literal(), "50");
    }

    #[test]
    fn map_from_json_rejects_non_scalar_values() {
        let err = parameter_map_from_json(&json!({"a": 1, "b": "loud", "c": null}))
            .expect_err("strings and null are not mix values");
        assert_eq!(err, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn untagged_values_round_trip_through_json() {
        let map: LiveParameterMap =
            serde_json::from_str(r#"{"reverb_on": true, "reverb_mix": 0.8}"#).expect("parse");
        assert_eq!(map.get("reverb_on"), Some(&ParamValue::Bool(true)));
        assert_eq!(map.get_index(1).map(|(k, _)| k.as_str()), Some("reverb_mix"));
    }

    #[test]
    fn map_from_json_keeps_the_callers_key_order() {
        let value: Value =
            serde_json::from_str(r#"{"wobble_on": true, "delay_mix": 0.3, "bitcrusher_bits": 8}"#)
                .expect("parse");
        let map = parameter_map_from_json(&value).expect("scalars");
        let keys = map.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, vec!["wobble_on", "delay_mix", "bitcrusher_bits"]);
    }
}
