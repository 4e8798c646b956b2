//! Scalar coercion for string leaves.
//!
//! Attempts are made in a fixed priority order: null alias, bool alias,
//! integer, float, IP, UUID, datetime, and finally plain string. Bool
//! aliases are tested before integers so that values a source encodes as
//! truthy words never land in an integer column.

use serde_json::{Number, Value};

use sluice_core::CanonicalType;
use sluice_core::canonical::{is_ip_literal, is_uuid_literal, parse_datetime};

/// String spellings treated as null.
pub const NULL_VARIANTS: [&str; 4] = ["null", "none", "nil", ""];

/// String spellings treated as boolean true.
pub const BOOL_TRUE_VARIANTS: [&str; 2] = ["true", "yes"];

/// String spellings treated as boolean false.
pub const BOOL_FALSE_VARIANTS: [&str; 2] = ["false", "no"];

/// Outcome of coercing one string leaf.
#[derive(Debug, Clone)]
pub struct StringCoercion {
    /// The resulting value (the trimmed original when nothing applied).
    pub value: Value,
    /// Canonical type of the resulting value.
    pub canonical: CanonicalType,
    /// Whether the JSON type changed (string to something else).
    pub coerced: bool,
    /// Set when a parse matched but the value could not be represented;
    /// the original string is kept.
    pub failed: Option<CanonicalType>,
}

impl StringCoercion {
    fn kept(s: &str, canonical: CanonicalType) -> Self {
        StringCoercion {
            value: Value::String(s.to_string()),
            canonical,
            coerced: false,
            failed: None,
        }
    }

    fn changed(value: Value, canonical: CanonicalType) -> Self {
        StringCoercion {
            value,
            canonical,
            coerced: true,
            failed: None,
        }
    }
}

/// Coerces a string leaf to its true scalar type.
pub fn coerce_str(raw: &str) -> StringCoercion {
    let s = raw.trim();
    let lower = s.to_ascii_lowercase();

    if NULL_VARIANTS.contains(&lower.as_str()) {
        return StringCoercion::changed(Value::Null, CanonicalType::Null);
    }

    if BOOL_TRUE_VARIANTS.contains(&lower.as_str()) {
        return StringCoercion::changed(Value::Bool(true), CanonicalType::Bool);
    }
    if BOOL_FALSE_VARIANTS.contains(&lower.as_str()) {
        return StringCoercion::changed(Value::Bool(false), CanonicalType::Bool);
    }

    if let Ok(i) = s.parse::<i64>() {
        return StringCoercion::changed(Value::Number(Number::from(i)), CanonicalType::Int);
    }

    if let Ok(f) = s.parse::<f64>() {
        return match Number::from_f64(f) {
            Some(n) => StringCoercion::changed(Value::Number(n), CanonicalType::Float),
            // inf / nan parse but have no JSON representation.
            None => StringCoercion {
                value: Value::String(s.to_string()),
                canonical: CanonicalType::Str,
                coerced: false,
                failed: Some(CanonicalType::Float),
            },
        };
    }

    if is_ip_literal(s) {
        return StringCoercion::kept(s, CanonicalType::Ip);
    }

    if is_uuid_literal(s) {
        return StringCoercion::kept(s, CanonicalType::Uuid);
    }

    if parse_datetime(s).is_some() {
        return StringCoercion::kept(s, CanonicalType::DateTime);
    }

    StringCoercion::kept(s, CanonicalType::Str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_aliases_become_null() {
        for s in ["null", "None", "NIL", "", "  "] {
            let c = coerce_str(s);
            assert_eq!(c.value, Value::Null, "input {s:?}");
            assert!(c.coerced);
        }
    }

    #[test]
    fn bool_aliases_before_integers() {
        assert_eq!(coerce_str("true").value, json!(true));
        assert_eq!(coerce_str("Yes").value, json!(true));
        assert_eq!(coerce_str("FALSE").value, json!(false));
        assert_eq!(coerce_str("no").value, json!(false));
        assert_eq!(coerce_str("true").canonical, CanonicalType::Bool);
    }

    #[test]
    fn integer_strings() {
        let c = coerce_str("9197");
        assert_eq!(c.value, json!(9197));
        assert_eq!(c.canonical, CanonicalType::Int);
        assert_eq!(coerce_str("-5").value, json!(-5));
    }

    #[test]
    fn float_strings() {
        let c = coerce_str("23.5");
        assert_eq!(c.value, json!(23.5));
        assert_eq!(c.canonical, CanonicalType::Float);
        // Scientific notation parses as float.
        assert_eq!(coerce_str("1e3").canonical, CanonicalType::Float);
    }

    #[test]
    fn non_finite_floats_fail_and_keep_string() {
        let c = coerce_str("inf");
        assert_eq!(c.value, json!("inf"));
        assert_eq!(c.failed, Some(CanonicalType::Float));
        assert_eq!(c.canonical, CanonicalType::Str);
    }

    #[test]
    fn dotted_quad_is_ip_not_number() {
        let c = coerce_str("192.168.1.1");
        assert_eq!(c.value, json!("192.168.1.1"));
        assert_eq!(c.canonical, CanonicalType::Ip);
        assert!(!c.coerced);
    }

    #[test]
    fn uuid_and_datetime_keep_their_strings() {
        let c = coerce_str("44cf4b1f-cfd4-42c1-a55f-62cf0c37f15b");
        assert_eq!(c.canonical, CanonicalType::Uuid);
        assert!(!c.coerced);

        let c = coerce_str("2026-02-14T05:44:25.223850");
        assert_eq!(c.canonical, CanonicalType::DateTime);
        assert_eq!(c.value, json!("2026-02-14T05:44:25.223850"));
    }

    #[test]
    fn plain_strings_are_trimmed_only() {
        let c = coerce_str("  moderate ");
        assert_eq!(c.value, json!("moderate"));
        assert_eq!(c.canonical, CanonicalType::Str);
        assert!(!c.coerced);
    }
}
