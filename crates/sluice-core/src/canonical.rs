//! The canonical type model.
//!
//! Every observed field value maps to exactly one [`CanonicalType`]. The
//! tags are ordered by the widening partial order used elsewhere: `null`
//! widens into anything, every scalar widens into `str`, and `array`/
//! `object` never widen.

use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical 8-4-4-4-12 hex UUID, case-insensitive. Braced and URN forms
/// are deliberately not accepted.
static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .unwrap()
});

/// Datetime formats recognized in string leaves, tried in order.
/// ISO forms with and without fraction and trailing `Z`, then the common
/// space-separated form.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Date-only formats, parsed as midnight.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%m-%d-%Y",
];

/// Semantic type tag for a field observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Ip,
    Uuid,
    DateTime,
    Array,
    Object,
}

impl CanonicalType {
    /// All tags, in declaration order. Used for fixed-arity counting.
    pub const ALL: [CanonicalType; 10] = [
        CanonicalType::Null,
        CanonicalType::Bool,
        CanonicalType::Int,
        CanonicalType::Float,
        CanonicalType::Str,
        CanonicalType::Ip,
        CanonicalType::Uuid,
        CanonicalType::DateTime,
        CanonicalType::Array,
        CanonicalType::Object,
    ];

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalType::Null => "null",
            CanonicalType::Bool => "bool",
            CanonicalType::Int => "int",
            CanonicalType::Float => "float",
            CanonicalType::Str => "str",
            CanonicalType::Ip => "ip",
            CanonicalType::Uuid => "uuid",
            CanonicalType::DateTime => "datetime",
            CanonicalType::Array => "array",
            CanonicalType::Object => "object",
        }
    }

    /// Returns `true` for the scalar tags (everything except `null`,
    /// `array` and `object`).
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            CanonicalType::Null | CanonicalType::Array | CanonicalType::Object
        )
    }

    /// Detects the canonical type of a JSON value.
    ///
    /// Structural tags come straight from the value; string leaves are
    /// inspected for IP, UUID and datetime shapes in that priority order.
    pub fn detect(value: &Value) -> CanonicalType {
        match value {
            Value::Null => CanonicalType::Null,
            Value::Bool(_) => CanonicalType::Bool,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    CanonicalType::Int
                } else {
                    CanonicalType::Float
                }
            }
            Value::String(s) => Self::detect_str(s),
            Value::Array(_) => CanonicalType::Array,
            Value::Object(_) => CanonicalType::Object,
        }
    }

    /// Detects the canonical type of a string leaf.
    pub fn detect_str(s: &str) -> CanonicalType {
        let trimmed = s.trim();
        if is_ip_literal(trimmed) {
            CanonicalType::Ip
        } else if is_uuid_literal(trimmed) {
            CanonicalType::Uuid
        } else if parse_datetime(trimmed).is_some() {
            CanonicalType::DateTime
        } else {
            CanonicalType::Str
        }
    }

    /// Maps a canonical type to its relational column type.
    pub fn relational_type(&self) -> &'static str {
        for &(ct, sql) in RELATIONAL_TYPES {
            if ct == *self {
                return sql;
            }
        }
        "TEXT"
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical-to-relational type map, kept as data so it can be reviewed
/// and tested in isolation. Types missing from the table fall back to
/// `TEXT`.
pub const RELATIONAL_TYPES: &[(CanonicalType, &str)] = &[
    (CanonicalType::Int, "BIGINT"),
    (CanonicalType::Float, "DOUBLE"),
    (CanonicalType::Bool, "BOOLEAN"),
    (CanonicalType::Ip, "VARCHAR(45)"),
    (CanonicalType::Uuid, "CHAR(36)"),
    (CanonicalType::DateTime, "DATETIME"),
    (CanonicalType::Str, "VARCHAR(255)"),
];

/// Returns `true` if the string parses as an IPv4 or IPv6 address.
pub fn is_ip_literal(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

/// Returns `true` if the string is a canonical hyphenated UUID.
pub fn is_uuid_literal(s: &str) -> bool {
    UUID_RE.is_match(s)
}

/// Parses a string against the fixed datetime format list.
///
/// Date-only forms yield midnight. Returns `None` if no format matches.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}
