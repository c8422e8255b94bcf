use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

/// Scalar filter/page parameter carried in a query key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Flag(bool),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Flag(value)
    }
}

impl From<Uuid> for ParamValue {
    fn from(value: Uuid) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => write!(f, "{}", s),
            ParamValue::Int(n) => write!(f, "{}", n),
            ParamValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// Ordered parameter map; ordering makes key equality independent of
/// insertion order.
pub type Params = BTreeMap<String, ParamValue>;

/// Identity of one cached query: resource name plus every paging/filter
/// parameter. Two keys are equal iff the resource and every parameter
/// (including absence) match, so distinct filter combinations never collide.
/// Invalidation matches on the resource name alone, ignoring params.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: String,
    params: Params,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: Params::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        for (name, value) in &self.params {
            write!(f, " {}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_ignores_insertion_order() {
        let a = QueryKey::new("students").with("page", 1u32).with("status", "active");
        let b = QueryKey::new("students").with("status", "active").with("page", 1u32);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_filters_distinct_keys() {
        let a = QueryKey::new("students").with("page", 1u32);
        let b = QueryKey::new("students").with("page", 1u32).with("status", "active");
        assert_ne!(a, b);
    }

    #[test]
    fn test_param_lookup() {
        let key = QueryKey::new("assigned-tasks").with("student_id", "s1");
        assert_eq!(key.param("student_id").and_then(ParamValue::as_text), Some("s1"));
        assert!(key.param("teacher_id").is_none());
    }
}
