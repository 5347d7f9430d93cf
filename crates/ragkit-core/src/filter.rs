//! Metadata constraints shared by every index backend.
//!
//! A [`Filter`] is a conjunction of equality and range conditions over chunk
//! metadata. Backends either push conditions down natively or apply them to
//! the returned page; see [`crate::traits::FilterMode`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::Meta;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl Bounds {
    pub fn contains(&self, v: f64) -> bool {
        self.gt.map_or(true, |b| v > b)
            && self.gte.map_or(true, |b| v >= b)
            && self.lt.map_or(true, |b| v < b)
            && self.lte.map_or(true, |b| v <= b)
    }

    fn is_empty(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Eq { field: String, value: Value },
    Range { field: String, bounds: Bounds },
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::Range { field, .. } => field,
        }
    }

    pub fn matches(&self, meta: &Meta) -> bool {
        match self {
            Self::Eq { field, value } => meta.get(field).is_some_and(|v| values_equal(v, value)),
            Self::Range { field, bounds } => {
                meta.get(field).and_then(Value::as_f64).is_some_and(|v| bounds.contains(v))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self { Self::default() }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq { field: field.into(), value: value.into() });
        self
    }

    pub fn range(mut self, field: impl Into<String>, bounds: Bounds) -> Self {
        self.conditions.push(Condition::Range { field: field.into(), bounds });
        self
    }

    pub fn is_empty(&self) -> bool { self.conditions.is_empty() }

    pub fn matches(&self, meta: &Meta) -> bool {
        self.conditions.iter().all(|c| c.matches(meta))
    }

    /// Parse the opaque request form:
    ///
    /// ```json
    /// { "category": "herbs", "year": { "gte": 2000, "lt": 2020 }, "lang": { "eq": "en" } }
    /// ```
    ///
    /// Scalars mean equality; objects accept `eq`, `gt`, `gte`, `lt`, `lte`.
    /// Anything else is rejected with [`Error::UnsupportedFilter`].
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(obj) => obj,
            other => return Err(Error::UnsupportedFilter(format!("filter must be an object, got {other}"))),
        };
        let mut filter = Self::default();
        for (field, spec) in obj {
            match spec {
                Value::Object(ops) => {
                    let mut bounds = Bounds::default();
                    for (op, operand) in ops {
                        if op == "eq" {
                            if !is_scalar(operand) {
                                return Err(Error::UnsupportedFilter(format!("'{field}.eq' must be a scalar")));
                            }
                            filter.conditions.push(Condition::Eq { field: field.clone(), value: operand.clone() });
                            continue;
                        }
                        let n = operand.as_f64().ok_or_else(|| {
                            Error::UnsupportedFilter(format!("'{field}.{op}' must be numeric"))
                        })?;
                        match op.as_str() {
                            "gt" => bounds.gt = Some(n),
                            "gte" => bounds.gte = Some(n),
                            "lt" => bounds.lt = Some(n),
                            "lte" => bounds.lte = Some(n),
                            _ => return Err(Error::UnsupportedFilter(format!("unknown operator '{op}' on '{field}'"))),
                        }
                    }
                    if !bounds.is_empty() {
                        filter.conditions.push(Condition::Range { field: field.clone(), bounds });
                    }
                }
                scalar if is_scalar(scalar) => {
                    filter.conditions.push(Condition::Eq { field: field.clone(), value: scalar.clone() });
                }
                _ => return Err(Error::UnsupportedFilter(format!("'{field}' has an unsupported constraint"))),
            }
        }
        Ok(filter)
    }
}

fn is_scalar(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}
