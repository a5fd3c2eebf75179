// cryoforge search: federated STAC catalog search over partitioned storage
// Copyright 2025 cryoforge Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Portable filter expressions.
//!
//! Filters are trees of property comparisons joined by AND, interchangeable
//! with the CQL2-JSON shape accepted by STAC search endpoints:
//!
//! ```json
//! {"op": "and", "args": [
//!     {"op": ">=", "args": [{"property": "percent_valid_pixels"}, 50]},
//!     {"op": "=", "args": [{"property": "proj:code"}, "EPSG:3413"]}
//! ]}
//! ```
//!
//! # Example
//!
//! ```
//! use cryoforge_search::filter::FilterBuilder;
//!
//! // percent_valid_pixels >= 50 AND platform = 'LC08'
//! let filter = FilterBuilder::property("percent_valid_pixels")
//!     .gte(50)
//!     .and(FilterBuilder::property("platform").eq("LC08"));
//!
//! let json = filter.to_cql2_json();
//! assert_eq!(json["op"], "and");
//! ```

pub mod translator;

use crate::error::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value, json};
use std::fmt;
use std::str::FromStr;

pub use translator::translate;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl ComparisonOp {
    /// CQL2 spelling of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
        }
    }

    /// Operator that keeps the meaning when the operands are swapped.
    pub fn flipped(self) -> Self {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Lte => ComparisonOp::Gte,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Gte => ComparisonOp::Lte,
            symmetric => symmetric,
        }
    }
}

impl FromStr for ComparisonOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Ok(ComparisonOp::Eq),
            "!=" | "<>" | "neq" => Ok(ComparisonOp::NotEq),
            "<" | "lt" => Ok(ComparisonOp::Lt),
            "<=" | "lte" => Ok(ComparisonOp::Lte),
            ">" | "gt" => Ok(ComparisonOp::Gt),
            ">=" | "gte" => Ok(ComparisonOp::Gte),
            _ => Err(Error::UnsupportedOperator(s.to_string())),
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar value on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(Number),
    Bool(bool),
}

impl Literal {
    /// Builds a numeric literal from a float; non-finite values are rejected.
    pub fn float(value: f64) -> Result<Self> {
        Number::from_f64(value)
            .map(Literal::Number)
            .ok_or_else(|| Error::InvalidFilter(format!("{value} is not a finite number")))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Number(n) => Value::Number(n.clone()),
            Literal::Bool(b) => Value::Bool(*b),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Literal::String(s.clone())),
            Value::Number(n) => Some(Literal::Number(n.clone())),
            Value::Bool(b) => Some(Literal::Bool(*b)),
            _ => None,
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

macro_rules! literal_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Literal {
            fn from(value: $t) -> Self {
                Literal::Number(Number::from(value))
            }
        })*
    };
}

literal_from_int!(i32, i64, u32, u64);

/// Filter expression tree.
///
/// Conjunction is the only boolean combinator; an empty conjunction means
/// "no filter".
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// `field op literal`
    Comparison {
        field: String,
        op: ComparisonOp,
        literal: Literal,
    },
    /// Logical AND of all children
    Conjunction(Vec<FilterExpr>),
}

impl FilterExpr {
    /// The "no filter" expression.
    pub fn empty() -> Self {
        FilterExpr::Conjunction(Vec::new())
    }

    /// True when the expression contains no comparison at all.
    pub fn is_empty(&self) -> bool {
        match self {
            FilterExpr::Comparison { .. } => false,
            FilterExpr::Conjunction(children) => children.iter().all(FilterExpr::is_empty),
        }
    }

    /// Combines with another filter using AND, flattening nested conjunctions.
    pub fn and(self, other: FilterExpr) -> FilterExpr {
        let mut children = self.into_children();
        children.extend(other.into_children());
        FilterExpr::Conjunction(children)
    }

    /// Every comparison in the tree, in document order.
    pub fn comparisons(&self) -> Vec<(&str, ComparisonOp, &Literal)> {
        let mut out = Vec::new();
        self.collect_comparisons(&mut out);
        out
    }

    fn collect_comparisons<'a>(&'a self, out: &mut Vec<(&'a str, ComparisonOp, &'a Literal)>) {
        match self {
            FilterExpr::Comparison { field, op, literal } => out.push((field, *op, literal)),
            FilterExpr::Conjunction(children) => {
                for child in children {
                    child.collect_comparisons(out);
                }
            }
        }
    }

    fn into_children(self) -> Vec<FilterExpr> {
        match self {
            FilterExpr::Conjunction(children) => children
                .into_iter()
                .flat_map(FilterExpr::into_children)
                .collect(),
            comparison => vec![comparison],
        }
    }

    /// Parses the CQL2-JSON representation.
    ///
    /// A top-level array is an implicit conjunction. Comparisons written as
    /// `literal op property` are normalised to `property op' literal`.
    pub fn from_cql2_json(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(FilterExpr::Conjunction(
                items
                    .iter()
                    .map(Self::from_cql2_json)
                    .collect::<Result<Vec<_>>>()?,
            )
            .flattened()),
            Value::Object(map) => {
                let op = map
                    .get("op")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::InvalidFilter(format!("missing 'op' in {value}")))?;
                let args = map
                    .get("args")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::InvalidFilter(format!("missing 'args' in {value}")))?;

                if op.eq_ignore_ascii_case("and") {
                    return Self::from_cql2_json(&Value::Array(args.clone()));
                }

                let op: ComparisonOp = op.parse()?;
                let [left, right] = args.as_slice() else {
                    return Err(Error::InvalidFilter(format!(
                        "comparison '{op}' takes two arguments, got {}",
                        args.len()
                    )));
                };
                match (property_name(left), property_name(right)) {
                    (Some(field), None) => Ok(FilterExpr::Comparison {
                        field: field.to_string(),
                        op,
                        literal: literal_arg(right)?,
                    }),
                    (None, Some(field)) => Ok(FilterExpr::Comparison {
                        field: field.to_string(),
                        op: op.flipped(),
                        literal: literal_arg(left)?,
                    }),
                    _ => Err(Error::InvalidFilter(format!(
                        "comparison needs exactly one property reference: {value}"
                    ))),
                }
            }
            other => Err(Error::InvalidFilter(format!(
                "expected an object or array, got {other}"
            ))),
        }
    }

    /// Produces the CQL2-JSON representation.
    pub fn to_cql2_json(&self) -> Value {
        match self {
            FilterExpr::Comparison { field, op, literal } => json!({
                "op": op.as_str(),
                "args": [{"property": field}, literal.to_json()],
            }),
            FilterExpr::Conjunction(children) => json!({
                "op": "and",
                "args": children.iter().map(FilterExpr::to_cql2_json).collect::<Vec<_>>(),
            }),
        }
    }

    fn flattened(self) -> Self {
        match self {
            FilterExpr::Conjunction(_) => FilterExpr::Conjunction(self.into_children()),
            comparison => comparison,
        }
    }
}

fn property_name(value: &Value) -> Option<&str> {
    value.get("property").and_then(Value::as_str)
}

fn literal_arg(value: &Value) -> Result<Literal> {
    Literal::from_json(value).ok_or_else(|| {
        Error::InvalidFilter(format!(
            "only string, number and boolean literals are supported, got {value}"
        ))
    })
}

impl Serialize for FilterExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_cql2_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        FilterExpr::from_cql2_json(&value).map_err(D::Error::custom)
    }
}

/// Fluent builder for comparisons on one property.
pub struct FilterBuilder {
    field: String,
}

impl FilterBuilder {
    /// Starts a comparison on the given item property.
    pub fn property(name: impl Into<String>) -> Self {
        FilterBuilder { field: name.into() }
    }

    fn compare(self, op: ComparisonOp, literal: impl Into<Literal>) -> FilterExpr {
        FilterExpr::Comparison {
            field: self.field,
            op,
            literal: literal.into(),
        }
    }

    /// property = value
    pub fn eq(self, value: impl Into<Literal>) -> FilterExpr {
        self.compare(ComparisonOp::Eq, value)
    }

    /// property <> value
    pub fn neq(self, value: impl Into<Literal>) -> FilterExpr {
        self.compare(ComparisonOp::NotEq, value)
    }

    /// property < value
    pub fn lt(self, value: impl Into<Literal>) -> FilterExpr {
        self.compare(ComparisonOp::Lt, value)
    }

    /// property <= value
    pub fn lte(self, value: impl Into<Literal>) -> FilterExpr {
        self.compare(ComparisonOp::Lte, value)
    }

    /// property > value
    pub fn gt(self, value: impl Into<Literal>) -> FilterExpr {
        self.compare(ComparisonOp::Gt, value)
    }

    /// property >= value
    pub fn gte(self, value: impl Into<Literal>) -> FilterExpr {
        self.compare(ComparisonOp::Gte, value)
    }

    /// lower <= property AND property <= upper
    pub fn between(self, lower: impl Into<Literal>, upper: impl Into<Literal>) -> FilterExpr {
        let field = self.field;
        FilterBuilder::property(field.clone())
            .gte(lower)
            .and(FilterBuilder::property(field).lte(upper))
    }
}

/// ANDs all filters together; an empty list yields the empty filter.
pub fn and_all(filters: Vec<FilterExpr>) -> FilterExpr {
    filters.into_iter().fold(FilterExpr::empty(), FilterExpr::and)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_comparison() {
        let filter = FilterExpr::from_cql2_json(&json!({
            "op": ">=", "args": [{"property": "percent_valid_pixels"}, 50]
        }))
        .unwrap();
        assert_eq!(filter, FilterBuilder::property("percent_valid_pixels").gte(50));
    }

    #[test]
    fn test_literal_on_left_is_flipped() {
        let filter = FilterExpr::from_cql2_json(&json!({
            "op": "<", "args": [30, {"property": "dt_days"}]
        }))
        .unwrap();
        assert_eq!(filter, FilterBuilder::property("dt_days").gt(30));
    }

    #[test]
    fn test_nested_and_is_flattened() {
        let filter = FilterExpr::from_cql2_json(&json!({
            "op": "and",
            "args": [
                {"op": "=", "args": [{"property": "platform"}, "LC08"]},
                {"op": "and", "args": [
                    {"op": "<>", "args": [{"property": "version"}, "001"]},
                    {"op": "=", "args": [{"property": "proj:code"}, "EPSG:3413"]}
                ]}
            ]
        }))
        .unwrap();
        let FilterExpr::Conjunction(children) = &filter else {
            panic!("expected conjunction, got {filter:?}");
        };
        assert_eq!(children.len(), 3);
        assert_eq!(filter.comparisons()[2].0, "proj:code");
    }

    #[test]
    fn test_top_level_list_is_conjunction() {
        let filter = FilterExpr::from_cql2_json(&json!([
            {"op": "=", "args": [{"property": "a"}, 1]},
            {"op": "=", "args": [{"property": "b"}, true]}
        ]))
        .unwrap();
        assert_eq!(filter.comparisons().len(), 2);
        assert!(FilterExpr::from_cql2_json(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_operators() {
        for op in ["like", "or", "not", "in", "between"] {
            let err = FilterExpr::from_cql2_json(&json!({
                "op": op, "args": [{"property": "a"}, "x"]
            }))
            .unwrap_err();
            assert!(matches!(err, Error::UnsupportedOperator(_)), "{op}: {err}");
        }
    }

    #[test]
    fn test_invalid_shapes() {
        let cases = [
            json!({"args": [{"property": "a"}, 1]}),
            json!({"op": "="}),
            json!({"op": "=", "args": [{"property": "a"}]}),
            json!({"op": "=", "args": [1, 2]}),
            json!({"op": "=", "args": [{"property": "a"}, {"property": "b"}]}),
            json!({"op": "=", "args": [{"property": "a"}, null]}),
            json!({"op": "=", "args": [{"property": "a"}, [1, 2]]}),
            json!("a = 1"),
        ];
        for case in cases {
            let err = FilterExpr::from_cql2_json(&case).unwrap_err();
            assert!(matches!(err, Error::InvalidFilter(_)), "{case}: {err}");
        }
    }

    #[test]
    fn test_to_cql2_json_matches_stac_shape() {
        let filter = FilterBuilder::property("percent_valid_pixels")
            .gte(50)
            .and(FilterBuilder::property("proj:code").eq("EPSG:3413"));
        assert_eq!(
            filter.to_cql2_json(),
            json!({
                "op": "and",
                "args": [
                    {"op": ">=", "args": [{"property": "percent_valid_pixels"}, 50]},
                    {"op": "=", "args": [{"property": "proj:code"}, "EPSG:3413"]}
                ]
            })
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let filter = FilterBuilder::property("dt_days").between(6, 18);
        let text = serde_json::to_string(&filter).unwrap();
        let back: FilterExpr = serde_json::from_str(&text).unwrap();
        assert_eq!(back, filter);

        let err = serde_json::from_str::<FilterExpr>(r#"{"op":"like","args":[]}"#).unwrap_err();
        assert!(err.to_string().contains("like"));
    }

    #[test]
    fn test_and_all() {
        assert!(and_all(Vec::new()).is_empty());
        let combined = and_all(vec![
            FilterBuilder::property("a").eq(1),
            FilterBuilder::property("b").eq(2),
        ]);
        assert_eq!(combined.comparisons().len(), 2);
    }

    #[test]
    fn test_float_literals() {
        assert!(Literal::float(f64::NAN).is_err());
        let filter = FilterBuilder::property("v").lt(Literal::float(0.5).unwrap());
        assert_eq!(filter.to_cql2_json()["args"][1], json!(0.5));
    }
}
