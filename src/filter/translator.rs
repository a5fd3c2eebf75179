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

//! Translation of filter expressions into SQL predicates.
//!
//! Used by engines that accept a raw `WHERE` clause. Comparisons are joined
//! with `AND` in document order:
//!
//! | Filter | SQL |
//! |--------|-----|
//! | `percent_valid_pixels >= 50` | `percent_valid_pixels >= 50` |
//! | `proj:code = "EPSG:3413"` | `"proj:code" = 'EPSG:3413'` |
//! | `platform != "it's"` | `platform <> 'it''s'` |

use super::{ComparisonOp, FilterExpr, Literal};
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    static ref PLAIN_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Translates `expr` into a SQL predicate.
///
/// Returns `Ok(None)` when the expression has no comparisons, meaning no
/// `WHERE` clause should be emitted.
pub fn translate(expr: &FilterExpr) -> Result<Option<String>> {
    let terms = expr
        .comparisons()
        .into_iter()
        .map(|(field, op, literal)| translate_comparison(field, op, literal))
        .collect::<Result<Vec<_>>>()?;

    if terms.is_empty() {
        Ok(None)
    } else {
        Ok(Some(terms.join(" AND ")))
    }
}

fn translate_comparison(field: &str, op: ComparisonOp, literal: &Literal) -> Result<String> {
    if field.is_empty() {
        return Err(Error::InvalidFilter("empty property name".into()));
    }
    Ok(format!(
        "{} {} {}",
        quote_identifier(field),
        sql_operator(op),
        render_literal(literal)
    ))
}

fn sql_operator(op: ComparisonOp) -> &'static str {
    match op {
        ComparisonOp::Eq => "=",
        ComparisonOp::NotEq => "<>",
        ComparisonOp::Lt => "<",
        ComparisonOp::Lte => "<=",
        ComparisonOp::Gt => ">",
        ComparisonOp::Gte => ">=",
    }
}

/// Renders a column reference, double-quoting names that are not plain
/// identifiers (STAC extension fields such as `proj:code`).
pub fn quote_identifier(name: &str) -> Cow<'_, str> {
    if PLAIN_IDENTIFIER.is_match(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

/// Renders a literal. Strings are single-quoted with embedded quotes doubled.
pub fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::String(s) => quote_string(s),
        Literal::Number(n) => n.to_string(),
        Literal::Bool(true) => "TRUE".to_string(),
        Literal::Bool(false) => "FALSE".to_string(),
    }
}

/// Single-quotes a string for use as a SQL literal.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
