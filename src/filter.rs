//! Filter expression grammar: a small, whitelisted comparison language.
//!
//! Grammar: `field = "value"` or `field != "value"`, conjoined with `AND`.
//! No disjunction, no parentheses, no pluggable operators — this is
//! intentionally not a general-purpose expression language (see Non-goals).

use crate::error::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub field: String,
    pub op: Op,
    pub value: String,
}

/// A parsed filter: a conjunction of field comparisons. An empty `terms`
/// list matches everything (no filter was supplied).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    pub terms: Vec<Comparison>,
}

impl Filter {
    /// Parses and validates `expr` against `whitelist`, rejecting any
    /// referenced field that is not in it.
    pub fn parse(expr: &str, whitelist: &[&str]) -> Result<Filter, RegistryError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(Filter::default());
        }
        let mut terms = Vec::new();
        for clause in split_and(expr) {
            let cmp = parse_comparison(clause)?;
            if !whitelist.contains(&cmp.field.as_str()) {
                return Err(RegistryError::invalid_argument(format!(
                    "field '{}' is not filterable here",
                    cmp.field
                )));
            }
            terms.push(cmp);
        }
        Ok(Filter { terms })
    }

    /// Evaluates this filter against a record, given an accessor that
    /// returns the record's value for a whitelisted field name.
    pub fn matches(&self, mut field: impl FnMut(&str) -> Option<String>) -> bool {
        self.terms.iter().all(|term| {
            let actual = field(&term.field).unwrap_or_default();
            match term.op {
                Op::Eq => actual == term.value,
                Op::Ne => actual != term.value,
            }
        })
    }
}

fn split_and(expr: &str) -> Vec<&str> {
    // Case-sensitive " AND " separator; no quoting-aware splitting is
    // needed since quoted values in this grammar never contain " AND ".
    expr.split(" AND ").map(str::trim).collect()
}

fn parse_comparison(clause: &str) -> Result<Comparison, RegistryError> {
    let bad = || {
        RegistryError::invalid_argument(format!("malformed filter clause: '{clause}'"))
    };

    let (field, rest, op) = if let Some(idx) = clause.find("!=") {
        (&clause[..idx], &clause[idx + 2..], Op::Ne)
    } else if let Some(idx) = clause.find('=') {
        (&clause[..idx], &clause[idx + 1..], Op::Eq)
    } else {
        return Err(bad());
    };

    let field = field.trim();
    let rest = rest.trim();
    if field.is_empty() {
        return Err(bad());
    }
    let value = parse_quoted(rest).ok_or_else(bad)?;
    Ok(Comparison {
        field: field.to_string(),
        op,
        value,
    })
}

fn parse_quoted(s: &str) -> Option<String> {
    let s = s.strip_prefix('"')?;
    let s = s.strip_suffix('"')?;
    Some(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[&str] = &["display_name", "filename", "mime_type"];

    #[test]
    fn empty_filter_matches_everything() {
        let f = Filter::parse("", FIELDS).unwrap();
        assert!(f.matches(|_| None));
    }

    #[test]
    fn single_eq_comparison() {
        let f = Filter::parse(r#"display_name = "Widgets""#, FIELDS).unwrap();
        assert!(f.matches(|field| {
            assert_eq!(field, "display_name");
            Some("Widgets".to_string())
        }));
        let f2 = Filter::parse(r#"display_name = "Widgets""#, FIELDS).unwrap();
        assert!(!f2.matches(|_| Some("Gadgets".to_string())));
    }

    #[test]
    fn conjunction_of_clauses() {
        let f = Filter::parse(
            r#"display_name = "Widgets" AND mime_type != "text/plain""#,
            FIELDS,
        )
        .unwrap();
        let mut calls = 0;
        assert!(f.matches(|field| {
            calls += 1;
            match field {
                "display_name" => Some("Widgets".to_string()),
                "mime_type" => Some("application/json".to_string()),
                _ => None,
            }
        }));
        assert_eq!(calls, 2);
    }

    #[test]
    fn rejects_non_whitelisted_field() {
        assert!(Filter::parse(r#"secret = "x""#, FIELDS).is_err());
    }

    #[test]
    fn rejects_malformed_clause() {
        assert!(Filter::parse("display_name Widgets", FIELDS).is_err());
        assert!(Filter::parse("display_name = Widgets", FIELDS).is_err());
    }
}
