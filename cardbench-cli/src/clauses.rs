//! Command-Line Query Clauses
//!
//! Parses `--where` literals such as `Model Year>=2000` into filters. Two
//! bounds on one column, `>=` and `<=`, become a single range predicate.

use cardbench_core::{Filter, Operator, Predicate, Table, TableError, Value};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while parsing query clauses
#[derive(Debug, Error)]
pub enum ClauseError {
    #[error("Malformed WHERE clause '{0}': expected <column><op><value> with op one of <=, >=, =")]
    Malformed(String),

    #[error(transparent)]
    Column(#[from] TableError),
}

fn clause_pattern() -> &'static Regex {
    static CLAUSE_RE: OnceLock<Regex> = OnceLock::new();
    CLAUSE_RE.get_or_init(|| Regex::new(r"^\s*(.+?)\s*(<=|>=|=)\s*(.+?)\s*$").unwrap())
}

/// Split one clause into column name, operator and literal
pub fn split_clause(clause: &str) -> Result<(&str, Operator, &str), ClauseError> {
    let caps = clause_pattern()
        .captures(clause)
        .ok_or_else(|| ClauseError::Malformed(clause.to_string()))?;
    let column = caps.get(1).map_or("", |m| m.as_str());
    let op = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<Operator>().ok())
        .ok_or_else(|| ClauseError::Malformed(clause.to_string()))?;
    let value = caps.get(3).map_or("", |m| m.as_str());
    Ok((column, op, value))
}

/// Parse `--where` clauses against `table`.
///
/// Filters keep the order in which their column first appears.
pub fn parse_where(table: &Table, clauses: &[String]) -> Result<Vec<Filter>, ClauseError> {
    let mut per_column: Vec<(usize, Vec<(Operator, Value)>)> = Vec::new();
    for clause in clauses {
        let (name, op, literal) = split_clause(clause)?;
        let column = table.column_index(name)?;
        let value = table.column(column).parse_value(literal);
        match per_column.iter_mut().find(|(c, _)| *c == column) {
            Some((_, bounds)) => bounds.push((op, value)),
            None => per_column.push((column, vec![(op, value)])),
        }
    }

    let mut filters = Vec::new();
    for (column, bounds) in per_column {
        match bounds.as_slice() {
            [(Operator::Ge, low), (Operator::Le, high)]
            | [(Operator::Le, high), (Operator::Ge, low)] => filters.push(Filter::new(
                column,
                Predicate::Range {
                    low: low.clone(),
                    high: high.clone(),
                },
            )),
            _ => {
                for (op, value) in bounds.iter() {
                    filters.push(Filter::new(
                        column,
                        Predicate::from_operator(*op, value.clone()),
                    ));
                }
            }
        }
    }
    Ok(filters)
}

/// Resolve group-by column names to indices
pub fn parse_group_by(table: &Table, names: &[String]) -> Result<Option<Vec<usize>>, ClauseError> {
    if names.is_empty() {
        return Ok(None);
    }
    let indices = names
        .iter()
        .map(|n| table.column_index(n))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbench_core::Column;

    fn table() -> Table {
        Table::new(
            "t",
            vec![
                Column::new("Model Year", (1990..2010).map(Value::Int).collect()),
                Column::new(
                    "State",
                    ["NY", "NJ", "CT", "PA"]
                        .iter()
                        .cycle()
                        .take(20)
                        .map(|s| Value::Text(s.to_string()))
                        .collect(),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_split_clause() {
        assert_eq!(
            split_clause("Model Year >= 2000").unwrap(),
            ("Model Year", Operator::Ge, "2000")
        );
        assert_eq!(split_clause("a<=3").unwrap(), ("a", Operator::Le, "3"));
        assert_eq!(split_clause("a=x").unwrap(), ("a", Operator::Eq, "x"));
        assert!(split_clause("a<3").is_err());
        assert!(split_clause("nothing").is_err());
    }

    #[test]
    fn test_two_bounds_form_a_range() {
        let t = table();
        let filters = parse_where(
            &t,
            &[
                "State=NY".to_string(),
                "Model Year<=2005".to_string(),
                "Model Year>=2001".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(
            filters,
            vec![
                Filter::new(1, Predicate::Eq(Value::Text("NY".to_string()))),
                Filter::new(
                    0,
                    Predicate::Range {
                        low: Value::Int(2001),
                        high: Value::Int(2005),
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_other_combinations_stay_separate() {
        let t = table();
        let filters = parse_where(
            &t,
            &["Model Year<=2005".to_string(), "Model Year<=2003".to_string()],
        )
        .unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters.iter().all(|f| f.column == 0));
    }

    #[test]
    fn test_unknown_column() {
        let t = table();
        let err = parse_where(&t, &["Color=red".to_string()]).unwrap_err();
        assert!(matches!(err, ClauseError::Column(_)));
        assert!(parse_group_by(&t, &["Color".to_string()]).is_err());
    }

    #[test]
    fn test_group_by() {
        let t = table();
        assert_eq!(parse_group_by(&t, &[]).unwrap(), None);
        assert_eq!(
            parse_group_by(&t, &["State".to_string()]).unwrap(),
            Some(vec![1])
        );
    }
}
