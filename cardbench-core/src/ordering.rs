//! Variable Orderings
//!
//! Autoregressive estimators factorize the joint distribution over columns in
//! a fixed variable order. Two equivalent encodings of that order exist and
//! are inverses of each other:
//!
//! - [`VariableOrder`]: element `p` is the natural column visited at position
//!   `p`. This is what [`generate_order`] produces and what `--order` accepts.
//! - [`PositionAssignment`]: element `i` is the position given to natural
//!   column `i`.
//!
//! Keeping them as distinct types means a model variant can state which one it
//! consumes, and the conversion happens in exactly one place.

use crate::table::{Table, TableError};
use thiserror::Error;

/// Errors raised while building or applying an ordering
#[derive(Debug, Error)]
pub enum OrderingError {
    #[error("Invalid ordering {order:?}: not a permutation of 0..{len}")]
    InvalidOrdering { order: Vec<usize>, len: usize },

    #[error("Ordering {order:?} has {got} entries but the model expects {expected} inputs")]
    OrderingMismatch {
        order: Vec<usize>,
        expected: usize,
        got: usize,
    },

    #[error("Group-by column '{0}' is also the aggregate column")]
    GroupByContainsAggregate(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

fn check_permutation(order: &[usize]) -> Result<(), OrderingError> {
    let mut seen = vec![false; order.len()];
    for &idx in order {
        if idx >= order.len() || seen[idx] {
            return Err(OrderingError::InvalidOrdering {
                order: order.to_vec(),
                len: order.len(),
            });
        }
        seen[idx] = true;
    }
    Ok(())
}

/// Invert a permutation.
///
/// `None` means "use the model default" and inverts to `None`.
pub fn invert_order(order: Option<&[usize]>) -> Result<Option<Vec<usize>>, OrderingError> {
    let Some(order) = order else {
        return Ok(None);
    };
    check_permutation(order)?;
    let mut inverse = vec![0; order.len()];
    for (i, &target) in order.iter().enumerate() {
        inverse[target] = i;
    }
    Ok(Some(inverse))
}

/// Position -> natural column index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableOrder(Vec<usize>);

/// Natural column index -> position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionAssignment(Vec<usize>);

impl VariableOrder {
    /// Validate and wrap a permutation
    pub fn new(order: Vec<usize>) -> Result<Self, OrderingError> {
        check_permutation(&order)?;
        Ok(Self(order))
    }

    /// Table order `0..n`
    pub fn natural(n: usize) -> Self {
        Self((0..n).collect())
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the order is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw permutation
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Column visited at `position`
    pub fn column_at(&self, position: usize) -> usize {
        self.0[position]
    }

    /// Convert to the column -> position encoding
    pub fn invert(&self) -> PositionAssignment {
        let mut inverse = vec![0; self.0.len()];
        for (position, &column) in self.0.iter().enumerate() {
            inverse[column] = position;
        }
        PositionAssignment(inverse)
    }

    /// Fail with [`OrderingError::OrderingMismatch`] unless the order covers `expected` inputs.
    pub fn check_len(&self, expected: usize) -> Result<(), OrderingError> {
        if self.0.len() != expected {
            return Err(OrderingError::OrderingMismatch {
                order: self.0.clone(),
                expected,
                got: self.0.len(),
            });
        }
        Ok(())
    }
}

impl PositionAssignment {
    /// Validate and wrap a permutation
    pub fn new(assignment: Vec<usize>) -> Result<Self, OrderingError> {
        check_permutation(&assignment)?;
        Ok(Self(assignment))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the assignment is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw permutation
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Position of natural column `column`
    pub fn position_of(&self, column: usize) -> usize {
        self.0[column]
    }

    /// Convert to the position -> column encoding
    pub fn invert(&self) -> VariableOrder {
        let mut inverse = vec![0; self.0.len()];
        for (column, &position) in self.0.iter().enumerate() {
            inverse[position] = column;
        }
        VariableOrder(inverse)
    }
}

/// Build the order for an aggregate query.
///
/// The aggregate column goes last. Group-by columns, if any, sit immediately
/// before it in the order given. Every other column keeps its table order.
pub fn generate_order(
    table: &Table,
    agg_column: &str,
    group_by: Option<&[String]>,
) -> Result<VariableOrder, OrderingError> {
    let agg_idx = table.column_index(agg_column)?;
    let group_idx = match group_by {
        Some(names) => Some(
            names
                .iter()
                .map(|n| table.column_index(n))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        None => None,
    };
    generate_order_by_index(table.columns().len(), agg_idx, group_idx.as_deref()).map_err(|e| {
        match e {
            OrderingError::GroupByContainsAggregate(_) => {
                OrderingError::GroupByContainsAggregate(agg_column.to_string())
            }
            other => other,
        }
    })
}

/// [`generate_order`] on column indices.
pub fn generate_order_by_index(
    num_columns: usize,
    agg_idx: usize,
    group_by: Option<&[usize]>,
) -> Result<VariableOrder, OrderingError> {
    let mut groups: Vec<usize> = Vec::new();
    for &g in group_by.unwrap_or_default() {
        if g == agg_idx {
            return Err(OrderingError::GroupByContainsAggregate(agg_idx.to_string()));
        }
        if !groups.contains(&g) {
            groups.push(g);
        }
    }

    let mut order: Vec<usize> = (0..num_columns)
        .filter(|i| *i != agg_idx && !groups.contains(i))
        .collect();
    order.extend(groups);
    order.push(agg_idx);
    VariableOrder::new(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use crate::value::Value;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn table(n: usize) -> Table {
        let columns = (0..n)
            .map(|i| Column::new(format!("c{}", i), vec![Value::Int(i as i64)]))
            .collect();
        Table::new("t", columns).unwrap()
    }

    #[test]
    fn test_invert_none_is_none() {
        assert_eq!(invert_order(None).unwrap(), None);
    }

    #[test]
    fn test_invert_known() {
        let inv = invert_order(Some(&[2, 0, 1])).unwrap().unwrap();
        assert_eq!(inv, vec![1, 2, 0]);
    }

    #[test]
    fn test_invert_rejects_non_permutation() {
        assert!(matches!(
            invert_order(Some(&[0, 0, 1])),
            Err(OrderingError::InvalidOrdering { .. })
        ));
        assert!(invert_order(Some(&[0, 3])).is_err());
    }

    #[test]
    fn test_invert_is_involution() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let n = rng.gen_range(0..12);
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut rng);

            let once = invert_order(Some(&order)).unwrap().unwrap();
            let twice = invert_order(Some(&once)).unwrap().unwrap();
            assert_eq!(twice, order);

            let typed = VariableOrder::new(order.clone()).unwrap();
            assert_eq!(typed.invert().invert(), typed);
            for (p, &c) in order.iter().enumerate() {
                assert_eq!(typed.invert().position_of(c), p);
            }
        }
    }

    #[test]
    fn test_generate_order_aggregate_last() {
        let t = table(5);
        let order = generate_order(&t, "c1", None).unwrap();
        assert_eq!(order.as_slice(), &[0, 2, 3, 4, 1]);
    }

    #[test]
    fn test_generate_order_group_by_precedes_aggregate() {
        let t = table(6);
        let groups = vec!["c4".to_string(), "c0".to_string()];
        let order = generate_order(&t, "c2", Some(&groups)).unwrap();
        assert_eq!(order.as_slice(), &[1, 3, 5, 4, 0, 2]);
    }

    #[test]
    fn test_generate_order_invariants_random() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..300 {
            let n = rng.gen_range(2..10);
            let agg = rng.gen_range(0..n);
            let mut others: Vec<usize> = (0..n).filter(|i| *i != agg).collect();
            others.shuffle(&mut rng);
            let k = rng.gen_range(0..n);
            let groups: Vec<usize> = others.into_iter().take(k).collect();
            let group_arg = if groups.is_empty() { None } else { Some(groups.as_slice()) };

            let order = generate_order_by_index(n, agg, group_arg).unwrap();
            let s = order.as_slice();
            assert_eq!(s.len(), n);
            assert_eq!(s[n - 1], agg);
            assert_eq!(s.iter().filter(|&&c| c == agg).count(), 1);
            assert_eq!(&s[n - 1 - groups.len()..n - 1], groups.as_slice());

            let rest: Vec<usize> = s[..n - 1 - groups.len()].to_vec();
            let mut sorted = rest.clone();
            sorted.sort();
            assert_eq!(rest, sorted, "untouched columns keep table order");
        }
    }

    #[test]
    fn test_group_by_with_aggregate_rejected() {
        let t = table(3);
        let groups = vec!["c1".to_string()];
        assert!(matches!(
            generate_order(&t, "c1", Some(&groups)),
            Err(OrderingError::GroupByContainsAggregate(_))
        ));
    }

    #[test]
    fn test_check_len() {
        let order = VariableOrder::natural(3);
        assert!(order.check_len(3).is_ok());
        assert!(matches!(
            order.check_len(4),
            Err(OrderingError::OrderingMismatch { expected: 4, got: 3, .. })
        ));
    }
}
