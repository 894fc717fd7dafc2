//! Nested ID query builder.
//!
//! Spatial hits arrive as feature ids. Before they can become a row fetch,
//! the id set has to respect the engine's bound-parameter ceiling: a
//! statement may carry only so many `?` placeholders. Below the ceiling
//! the set renders as an IN-clause fragment; above it, callers run the
//! predicate-only query and post-filter rows through [`NestedIdQuery::contains`],
//! keeping the rendered parameter count independent of result-set size.

use geopod_core::{IdList, Value};
use rustc_hash::FxHashSet;

/// Deduplicated, insertion-ordered feature-id set.
///
/// `to_sql` and `to_args` agree on ordering for one instance: both follow
/// insertion order.
#[derive(Debug, Default, Clone)]
pub struct NestedIdQuery {
    ids: Vec<i64>,
    seen: FxHashSet<i64>,
}

impl NestedIdQuery {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect from an id iterator, deduplicating in encounter order.
    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut query = Self::new();
        for id in ids {
            query.add(id);
        }
        query
    }

    /// Add an id; returns false if it was already present.
    pub fn add(&mut self, id: i64) -> bool {
        if self.seen.insert(id) {
            self.ids.push(id);
            true
        } else {
            false
        }
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when no ids were collected.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// O(1) membership test (the post-filter fast path).
    pub fn contains(&self, id: i64) -> bool {
        self.seen.contains(&id)
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Whether rendering this set plus `extra_params` further placeholders
    /// would exceed the engine's `max_params` ceiling.
    pub fn above_limit(&self, extra_params: usize, max_params: usize) -> bool {
        self.ids.len() + extra_params > max_params
    }

    /// Render the IN-clause fragment, e.g. `"fid IN (?, ?, ?)"`.
    pub fn to_sql(&self, id_column: &str) -> String {
        let mut sql = String::with_capacity(id_column.len() + 6 + self.ids.len() * 3);
        sql.push_str(id_column);
        sql.push_str(" IN (");
        for i in 0..self.ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
        }
        sql.push(')');
        sql
    }

    /// Arguments matching [`to_sql`](Self::to_sql)'s placeholder order.
    pub fn to_args(&self) -> Vec<Value> {
        self.ids.iter().map(|id| Value::Integer(*id)).collect()
    }

    /// Bundle fragment and args for the container's query primitive.
    pub fn to_id_list(&self, id_column: &str) -> IdList {
        IdList {
            sql: self.to_sql(id_column),
            args: self.to_args(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserves_insertion_order() {
        let query = NestedIdQuery::from_ids([5, 3, 5, 9, 3, 1]);
        assert_eq!(query.ids(), &[5, 3, 9, 1]);
        assert_eq!(query.len(), 4);
        assert!(query.contains(9));
        assert!(!query.contains(7));
    }

    #[test]
    fn test_sql_and_args_agree_on_order() {
        let query = NestedIdQuery::from_ids([42, 7, 13]);
        assert_eq!(query.to_sql("fid"), "fid IN (?, ?, ?)");
        assert_eq!(
            query.to_args(),
            vec![Value::Integer(42), Value::Integer(7), Value::Integer(13)]
        );
    }

    #[test]
    fn test_empty_set_renders_empty_list() {
        let query = NestedIdQuery::new();
        assert!(query.is_empty());
        assert_eq!(query.to_sql("fid"), "fid IN ()");
        assert!(query.to_args().is_empty());
    }

    #[test]
    fn test_above_limit_counts_extra_params() {
        let query = NestedIdQuery::from_ids(0..997);
        assert!(!query.above_limit(2, 999));
        assert!(query.above_limit(3, 999));
        assert!(query.above_limit(0, 996));
    }
}
