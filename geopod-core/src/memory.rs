//! In-memory reference container.
//!
//! `MemoryFeatureTable` implements the full row-store contract over a
//! `BTreeMap`, for embedded use and for the test suite. Two details carry
//! the contract's semantics:
//!
//! - **Modification stamps** are monotonic: every write advances
//!   `last_modified` to `max(now_ms, previous + 1)`, so a burst of writes
//!   inside one clock tick still produces strictly increasing stamps.
//! - **Range shadow maintenance** happens inside the same write lock as the
//!   row mutation — the in-memory equivalent of the engine triggers a real
//!   binding installs, consistent by construction whenever the shadow
//!   exists.
//!
//! The predicate grammar is deliberately small: `AND`-joined comparisons
//! (`=`, `!=`, `<>`, `<`, `<=`, `>`, `>=`, `IS NULL`, `IS NOT NULL`) with
//! `?` placeholders. Real bindings hand the fragment to their SQL engine
//! instead.

use crate::error::{Error, Result};
use crate::source::{
    BoxedRowSeq, EnvelopeFn, FeatureSource, Predicate, RangeIndexSupport, RowQuery, VecRowSeq,
    DEFAULT_MAX_BIND_PARAMETERS,
};
use crate::value::{Row, Value};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Trigger-equivalent shadow of envelope bounds per row.
struct Shadow {
    envelope_fn: Arc<EnvelopeFn>,
    entries: FxHashMap<i64, [f64; 4]>,
}

impl Shadow {
    fn reindex_row(&mut self, id: i64, geometry: Option<&[u8]>) {
        match geometry.and_then(|blob| (self.envelope_fn)(blob)) {
            Some(bounds) => {
                self.entries.insert(id, bounds);
            }
            None => {
                self.entries.remove(&id);
            }
        }
    }
}

struct Inner {
    rows: BTreeMap<i64, Row>,
    last_modified: i64,
    shadow: Option<Shadow>,
}

impl Inner {
    fn touch(&mut self) {
        self.last_modified = now_ms().max(self.last_modified + 1);
    }

    fn geometry_blob<'a>(row: &'a Row, geometry_column: &str) -> Option<&'a [u8]> {
        row.get(geometry_column).and_then(Value::as_blob)
    }
}

/// In-memory feature table.
#[derive(Clone)]
pub struct MemoryFeatureTable {
    name: String,
    id_column: String,
    geometry_column: String,
    srs_id: i64,
    max_bind_parameters: usize,
    scalar_functions: bool,
    inner: Arc<RwLock<Inner>>,
}

impl MemoryFeatureTable {
    /// Create an empty table with the conventional `fid`/`geom` columns.
    pub fn new(name: impl Into<String>, srs_id: i64) -> Self {
        Self {
            name: name.into(),
            id_column: "fid".to_string(),
            geometry_column: "geom".to_string(),
            srs_id,
            max_bind_parameters: DEFAULT_MAX_BIND_PARAMETERS,
            scalar_functions: true,
            inner: Arc::new(RwLock::new(Inner {
                rows: BTreeMap::new(),
                last_modified: now_ms(),
                shadow: None,
            })),
        }
    }

    /// Override the geometry column name.
    pub fn with_geometry_column(mut self, name: impl Into<String>) -> Self {
        self.geometry_column = name.into();
        self
    }

    /// Override the bound-parameter ceiling (tests shrink it to force the
    /// over-limit fetch path).
    pub fn with_max_bind_parameters(mut self, limit: usize) -> Self {
        self.max_bind_parameters = limit;
        self
    }

    /// Simulate a runtime without scalar-callback registration.
    pub fn with_scalar_functions(mut self, enabled: bool) -> Self {
        self.scalar_functions = enabled;
        self
    }

    /// Insert or replace a row, advancing the modification stamp and the
    /// range shadow in one critical section.
    pub fn put(&self, row: Row) {
        let mut inner = self.inner.write();
        if let Some(shadow) = inner.shadow.as_mut() {
            let blob = Inner::geometry_blob(&row, &self.geometry_column).map(<[u8]>::to_vec);
            shadow.reindex_row(row.id(), blob.as_deref());
        }
        inner.rows.insert(row.id(), row);
        inner.touch();
    }

    /// Delete a row. Returns whether it existed.
    pub fn delete(&self, feature_id: i64) -> bool {
        let mut inner = self.inner.write();
        let existed = inner.rows.remove(&feature_id).is_some();
        if existed {
            if let Some(shadow) = inner.shadow.as_mut() {
                shadow.entries.remove(&feature_id);
            }
            inner.touch();
        }
        existed
    }

    /// Advance the modification stamp without changing content (the
    /// "table owner wrote something" signal).
    pub fn touch(&self) {
        self.inner.write().touch();
    }

    fn matches(&self, row: &Row, query: &RowQuery, id_filter: Option<&FxHashSet<i64>>) -> Result<bool> {
        if let Some(ids) = id_filter {
            if !ids.contains(&row.id()) {
                return Ok(false);
            }
        }
        if let Some(predicate) = &query.predicate {
            if !eval_predicate(predicate, row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl FeatureSource for MemoryFeatureTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn id_column(&self) -> &str {
        &self.id_column
    }

    fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    fn srs_id(&self) -> i64 {
        self.srs_id
    }

    fn last_modified(&self) -> i64 {
        self.inner.read().last_modified
    }

    fn row_count(&self) -> Result<u64> {
        Ok(self.inner.read().rows.len() as u64)
    }

    fn fetch(&self, feature_id: i64) -> Result<Option<Row>> {
        Ok(self.inner.read().rows.get(&feature_id).cloned())
    }

    fn scan_chunk(&self, limit: usize, offset: u64) -> Result<Vec<Row>> {
        let inner = self.inner.read();
        Ok(inner
            .rows
            .values()
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    fn query(&self, query: &RowQuery) -> Result<BoxedRowSeq> {
        let id_filter: Option<FxHashSet<i64>> = query.id_list.as_ref().map(|list| {
            list.args.iter().filter_map(Value::as_i64).collect()
        });

        let inner = self.inner.read();
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        for row in inner.rows.values() {
            if !self.matches(row, query, id_filter.as_ref())? {
                continue;
            }
            let projected = match &query.columns {
                Some(names) => row.project(names),
                None => row.clone(),
            };
            if query.distinct {
                // Canonical rendering of the projected values stands in for
                // the engine's DISTINCT.
                let key = format!("{:?}", projected.columns());
                if !seen.insert(key) {
                    continue;
                }
            }
            out.push(projected);
        }
        Ok(Box::new(VecRowSeq::new(out)))
    }

    fn max_bind_parameters(&self) -> usize {
        self.max_bind_parameters
    }
}

impl RangeIndexSupport for MemoryFeatureTable {
    fn supports_scalar_functions(&self) -> bool {
        self.scalar_functions
    }

    fn create_range_shadow(&self, envelope_fn: Arc<EnvelopeFn>) -> Result<()> {
        if !self.scalar_functions {
            return Err(Error::unsupported(format!(
                "scalar functions unavailable; cannot maintain range shadow for {}",
                self.name
            )));
        }
        let mut inner = self.inner.write();
        let mut shadow = Shadow {
            envelope_fn,
            entries: FxHashMap::default(),
        };
        for (id, row) in &inner.rows {
            let blob = Inner::geometry_blob(row, &self.geometry_column);
            shadow.reindex_row(*id, blob);
        }
        inner.shadow = Some(shadow);
        Ok(())
    }

    fn drop_range_shadow(&self) -> Result<()> {
        self.inner.write().shadow = None;
        Ok(())
    }

    fn range_shadow_exists(&self) -> bool {
        self.inner.read().shadow.is_some()
    }

    fn range_query(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Vec<i64>> {
        let inner = self.inner.read();
        let shadow = inner.shadow.as_ref().ok_or_else(|| {
            Error::not_found(format!("no range shadow for table {}", self.name))
        })?;
        let mut ids: Vec<i64> = shadow
            .entries
            .iter()
            .filter(|(_, b)| b[0] <= max_x && b[2] >= min_x && b[1] <= max_y && b[3] >= min_y)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

// ============================================================================
// Predicate evaluation
// ============================================================================

/// Evaluate an `AND`-joined comparison predicate against one row.
fn eval_predicate(predicate: &Predicate, row: &Row) -> Result<bool> {
    let mut args = predicate.args.iter();
    for clause in predicate.sql.split(" AND ") {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        if !eval_clause(clause, row, &mut args)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_clause<'a>(
    clause: &str,
    row: &Row,
    args: &mut impl Iterator<Item = &'a Value>,
) -> Result<bool> {
    if let Some(column) = clause.strip_suffix(" IS NOT NULL") {
        return Ok(matches!(row.get(column.trim()), Some(v) if !v.is_null()));
    }
    if let Some(column) = clause.strip_suffix(" IS NULL") {
        return Ok(match row.get(column.trim()) {
            None | Some(Value::Null) => true,
            Some(_) => false,
        });
    }

    // Longest operators first so ">=" is not read as ">".
    for op in ["!=", "<>", ">=", "<=", "=", ">", "<"] {
        if let Some((column, rhs)) = clause.split_once(op) {
            if rhs.trim() != "?" {
                break;
            }
            let arg = args.next().ok_or_else(|| {
                Error::invalid_query(format!("missing argument for clause: {clause}"))
            })?;
            let value = match row.get(column.trim()) {
                Some(v) => v,
                None => return Ok(false),
            };
            let cmp = value.compare(arg);
            return Ok(match op {
                "=" => cmp == Some(Ordering::Equal),
                "!=" | "<>" => matches!(cmp, Some(o) if o != Ordering::Equal),
                ">" => cmp == Some(Ordering::Greater),
                "<" => cmp == Some(Ordering::Less),
                ">=" => matches!(cmp, Some(Ordering::Greater | Ordering::Equal)),
                "<=" => matches!(cmp, Some(Ordering::Less | Ordering::Equal)),
                _ => unreachable!("operator list is fixed"),
            });
        }
    }

    Err(Error::invalid_query(format!(
        "unsupported predicate clause: {clause}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::IdList;

    fn table_with_rows() -> MemoryFeatureTable {
        let table = MemoryFeatureTable::new("piers", 4326);
        table.put(Row::new(1).with("name", "north").with("height", 10i64));
        table.put(Row::new(2).with("name", "south").with("height", 20i64));
        table.put(Row::new(3).with("name", "east").with("height", 20i64));
        table
    }

    fn drain(mut seq: BoxedRowSeq) -> Vec<i64> {
        let mut ids = Vec::new();
        while let Some(row) = seq.next_row().unwrap() {
            ids.push(row.id());
        }
        seq.close();
        ids
    }

    #[test]
    fn test_stamps_strictly_advance() {
        let table = MemoryFeatureTable::new("t", 0);
        let s0 = table.last_modified();
        table.put(Row::new(1));
        let s1 = table.last_modified();
        table.touch();
        let s2 = table.last_modified();
        assert!(s1 > s0);
        assert!(s2 > s1);
    }

    #[test]
    fn test_scan_chunk_pages_in_id_order() {
        let table = table_with_rows();
        let first = table.scan_chunk(2, 0).unwrap();
        let rest = table.scan_chunk(2, 2).unwrap();
        assert_eq!(first.iter().map(Row::id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(rest.iter().map(Row::id).collect::<Vec<_>>(), vec![3]);
        assert!(table.scan_chunk(2, 3).unwrap().is_empty());
    }

    #[test]
    fn test_query_id_list_and_predicate_combine() {
        let table = table_with_rows();
        let query = RowQuery {
            id_list: Some(IdList {
                sql: "fid IN (?, ?)".to_string(),
                args: vec![Value::Integer(2), Value::Integer(3)],
            }),
            predicate: Some(Predicate::new("name = ?", vec![Value::from("south")])),
            ..RowQuery::default()
        };
        assert_eq!(drain(table.query(&query).unwrap()), vec![2]);
    }

    #[test]
    fn test_query_comparison_operators() {
        let table = table_with_rows();
        let query = RowQuery {
            predicate: Some(Predicate::new(
                "height >= ? AND name != ?",
                vec![Value::Integer(20), Value::from("east")],
            )),
            ..RowQuery::default()
        };
        assert_eq!(drain(table.query(&query).unwrap()), vec![2]);
    }

    #[test]
    fn test_query_distinct_projection() {
        let table = table_with_rows();
        let query = RowQuery {
            columns: Some(vec!["height".to_string()]),
            distinct: true,
            ..RowQuery::default()
        };
        let mut seq = table.query(&query).unwrap();
        let mut heights = Vec::new();
        while let Some(row) = seq.next_row().unwrap() {
            heights.push(row.get("height").and_then(Value::as_i64).unwrap());
        }
        seq.close();
        assert_eq!(heights, vec![10, 20]);
    }

    #[test]
    fn test_unsupported_clause_is_rejected() {
        let table = table_with_rows();
        let query = RowQuery {
            predicate: Some(Predicate::new("name LIKE ?", vec![Value::from("n%")])),
            ..RowQuery::default()
        };
        assert!(table.query(&query).is_err());
    }

    #[test]
    fn test_range_shadow_follows_writes() {
        let table = MemoryFeatureTable::new("t", 0);
        table.put(Row::new(1).with("geom", b"0 0".to_vec()));

        let envelope_fn: Arc<EnvelopeFn> = Arc::new(|blob| {
            let text = std::str::from_utf8(blob).ok()?;
            let mut parts = text.split_whitespace();
            let x: f64 = parts.next()?.parse().ok()?;
            let y: f64 = parts.next()?.parse().ok()?;
            Some([x, y, x, y])
        });
        table.create_range_shadow(envelope_fn).unwrap();
        assert!(table.range_shadow_exists());
        assert_eq!(table.range_query(-1.0, -1.0, 1.0, 1.0).unwrap(), vec![1]);

        // Trigger equivalence: writes keep the shadow current.
        table.put(Row::new(2).with("geom", b"5 5".to_vec()));
        assert_eq!(table.range_query(4.0, 4.0, 6.0, 6.0).unwrap(), vec![2]);
        table.delete(2);
        assert!(table.range_query(4.0, 4.0, 6.0, 6.0).unwrap().is_empty());

        table.drop_range_shadow().unwrap();
        assert!(!table.range_shadow_exists());
        assert!(table.range_query(0.0, 0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_range_shadow_requires_scalar_functions() {
        let table = MemoryFeatureTable::new("t", 0).with_scalar_functions(false);
        let envelope_fn: Arc<EnvelopeFn> = Arc::new(|_| None);
        assert!(matches!(
            table.create_range_shadow(envelope_fn),
            Err(Error::Unsupported(_))
        ));
    }
}
