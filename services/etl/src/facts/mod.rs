//! Fact Transformers - turn order and purchase-order line items into fact
//! rows, then reconcile their foreign keys against the loaded dimensions.

pub mod purchases;
pub mod sales;

use std::collections::HashMap;

use crate::columns::{parse_int, Columns};
use crate::extract::SourceTable;

/// Equality key for joins. Numeric text compares as a number, so "7" and
/// "7.0" meet; anything else compares verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Int(i64),
    Text(String),
}

fn join_key(raw: &str) -> JoinKey {
    match parse_int(raw) {
        Some(v) => JoinKey::Int(v),
        None => JoinKey::Text(raw.to_string()),
    }
}

/// One side of a join: a table and the resolved columns to read it with.
pub struct JoinSide<'a> {
    pub table: &'a SourceTable,
    pub columns: &'a Columns,
    pub key: &'static str,
}

/// Rows of one table grouped by their join key.
pub struct JoinIndex<'a> {
    rows: HashMap<JoinKey, Vec<&'a [String]>>,
}

impl<'a> JoinIndex<'a> {
    pub fn build(side: &JoinSide<'a>) -> Self {
        let table: &'a SourceTable = side.table;
        let mut rows: HashMap<JoinKey, Vec<&'a [String]>> = HashMap::new();
        for row in &table.rows {
            if let Some(raw) = side.columns.raw(row, side.key) {
                rows.entry(join_key(raw)).or_default().push(row.as_slice());
            }
        }
        Self { rows }
    }

    /// Rows whose key equals `raw`, in table order.
    pub fn matches(&self, raw: &str) -> &[&'a [String]] {
        self.rows
            .get(&join_key(raw))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Inner join, emitting pairs in left-table order. Rows with an empty key
/// never match.
pub fn inner_join<'a>(left: &JoinSide<'a>, right: &JoinSide<'a>) -> Vec<(&'a [String], &'a [String])> {
    let left_table: &'a SourceTable = left.table;
    let index = JoinIndex::build(right);

    let mut joined = Vec::new();
    for row in &left_table.rows {
        let Some(raw) = left.columns.raw(row, left.key) else {
            continue;
        };
        for other in index.matches(raw) {
            joined.push((row.as_slice(), *other));
        }
    }
    joined
}
