//! Key Reconciler - finds fact rows whose foreign keys do not resolve to a
//! dimension row and repairs them.
//!
//! Two explicit phases:
//! 1. [`find_orphans`] + [`classify`] are pure: they compute the orphan set
//!    and decide what to do with it.
//! 2. [`apply`] performs the decision: it either inserts placeholder rows
//!    into the dimension (Employee only) or drops the orphaned fact rows.
//!
//! Employee orphans are backfilled because employee attribution is wanted
//! but not essential; Customer, Product and Supplier orphans invalidate the
//! fact, so those rows are dropped. Rows with a NULL key are always kept.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::error::TransformError;
use crate::load::load_table;
use crate::model::EmployeeRow;
use crate::schema::Dimension;
use crate::warehouse::Warehouse;

/// Tag written into a placeholder's first name when none is given.
pub const DEFAULT_PLACEHOLDER: &str = "Unknown";

/// One reconciliation pass of a fact table against one dimension.
pub struct ReconcileStep<F> {
    pub dimension: Dimension,
    pub key: fn(&F) -> Option<i64>,
    pub placeholder: &'static str,
}

/// What to do about a set of orphaned keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Every key resolved.
    Clean,
    /// Insert these placeholder rows into the dimension; keep the facts.
    Backfill(Vec<EmployeeRow>),
    /// Remove fact rows carrying any of these keys.
    Drop(BTreeSet<i64>),
}

/// Non-null fact keys that are missing from `existing`.
pub fn find_orphans<F>(facts: &[F], key: fn(&F) -> Option<i64>, existing: &BTreeSet<i64>) -> BTreeSet<i64> {
    facts
        .iter()
        .filter_map(key)
        .filter(|k| !existing.contains(k))
        .collect()
}

pub fn classify(dimension: Dimension, orphaned: BTreeSet<i64>, placeholder: &str) -> Resolution {
    if orphaned.is_empty() {
        return Resolution::Clean;
    }
    match dimension {
        Dimension::Employee => Resolution::Backfill(
            orphaned
                .into_iter()
                .map(|k| EmployeeRow::placeholder(k, placeholder))
                .collect(),
        ),
        Dimension::Customer | Dimension::Product | Dimension::Supplier => Resolution::Drop(orphaned),
    }
}

/// Carry out a [`Resolution`]. A backfill is persisted before this returns;
/// the facts come back unchanged. A drop returns the surviving facts.
pub async fn apply<W: Warehouse, F>(
    warehouse: &W,
    mut facts: Vec<F>,
    key: fn(&F) -> Option<i64>,
    resolution: Resolution,
    batch_size: usize,
) -> Result<Vec<F>, TransformError> {
    match resolution {
        Resolution::Clean => {}
        Resolution::Backfill(rows) => {
            info!(table = Dimension::Employee.table(), rows = rows.len(), "adding placeholder rows");
            load_table(warehouse, &rows, batch_size).await?;
        }
        Resolution::Drop(orphaned) => {
            let before = facts.len();
            facts.retain(|f| key(f).map_or(true, |k| !orphaned.contains(&k)));
            info!(removed = before - facts.len(), kept = facts.len(), "dropped orphaned fact rows");
        }
    }
    Ok(facts)
}

/// Run one step against the dimension's current keys.
pub async fn reconcile<W: Warehouse, F>(
    warehouse: &W,
    facts: Vec<F>,
    step: &ReconcileStep<F>,
    batch_size: usize,
) -> Result<Vec<F>, TransformError> {
    let dimension = step.dimension;
    let existing = warehouse
        .fetch_keys(dimension.table(), dimension.key_column())
        .await?;
    let orphaned = find_orphans(&facts, step.key, &existing);

    if !orphaned.is_empty() {
        let preview: Vec<i64> = orphaned.iter().take(10).copied().collect();
        warn!(
            table = dimension.table(),
            count = orphaned.len(),
            first = ?preview,
            "orphaned keys found"
        );
    }

    let resolution = classify(dimension, orphaned, step.placeholder);
    apply(warehouse, facts, step.key, resolution, batch_size).await
}

/// Run `steps` strictly in order. Order matters: a backfill step must come
/// before any dropping step, or rows it would have kept may already be gone.
pub async fn reconcile_all<W: Warehouse, F>(
    warehouse: &W,
    mut facts: Vec<F>,
    steps: &[ReconcileStep<F>],
    batch_size: usize,
) -> Result<Vec<F>, TransformError> {
    for step in steps {
        facts = reconcile(warehouse, facts, step, batch_size).await?;
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ensure_schema, DIM_EMPLOYEE_TABLE};
    use crate::warehouse::{Cell, MemoryWarehouse};

    #[derive(Debug, Clone, PartialEq)]
    struct Line {
        customer: Option<i64>,
        employee: Option<i64>,
    }

    fn customer_key(l: &Line) -> Option<i64> {
        l.customer
    }

    fn employee_key(l: &Line) -> Option<i64> {
        l.employee
    }

    fn line(customer: Option<i64>, employee: Option<i64>) -> Line {
        Line { customer, employee }
    }

    #[test]
    fn test_find_orphans_ignores_nulls() {
        let facts = vec![line(Some(1), None), line(None, None), line(Some(5), None), line(Some(5), None)];
        let existing: BTreeSet<i64> = [1, 2].into_iter().collect();
        let orphans = find_orphans(&facts, customer_key, &existing);
        assert_eq!(orphans, [5].into_iter().collect());
    }

    #[test]
    fn test_classify_employee_backfills() {
        let res = classify(Dimension::Employee, [9999].into_iter().collect(), "Unknown");
        assert_eq!(res, Resolution::Backfill(vec![EmployeeRow::placeholder(9999, "Unknown")]));
    }

    #[test]
    fn test_classify_other_dimensions_drop() {
        for dim in [Dimension::Customer, Dimension::Product, Dimension::Supplier] {
            let res = classify(dim, [7].into_iter().collect(), "Unknown_X");
            assert_eq!(res, Resolution::Drop([7].into_iter().collect()));
        }
    }

    #[test]
    fn test_classify_empty_is_clean() {
        assert_eq!(classify(Dimension::Employee, BTreeSet::new(), "Unknown"), Resolution::Clean);
    }

    #[tokio::test]
    async fn test_apply_drop_keeps_null_keys() {
        let w = MemoryWarehouse::new();
        let facts = vec![line(Some(1), None), line(Some(7), None), line(None, None)];
        let kept = apply(&w, facts, customer_key, Resolution::Drop([7].into_iter().collect()), 1000)
            .await
            .unwrap();
        assert_eq!(kept, vec![line(Some(1), None), line(None, None)]);
    }

    #[tokio::test]
    async fn test_employee_orphan_backfilled_and_fact_retained() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();

        let step = ReconcileStep {
            dimension: Dimension::Employee,
            key: employee_key,
            placeholder: DEFAULT_PLACEHOLDER,
        };
        let facts = vec![line(Some(1), Some(9999))];
        let kept = reconcile(&w, facts.clone(), &step, 1000).await.unwrap();
        assert_eq!(kept, facts);

        let rows = w.rows(DIM_EMPLOYEE_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Cell::Int(Some(9999)));
        assert_eq!(rows[0][2], Cell::Text(Some("Unknown".into())));
        assert_eq!(rows[0][3], Cell::Text(Some("ID_9999".into())));
    }

    #[tokio::test]
    async fn test_customer_orphan_dropped_without_dimension_change() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();

        let step = ReconcileStep {
            dimension: Dimension::Customer,
            key: customer_key,
            placeholder: "Unknown_Customer",
        };
        let kept = reconcile(&w, vec![line(Some(3), None), line(None, None)], &step, 1000)
            .await
            .unwrap();
        assert_eq!(kept, vec![line(None, None)]);
        assert_eq!(w.count_rows(crate::schema::DIM_CUSTOMER_TABLE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_all_runs_in_order() {
        let w = MemoryWarehouse::new();
        ensure_schema(&w).await.unwrap();

        let steps = [
            ReconcileStep {
                dimension: Dimension::Employee,
                key: employee_key,
                placeholder: DEFAULT_PLACEHOLDER,
            },
            ReconcileStep {
                dimension: Dimension::Customer,
                key: customer_key,
                placeholder: "Unknown_Customer",
            },
        ];
        // Employee 42 is patched even though its row is dropped afterwards
        let kept = reconcile_all(&w, vec![line(Some(3), Some(42))], &steps, 1000)
            .await
            .unwrap();
        assert!(kept.is_empty());
        assert_eq!(w.count_rows(DIM_EMPLOYEE_TABLE).await.unwrap(), 1);
    }
}
