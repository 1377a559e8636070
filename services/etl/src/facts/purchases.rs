//! Purchases fact - Northwind purchase-order line items.

use tracing::{info, warn};

use super::{inner_join, JoinSide};
use crate::columns::{col, ColumnSpec, Columns};
use crate::error::TransformError;
use crate::extract::{Source, SourceSet};
use crate::model::PurchaseFact;
use crate::reconcile::{reconcile_all, ReconcileStep, DEFAULT_PLACEHOLDER};
use crate::schema::Dimension;
use crate::warehouse::Warehouse;

/// Employee key used when a purchase order has no "Created By".
pub const UNATTRIBUTED_EMPLOYEE: i64 = 0;

const DETAIL_COLUMNS: &[ColumnSpec] = &[
    col("PurchaseOrderID", &["Purchase Order ID"]),
    col("ProductID", &["Product ID"]),
    col("Quantity", &["Quantity"]),
    col("UnitCost", &["Unit Cost"]),
];

const ORDER_COLUMNS: &[ColumnSpec] = &[
    col("PurchaseOrderID", &["ID", "Purchase Order ID"]),
    col("SupplierID", &["Supplier ID"]),
    col("CreatedBy", &["Created By"]),
    col("CreationDate", &["Creation Date"]),
];

fn employee_key(f: &PurchaseFact) -> Option<i64> {
    f.employee_key
}

fn supplier_key(f: &PurchaseFact) -> Option<i64> {
    f.supplier_key
}

fn product_key(f: &PurchaseFact) -> Option<i64> {
    f.product_key
}

/// Reconciliation order for purchases; Employee first, as for sales.
pub const PURCHASE_STEPS: [ReconcileStep<PurchaseFact>; 3] = [
    ReconcileStep {
        dimension: Dimension::Employee,
        key: employee_key,
        placeholder: DEFAULT_PLACEHOLDER,
    },
    ReconcileStep {
        dimension: Dimension::Supplier,
        key: supplier_key,
        placeholder: "Unknown_Supplier",
    },
    ReconcileStep {
        dimension: Dimension::Product,
        key: product_key,
        placeholder: "Unknown_Product",
    },
];

pub fn total_purchase_cost(unit_cost: Option<f64>, quantity: Option<i64>) -> Option<f64> {
    Some(unit_cost? * quantity? as f64)
}

/// Purchase-order line items joined to their purchase orders. Missing files
/// yield no rows; an unresolvable order key or a missing Unit Cost column is
/// an error.
pub fn purchase_facts(set: &SourceSet) -> Result<Vec<PurchaseFact>, TransformError> {
    let (Some(orders), Some(details)) = (set.get("Purchase Orders"), set.get("Purchase Order Details")) else {
        warn!(source = Source::Northwind.tag(), "purchase order files missing, skipping purchases");
        return Ok(Vec::new());
    };

    let oc = Columns::resolve(Source::Northwind, "Purchase Orders", orders, ORDER_COLUMNS);
    let dc = Columns::resolve(Source::Northwind, "Purchase Order Details", details, DETAIL_COLUMNS);
    oc.require("PurchaseOrderID")?;
    dc.require_all(&["PurchaseOrderID", "UnitCost"])?;

    let lines = inner_join(
        &JoinSide { table: details, columns: &dc, key: "PurchaseOrderID" },
        &JoinSide { table: orders, columns: &oc, key: "PurchaseOrderID" },
    );
    info!(rows = lines.len(), "merged purchase records");

    let facts = lines
        .into_iter()
        .map(|(d, o)| {
            let quantity = dc.int(d, "Quantity");
            let unit_cost = dc.float(d, "UnitCost");
            PurchaseFact {
                creation_date: oc.timestamp(o, "CreationDate"),
                supplier_key: oc.key(o, "SupplierID"),
                employee_key: Some(oc.key(o, "CreatedBy").unwrap_or(UNATTRIBUTED_EMPLOYEE)),
                product_key: dc.key(d, "ProductID"),
                quantity,
                unit_cost,
                total_purchase_cost: total_purchase_cost(unit_cost, quantity),
            }
        })
        .collect();

    Ok(facts)
}

/// Drop rows lacking a creation date, supplier or product.
pub fn drop_incomplete(facts: Vec<PurchaseFact>) -> Vec<PurchaseFact> {
    facts
        .into_iter()
        .filter(|f| f.creation_date.is_some() && f.supplier_key.is_some() && f.product_key.is_some())
        .collect()
}

/// Build, reconcile and clean the purchases fact rows. Expects the
/// dimensions to be loaded already.
pub async fn prepare_purchases<W: Warehouse>(
    warehouse: &W,
    northwind: &SourceSet,
    batch_size: usize,
) -> Result<Vec<PurchaseFact>, TransformError> {
    let facts = purchase_facts(northwind)?;
    if facts.is_empty() {
        return Ok(facts);
    }

    let facts = reconcile_all(warehouse, facts, &PURCHASE_STEPS, batch_size).await?;
    let facts = drop_incomplete(facts);
    info!(rows = facts.len(), "purchase rows ready to load");
    Ok(facts)
}
