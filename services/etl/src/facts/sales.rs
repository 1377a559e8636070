//! Sales fact - order line items from both sources.
//!
//! Each source is processed on its own, the results are concatenated
//! (Northwind first), reconciled against the Employee, Customer and Product
//! dimensions in that order, and rows missing a required field are dropped.

use tracing::{info, warn};

use super::{inner_join, JoinIndex, JoinSide};
use crate::columns::{col, in_key_range, ColumnSpec, Columns};
use crate::error::TransformError;
use crate::extract::{Source, SourceSet};
use crate::model::SalesFact;
use crate::reconcile::{reconcile_all, ReconcileStep, DEFAULT_PLACEHOLDER};
use crate::schema::Dimension;
use crate::warehouse::Warehouse;

/// Flat offset added to every SQL Server fact foreign key.
///
/// Dimensions offset SQL Server keys by `max(northwind keys) + 1000`
/// instead, so the two only agree when the Northwind maximum is zero. Facts
/// whose offset key misses the dimension are then handled by the
/// reconciler like any other orphan.
pub const FACT_KEY_OFFSET: i64 = 1000;

/// Freight at or above this amount attracts [`FREIGHT_TAX_RATE`].
pub const FREIGHT_TAX_THRESHOLD: f64 = 500.0;
pub const FREIGHT_TAX_RATE: f64 = 0.10;

const NW_DETAIL_COLUMNS: &[ColumnSpec] = &[
    col("OrderID", &["Order ID"]),
    col("ProductID", &["Product ID"]),
    col("Quantity", &["Quantity"]),
    col("UnitPrice", &["Unit Price"]),
    col("Discount", &["Discount"]),
];

const NW_ORDER_COLUMNS: &[ColumnSpec] = &[
    col("OrderID", &["Order ID"]),
    col("OrderDate", &["Order Date"]),
    col("CustomerID", &["Customer ID"]),
    col("EmployeeID", &["Employee ID"]),
    col("StatusID", &["Status ID"]),
    col("ShippingFee", &["Shipping Fee"]),
];

const NW_STATUS_COLUMNS: &[ColumnSpec] = &[
    col("StatusID", &["ID", "Status ID"]),
    col("StatusName", &["Status Name"]),
];

const SQL_DETAIL_COLUMNS: &[ColumnSpec] = &[
    col("OrderID", &["OrderID", "Order ID"]),
    col("ProductID", &["ProductID", "Product ID"]),
    col("Quantity", &["Quantity"]),
    col("UnitPrice", &["UnitPrice", "Unit Price"]),
    col("Discount", &["Discount"]),
];

const SQL_ORDER_COLUMNS: &[ColumnSpec] = &[
    col("OrderID", &["OrderID", "Order ID"]),
    col("OrderDate", &["OrderDate", "Order Date"]),
    col("CustomerID", &["CustomerID", "Customer ID"]),
    col("EmployeeID", &["EmployeeID", "Employee ID"]),
    col("Freight", &["Freight", "Shipping Fee"]),
    col("OrderStatus", &["Status", "OrderStatus", "Status Name", "Order Status"]),
];

fn employee_key(f: &SalesFact) -> Option<i64> {
    f.employee_key
}

fn customer_key(f: &SalesFact) -> Option<i64> {
    f.customer_key
}

fn product_key(f: &SalesFact) -> Option<i64> {
    f.product_key
}

/// Reconciliation order for sales. Employee comes first: it is the only
/// additive step, so it must see every row before the dropping steps run.
pub const SALES_STEPS: [ReconcileStep<SalesFact>; 3] = [
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
    ReconcileStep {
        dimension: Dimension::Product,
        key: product_key,
        placeholder: "Unknown_Product",
    },
];

/// `UnitPrice * Quantity * (1 - Discount)`; unknown when price or quantity
/// is.
pub fn total_revenue(unit_price: Option<f64>, quantity: Option<i64>, discount: f64) -> Option<f64> {
    Some(unit_price? * quantity? as f64 * (1.0 - discount))
}

pub fn tax_rate(freight: Option<f64>) -> f64 {
    match freight {
        Some(f) if f >= FREIGHT_TAX_THRESHOLD => FREIGHT_TAX_RATE,
        _ => 0.0,
    }
}

/// Shift a SQL Server key; a key pushed out of INTEGER range reads as NULL.
fn offset(key: Option<i64>) -> Option<i64> {
    key?.checked_add(FACT_KEY_OFFSET).filter(|k| in_key_range(*k))
}

/// Northwind line items joined to their orders and order statuses. `None`
/// when one of the three files is missing.
pub fn northwind_sales(set: &SourceSet) -> Result<Option<Vec<SalesFact>>, TransformError> {
    let (Some(orders), Some(details), Some(statuses)) =
        (set.get("Orders"), set.get("Order Details"), set.get("Orders Status"))
    else {
        warn!(source = Source::Northwind.tag(), "orders, order details or order status missing, skipping");
        return Ok(None);
    };

    let dc = Columns::resolve(Source::Northwind, "Order Details", details, NW_DETAIL_COLUMNS);
    let oc = Columns::resolve(Source::Northwind, "Orders", orders, NW_ORDER_COLUMNS);
    let sc = Columns::resolve(Source::Northwind, "Orders Status", statuses, NW_STATUS_COLUMNS);
    dc.require("OrderID")?;
    oc.require_all(&["OrderID", "StatusID"])?;
    sc.require("StatusID")?;

    let lines = inner_join(
        &JoinSide { table: details, columns: &dc, key: "OrderID" },
        &JoinSide { table: orders, columns: &oc, key: "OrderID" },
    );

    let status_index = JoinIndex::build(&JoinSide { table: statuses, columns: &sc, key: "StatusID" });
    let mut facts = Vec::with_capacity(lines.len());
    for (d, o) in lines {
        let Some(status_id) = oc.raw(o, "StatusID") else {
            continue;
        };
        for s in status_index.matches(status_id) {
            let quantity = dc.int(d, "Quantity");
            let unit_price = dc.float(d, "UnitPrice");
            let discount = dc.float(d, "Discount").unwrap_or(0.0);
            let freight = oc.float(o, "ShippingFee");

            facts.push(SalesFact {
                order_date: oc.timestamp(o, "OrderDate"),
                customer_key: oc.key(o, "CustomerID"),
                employee_key: oc.key(o, "EmployeeID"),
                product_key: dc.key(d, "ProductID"),
                quantity,
                unit_price,
                discount,
                tax_rate: tax_rate(freight),
                total_revenue: total_revenue(unit_price, quantity, discount),
                freight_cost: freight,
                order_status: sc.text(s, "StatusName"),
            });
        }
    }

    info!(source = Source::Northwind.tag(), rows = facts.len(), "sales rows built");
    Ok(Some(facts))
}

/// SQL Server line items joined to their orders, keys shifted by
/// [`FACT_KEY_OFFSET`]. `None` when either file is missing.
pub fn sqlserver_sales(set: &SourceSet) -> Result<Option<Vec<SalesFact>>, TransformError> {
    let (Some(orders), Some(details)) = (set.get("Orders"), set.get("Order Details")) else {
        warn!(source = Source::SqlServer.tag(), "orders or order details missing, skipping");
        return Ok(None);
    };

    let dc = Columns::resolve(Source::SqlServer, "Order Details", details, SQL_DETAIL_COLUMNS);
    let oc = Columns::resolve(Source::SqlServer, "Orders", orders, SQL_ORDER_COLUMNS);
    dc.require("OrderID")?;
    oc.require("OrderID")?;

    let lines = inner_join(
        &JoinSide { table: details, columns: &dc, key: "OrderID" },
        &JoinSide { table: orders, columns: &oc, key: "OrderID" },
    );

    let facts: Vec<SalesFact> = lines
        .into_iter()
        .map(|(d, o)| {
            let quantity = dc.int(d, "Quantity");
            let unit_price = dc.float_or(d, "UnitPrice", 0.0);
            let discount = dc.float_or(d, "Discount", 0.0).unwrap_or(0.0);
            let freight = oc.float_or(o, "Freight", 0.0);
            let order_status = if oc.has("OrderStatus") {
                oc.text(o, "OrderStatus")
            } else {
                Some("Unknown".to_string())
            };

            SalesFact {
                order_date: oc.timestamp(o, "OrderDate"),
                customer_key: offset(oc.key(o, "CustomerID")),
                employee_key: offset(oc.key(o, "EmployeeID")),
                product_key: offset(dc.key(d, "ProductID")),
                quantity,
                unit_price,
                discount,
                tax_rate: tax_rate(freight),
                total_revenue: total_revenue(unit_price, quantity, discount),
                freight_cost: freight,
                order_status,
            }
        })
        .collect();

    info!(source = Source::SqlServer.tag(), rows = facts.len(), "sales rows built");
    Ok(Some(facts))
}

/// Both sources' sales rows, Northwind first.
pub fn combine_sales(northwind: &SourceSet, sqlserver: &SourceSet) -> Result<Vec<SalesFact>, TransformError> {
    let mut all = Vec::new();
    if let Some(rows) = northwind_sales(northwind)? {
        all.extend(rows);
    }
    if let Some(rows) = sqlserver_sales(sqlserver)? {
        all.extend(rows);
    }
    Ok(all)
}

/// Drop rows lacking an order date, customer or product.
pub fn drop_incomplete(facts: Vec<SalesFact>) -> Vec<SalesFact> {
    facts
        .into_iter()
        .filter(|f| f.order_date.is_some() && f.customer_key.is_some() && f.product_key.is_some())
        .collect()
}

/// Build, reconcile and clean the sales fact rows. Expects the dimensions
/// to be loaded already.
pub async fn prepare_sales<W: Warehouse>(
    warehouse: &W,
    northwind: &SourceSet,
    sqlserver: &SourceSet,
    batch_size: usize,
) -> Result<Vec<SalesFact>, TransformError> {
    let facts = combine_sales(northwind, sqlserver)?;
    if facts.is_empty() {
        warn!("no sales data available");
        return Ok(facts);
    }
    info!(rows = facts.len(), "merged sales rows");

    let facts = reconcile_all(warehouse, facts, &SALES_STEPS, batch_size).await?;
    let facts = drop_incomplete(facts);
    info!(rows = facts.len(), "sales rows ready to load");
    Ok(facts)
}
