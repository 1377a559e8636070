//! Row types of the six warehouse tables.
//!
//! Each row type knows its [`TableSpec`] and lays its values out in that
//! table's column order; the loader narrows them to storage types.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::schema::{
    TableSpec, DIM_CUSTOMER, DIM_EMPLOYEE, DIM_PRODUCT, DIM_SUPPLIER, PURCHASES_FACT, SALES_FACT,
};

/// A prepared value before it is narrowed to its column's storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

pub trait WarehouseRow: Serialize {
    fn spec() -> &'static TableSpec;

    /// Values in `spec().columns` order.
    fn values(&self) -> Vec<Value>;
}

/// A dimension row keyed by an integer surrogate ID.
pub trait DimensionRow: WarehouseRow + Clone {
    fn key(&self) -> i64;
    fn set_key(&mut self, key: i64);
}

fn text(v: &Option<String>) -> Value {
    Value::Text(v.clone())
}

// =============================================================================
// Dimensions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRow {
    pub product_id: i64,
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub standard_cost: Option<f64>,
    pub list_price: Option<f64>,
    pub reorder_level: Option<i64>,
}

impl WarehouseRow for ProductRow {
    fn spec() -> &'static TableSpec {
        &DIM_PRODUCT
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(Some(self.product_id)),
            text(&self.product_code),
            text(&self.product_name),
            text(&self.category),
            Value::Float(self.standard_cost),
            Value::Float(self.list_price),
            Value::Int(self.reorder_level),
        ]
    }
}

impl DimensionRow for ProductRow {
    fn key(&self) -> i64 {
        self.product_id
    }

    fn set_key(&mut self, key: i64) {
        self.product_id = key;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRow {
    pub customer_id: i64,
    pub company: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub country_region: Option<String>,
}

impl WarehouseRow for CustomerRow {
    fn spec() -> &'static TableSpec {
        &DIM_CUSTOMER
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(Some(self.customer_id)),
            text(&self.company),
            text(&self.first_name),
            text(&self.last_name),
            text(&self.city),
            text(&self.country_region),
        ]
    }
}

impl DimensionRow for CustomerRow {
    fn key(&self) -> i64 {
        self.customer_id
    }

    fn set_key(&mut self, key: i64) {
        self.customer_id = key;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeRow {
    pub employee_id: i64,
    pub company: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
}

impl EmployeeRow {
    /// Stand-in for an employee referenced by a fact but absent from both
    /// sources.
    pub fn placeholder(employee_id: i64, tag: &str) -> Self {
        Self {
            employee_id,
            company: Some("Unknown".to_string()),
            first_name: Some(tag.to_string()),
            last_name: Some(format!("ID_{}", employee_id)),
            job_title: Some("Unknown".to_string()),
        }
    }
}

impl WarehouseRow for EmployeeRow {
    fn spec() -> &'static TableSpec {
        &DIM_EMPLOYEE
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(Some(self.employee_id)),
            text(&self.company),
            text(&self.first_name),
            text(&self.last_name),
            text(&self.job_title),
        ]
    }
}

impl DimensionRow for EmployeeRow {
    fn key(&self) -> i64 {
        self.employee_id
    }

    fn set_key(&mut self, key: i64) {
        self.employee_id = key;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierRow {
    pub supplier_id: i64,
    pub company: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub country_region: Option<String>,
}

impl WarehouseRow for SupplierRow {
    fn spec() -> &'static TableSpec {
        &DIM_SUPPLIER
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(Some(self.supplier_id)),
            text(&self.company),
            text(&self.first_name),
            text(&self.last_name),
            text(&self.city),
            text(&self.country_region),
        ]
    }
}

impl DimensionRow for SupplierRow {
    fn key(&self) -> i64 {
        self.supplier_id
    }

    fn set_key(&mut self, key: i64) {
        self.supplier_id = key;
    }
}

// =============================================================================
// Facts
// =============================================================================

/// One order line item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesFact {
    pub order_date: Option<NaiveDateTime>,
    pub customer_key: Option<i64>,
    pub employee_key: Option<i64>,
    pub product_key: Option<i64>,
    pub quantity: Option<i64>,
    pub unit_price: Option<f64>,
    pub discount: f64,
    pub tax_rate: f64,
    pub total_revenue: Option<f64>,
    pub freight_cost: Option<f64>,
    pub order_status: Option<String>,
}

impl WarehouseRow for SalesFact {
    fn spec() -> &'static TableSpec {
        &SALES_FACT
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Timestamp(self.order_date),
            Value::Int(self.customer_key),
            Value::Int(self.employee_key),
            Value::Int(self.product_key),
            Value::Int(self.quantity),
            Value::Float(self.unit_price),
            Value::Float(Some(self.discount)),
            Value::Float(Some(self.tax_rate)),
            Value::Float(self.total_revenue),
            Value::Float(self.freight_cost),
            text(&self.order_status),
        ]
    }
}

/// One purchase-order line item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseFact {
    pub creation_date: Option<NaiveDateTime>,
    pub supplier_key: Option<i64>,
    pub employee_key: Option<i64>,
    pub product_key: Option<i64>,
    pub quantity: Option<i64>,
    pub unit_cost: Option<f64>,
    pub total_purchase_cost: Option<f64>,
}

impl WarehouseRow for PurchaseFact {
    fn spec() -> &'static TableSpec {
        &PURCHASES_FACT
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Timestamp(self.creation_date),
            Value::Int(self.supplier_key),
            Value::Int(self.employee_key),
            Value::Int(self.product_key),
            Value::Int(self.quantity),
            Value::Float(self.unit_cost),
            Value::Float(self.total_purchase_cost),
        ]
    }
}
