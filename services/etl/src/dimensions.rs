//! Dimension Merger - builds the four dimension tables from both sources.
//!
//! Each source is mapped onto the canonical row type on its own. When both
//! yield rows, the SQL Server keys are shifted past the Northwind key range
//! by `max(northwind keys) + 1000` and the two are concatenated, Northwind
//! first. Rows whose key does not parse as an INTEGER, or whose shifted key
//! no longer fits one, are dropped.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::columns::{col, in_key_range, split_contact_name, ColumnSpec, Columns};
use crate::error::TransformError;
use crate::extract::{Source, SourceSet, SourceTable};
use crate::model::{CustomerRow, DimensionRow, EmployeeRow, ProductRow, SupplierRow};

/// Gap left between the Northwind key range and shifted SQL Server keys.
pub const DIMENSION_KEY_GAP: i64 = 1000;

const NW_PRODUCT: &[ColumnSpec] = &[
    col("ProductID", &["ID"]),
    col("ProductCode", &["Product Code"]),
    col("ProductName", &["Product Name"]),
    col("Category", &["Category"]),
    col("StandardCost", &["Standard Cost"]),
    col("ListPrice", &["List Price"]),
    col("ReorderLevel", &["Reorder Level"]),
];

const SQL_PRODUCT: &[ColumnSpec] = &[
    col("ProductID", &["ProductID", "Product ID"]),
    col("ProductCode", &["ProductCode"]),
    col("ProductName", &["ProductName", "Product Name"]),
    col("CategoryID", &["CategoryID"]),
    col("StandardCost", &["StandardCost"]),
    col("ListPrice", &["UnitPrice", "List Price"]),
    col("ReorderLevel", &["ReorderLevel"]),
];

const SQL_CATEGORY: &[ColumnSpec] = &[
    col("CategoryID", &["CategoryID"]),
    col("CategoryName", &["CategoryName"]),
];

const NW_PARTY: &[ColumnSpec] = &[
    col("ID", &["ID"]),
    col("Company", &["Company"]),
    col("FirstName", &["First Name"]),
    col("LastName", &["Last Name"]),
    col("City", &["City"]),
    col("CountryRegion", &["Country/Region"]),
];

const SQL_CUSTOMER: &[ColumnSpec] = &[
    col("ID", &["CustomerID", "Customer ID"]),
    col("Company", &["CompanyName", "Company"]),
    col("ContactName", &["ContactName"]),
    col("City", &["City"]),
    col("CountryRegion", &["Country", "CountryRegion"]),
];

const SQL_SUPPLIER: &[ColumnSpec] = &[
    col("ID", &["SupplierID", "Supplier ID"]),
    col("Company", &["CompanyName", "Company"]),
    col("ContactName", &["ContactName"]),
    col("City", &["City"]),
    col("CountryRegion", &["Country", "CountryRegion"]),
];

const NW_EMPLOYEE: &[ColumnSpec] = &[
    col("EmployeeID", &["ID"]),
    col("Company", &["Company"]),
    col("FirstName", &["First Name"]),
    col("LastName", &["Last Name"]),
    col("JobTitle", &["Job Title"]),
];

const SQL_EMPLOYEE: &[ColumnSpec] = &[
    col("EmployeeID", &["EmployeeID", "Employee ID"]),
    col("Company", &["Company"]),
    col("FirstName", &["FirstName", "First Name"]),
    col("LastName", &["LastName", "Last Name"]),
    col("JobTitle", &["Title", "Job Title"]),
];

/// Company given to SQL Server employees when the export has none.
pub const DEFAULT_EMPLOYEE_COMPANY: &str = "Northwind Traders";

/// Category given to SQL Server products that cannot be joined to one.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// The four merged dimension tables, ready to load.
#[derive(Debug, Default)]
pub struct Dimensions {
    pub products: Vec<ProductRow>,
    pub customers: Vec<CustomerRow>,
    pub employees: Vec<EmployeeRow>,
    pub suppliers: Vec<SupplierRow>,
}

/// Concatenate both sources' rows, shifting `sqlserver` keys past the
/// Northwind range when both are non-empty. A lone source passes through
/// unchanged.
pub fn merge_keyed<R: DimensionRow>(northwind: Vec<R>, sqlserver: Vec<R>) -> Vec<R> {
    let Some(max_key) = northwind.iter().map(|r| r.key()).max() else {
        return sqlserver;
    };
    if sqlserver.is_empty() {
        return northwind;
    }

    let offset = max_key.saturating_add(DIMENSION_KEY_GAP);
    let total = sqlserver.len();
    let shifted: Vec<R> = sqlserver
        .into_iter()
        .filter_map(|mut row| {
            let key = row.key().checked_add(offset).filter(|k| in_key_range(*k))?;
            row.set_key(key);
            Some(row)
        })
        .collect();
    if shifted.len() < total {
        warn!(dropped = total - shifted.len(), offset, "shifted keys out of INTEGER range, rows dropped");
    }

    let mut merged = northwind;
    merged.extend(shifted);
    merged
}

/// Map every row that has a parseable key; the rest are dropped.
fn keyed_rows<R>(
    table: &SourceTable,
    columns: &Columns,
    key_field: &str,
    build: impl Fn(i64, &[String]) -> R,
) -> Vec<R> {
    table
        .rows
        .iter()
        .filter_map(|row| columns.key(row, key_field).map(|key| build(key, row)))
        .collect()
}

fn log_rows(source: Source, dimension: &str, count: usize) {
    info!(source = source.tag(), dimension, rows = count, "dimension rows mapped");
}

// =============================================================================
// Products
// =============================================================================

fn northwind_products(set: &SourceSet) -> Result<Vec<ProductRow>, TransformError> {
    let Some(table) = set.get("Products") else {
        return Ok(Vec::new());
    };
    let c = Columns::resolve(Source::Northwind, "Products", table, NW_PRODUCT);
    c.require("ProductID")?;

    let rows = keyed_rows(table, &c, "ProductID", |product_id, r| ProductRow {
        product_id,
        product_code: c.text_or(r, "ProductCode", ""),
        product_name: c.text_or(r, "ProductName", ""),
        category: c.text_or(r, "Category", ""),
        standard_cost: c.float_or(r, "StandardCost", 0.0),
        list_price: c.float_or(r, "ListPrice", 0.0),
        reorder_level: c.int_or(r, "ReorderLevel", 0),
    });
    log_rows(Source::Northwind, "product", rows.len());
    Ok(rows)
}

/// CategoryID -> CategoryName, `None` when there is no Categories table.
fn category_names(set: &SourceSet) -> Option<HashMap<i64, String>> {
    let table = set.get("Categories")?;
    let c = Columns::resolve(Source::SqlServer, "Categories", table, SQL_CATEGORY);
    let names = table
        .rows
        .iter()
        .filter_map(|r| Some((c.int(r, "CategoryID")?, c.text(r, "CategoryName")?)))
        .collect();
    Some(names)
}

fn sqlserver_products(set: &SourceSet) -> Result<Vec<ProductRow>, TransformError> {
    let Some(table) = set.get("Products") else {
        return Ok(Vec::new());
    };
    let c = Columns::resolve(Source::SqlServer, "Products", table, SQL_PRODUCT);
    c.require("ProductID")?;

    let categories = category_names(set).filter(|_| c.has("CategoryID"));

    let rows = keyed_rows(table, &c, "ProductID", |product_id, r| {
        let category = match &categories {
            Some(names) => c
                .int(r, "CategoryID")
                .and_then(|id| names.get(&id).cloned()),
            None => Some(UNKNOWN_CATEGORY.to_string()),
        };
        ProductRow {
            product_id,
            product_code: c.text_or(r, "ProductCode", ""),
            product_name: c.text_or(r, "ProductName", ""),
            category,
            standard_cost: c.float_or(r, "StandardCost", 0.0),
            list_price: c.float_or(r, "ListPrice", 0.0),
            reorder_level: c.int_or(r, "ReorderLevel", 0),
        }
    });
    log_rows(Source::SqlServer, "product", rows.len());
    Ok(rows)
}

// =============================================================================
// Customers and suppliers
// =============================================================================

/// Northwind customers and suppliers share one layout.
fn northwind_parties<R>(
    set: &SourceSet,
    table_name: &'static str,
    build: impl Fn(i64, &Columns, &[String]) -> R,
) -> Result<Vec<R>, TransformError> {
    let Some(table) = set.get(table_name) else {
        return Ok(Vec::new());
    };
    let c = Columns::resolve(Source::Northwind, table_name, table, NW_PARTY);
    c.require("ID")?;
    let rows = keyed_rows(table, &c, "ID", |id, r| build(id, &c, r));
    log_rows(Source::Northwind, table_name, rows.len());
    Ok(rows)
}

/// Party fields as `(company, first, last, city, country)`.
type Party = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn northwind_party(c: &Columns, r: &[String]) -> Party {
    (
        c.text_or(r, "Company", ""),
        c.text_or(r, "FirstName", ""),
        c.text_or(r, "LastName", ""),
        c.text_or(r, "City", ""),
        c.text_or(r, "CountryRegion", ""),
    )
}

fn sqlserver_party(c: &Columns, r: &[String]) -> Party {
    let (first, last) = if c.has("ContactName") {
        split_contact_name(c.raw(r, "ContactName"))
    } else {
        (Some(String::new()), Some(String::new()))
    };
    (
        c.text_or(r, "Company", ""),
        first,
        last,
        c.text_or(r, "City", ""),
        c.text_or(r, "CountryRegion", ""),
    )
}

/// SQL Server customers and suppliers: one ContactName split into first and
/// last name.
fn sqlserver_parties<R>(
    set: &SourceSet,
    table_name: &'static str,
    specs: &'static [ColumnSpec],
    build: impl Fn(i64, Party) -> R,
) -> Result<Vec<R>, TransformError> {
    let Some(table) = set.get(table_name) else {
        return Ok(Vec::new());
    };
    let c = Columns::resolve(Source::SqlServer, table_name, table, specs);
    c.require("ID")?;
    let rows = keyed_rows(table, &c, "ID", |id, r| build(id, sqlserver_party(&c, r)));
    log_rows(Source::SqlServer, table_name, rows.len());
    Ok(rows)
}

fn customer(customer_id: i64, (company, first_name, last_name, city, country_region): Party) -> CustomerRow {
    CustomerRow {
        customer_id,
        company,
        first_name,
        last_name,
        city,
        country_region,
    }
}

fn supplier(supplier_id: i64, (company, first_name, last_name, city, country_region): Party) -> SupplierRow {
    SupplierRow {
        supplier_id,
        company,
        first_name,
        last_name,
        city,
        country_region,
    }
}

// =============================================================================
// Employees
// =============================================================================

fn northwind_employees(set: &SourceSet) -> Result<Vec<EmployeeRow>, TransformError> {
    let Some(table) = set.get("Employees") else {
        return Ok(Vec::new());
    };
    let c = Columns::resolve(Source::Northwind, "Employees", table, NW_EMPLOYEE);
    c.require("EmployeeID")?;

    let rows = keyed_rows(table, &c, "EmployeeID", |employee_id, r| EmployeeRow {
        employee_id,
        company: c.text_or(r, "Company", ""),
        first_name: c.text_or(r, "FirstName", ""),
        last_name: c.text_or(r, "LastName", ""),
        job_title: c.text_or(r, "JobTitle", ""),
    });
    log_rows(Source::Northwind, "employee", rows.len());
    Ok(rows)
}

fn sqlserver_employees(set: &SourceSet) -> Result<Vec<EmployeeRow>, TransformError> {
    let Some(table) = set.get("Employees") else {
        return Ok(Vec::new());
    };
    let c = Columns::resolve(Source::SqlServer, "Employees", table, SQL_EMPLOYEE);
    c.require("EmployeeID")?;

    let rows = keyed_rows(table, &c, "EmployeeID", |employee_id, r| EmployeeRow {
        employee_id,
        company: c.text_or(r, "Company", DEFAULT_EMPLOYEE_COMPANY),
        first_name: c.text_or(r, "FirstName", ""),
        last_name: c.text_or(r, "LastName", ""),
        job_title: c.text_or(r, "JobTitle", ""),
    });
    log_rows(Source::SqlServer, "employee", rows.len());
    Ok(rows)
}

// =============================================================================
// Merge
// =============================================================================

/// Build all four dimensions. Any error here is fatal to the run.
pub fn merge_dimensions(northwind: &SourceSet, sqlserver: &SourceSet) -> Result<Dimensions, TransformError> {
    let products = merge_keyed(northwind_products(northwind)?, sqlserver_products(sqlserver)?);
    let customers = merge_keyed(
        northwind_parties(northwind, "Customers", |id, c, r| customer(id, northwind_party(c, r)))?,
        sqlserver_parties(sqlserver, "Customers", SQL_CUSTOMER, customer)?,
    );
    let employees = merge_keyed(northwind_employees(northwind)?, sqlserver_employees(sqlserver)?);
    let suppliers = merge_keyed(
        northwind_parties(northwind, "Suppliers", |id, c, r| supplier(id, northwind_party(c, r)))?,
        sqlserver_parties(sqlserver, "Suppliers", SQL_SUPPLIER, supplier)?,
    );

    info!(
        products = products.len(),
        customers = customers.len(),
        employees = employees.len(),
        suppliers = suppliers.len(),
        "dimensions merged"
    );

    Ok(Dimensions {
        products,
        customers,
        employees,
        suppliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(source: Source, tables: &[(&str, &str)]) -> SourceSet {
        let mut s = SourceSet::new(source);
        for (name, csv) in tables {
            s.insert(SourceTable::from_csv(name, csv).unwrap());
        }
        s
    }

    const NW_CUSTOMERS: &str = "ID,Company,Last Name,First Name,City,Country/Region\n\
                                1,Company A,Bedecs,Anna,Seattle,USA\n\
                                91,Company CM,Lee,Soo Jin,Denver,USA\n\
                                x,Broken,,,,\n";

    #[test]
    fn test_merge_offsets_by_max_plus_gap() {
        let nw = set(Source::Northwind, &[("Customers", NW_CUSTOMERS)]);
        let ss = set(
            Source::SqlServer,
            &[("Customers", "CustomerID,CompanyName,ContactName,City,Country\n7,Alfreds,Maria Anders,Berlin,Germany\n")],
        );
        let dims = merge_dimensions(&nw, &ss).unwrap();
        let keys: Vec<i64> = dims.customers.iter().map(|c| c.customer_id).collect();
        assert_eq!(keys, vec![1, 91, 1098]);

        let alfreds = &dims.customers[2];
        assert_eq!(alfreds.company.as_deref(), Some("Alfreds"));
        assert_eq!(alfreds.first_name.as_deref(), Some("Maria"));
        assert_eq!(alfreds.last_name.as_deref(), Some("Anders"));
        assert_eq!(alfreds.country_region.as_deref(), Some("Germany"));
    }

    #[test]
    fn test_dimension_and_fact_offsets_differ() {
        // The same SQL Server customer 7 lands on 1098 in the dimension
        // but 1007 on the fact side.
        let nw = set(Source::Northwind, &[("Customers", NW_CUSTOMERS)]);
        let ss = set(
            Source::SqlServer,
            &[
                ("Customers", "CustomerID,CompanyName\n7,Alfreds\n"),
                ("Order Details", "OrderID,ProductID,UnitPrice,Quantity\n1,1,10,1\n"),
                ("Orders", "OrderID,CustomerID,EmployeeID,OrderDate\n1,7,1,2006-01-01\n"),
            ],
        );
        let dims = merge_dimensions(&nw, &ss).unwrap();
        let facts = crate::facts::sales::sqlserver_sales(&ss).unwrap().unwrap();
        assert_eq!(dims.customers.last().unwrap().customer_id, 1098);
        assert_eq!(facts[0].customer_key, Some(1007));
    }

    #[test]
    fn test_lone_source_is_unshifted() {
        let nw = SourceSet::new(Source::Northwind);
        let ss = set(Source::SqlServer, &[("Suppliers", "SupplierID,CompanyName\n4,Tokyo Traders\n")]);
        let dims = merge_dimensions(&nw, &ss).unwrap();
        assert_eq!(dims.suppliers[0].supplier_id, 4);
        assert_eq!(dims.suppliers[0].first_name.as_deref(), Some(""));
        assert_eq!(dims.suppliers[0].city.as_deref(), Some(""));
    }

    #[test]
    fn test_unparseable_keys_dropped() {
        let nw = set(Source::Northwind, &[("Customers", NW_CUSTOMERS)]);
        let dims = merge_dimensions(&nw, &SourceSet::new(Source::SqlServer)).unwrap();
        assert_eq!(dims.customers.len(), 2);
    }

    #[test]
    fn test_sqlserver_product_category_join() {
        let ss = set(
            Source::SqlServer,
            &[
                ("Products", "ProductID,ProductName,CategoryID,UnitPrice\n1,Chai,1,18\n2,Chang,9,19\n"),
                ("Categories", "CategoryID,CategoryName\n1,Beverages\n"),
            ],
        );
        let dims = merge_dimensions(&SourceSet::new(Source::Northwind), &ss).unwrap();
        assert_eq!(dims.products[0].category.as_deref(), Some("Beverages"));
        assert_eq!(dims.products[0].list_price, Some(18.0));
        assert_eq!(dims.products[0].product_code.as_deref(), Some(""));
        assert_eq!(dims.products[0].standard_cost, Some(0.0));
        assert_eq!(dims.products[1].category, None);
    }

    #[test]
    fn test_sqlserver_product_without_categories_is_unknown() {
        let ss = set(Source::SqlServer, &[("Products", "Product ID,Product Name,CategoryID\n1,Chai,1\n")]);
        let dims = merge_dimensions(&SourceSet::new(Source::Northwind), &ss).unwrap();
        assert_eq!(dims.products[0].category.as_deref(), Some(UNKNOWN_CATEGORY));
        assert_eq!(dims.products[0].product_name.as_deref(), Some("Chai"));
    }

    #[test]
    fn test_sqlserver_employee_defaults() {
        let ss = set(
            Source::SqlServer,
            &[("Employees", "EmployeeID,LastName,FirstName,Title\n5,Buchanan,Steven,Sales Manager\n")],
        );
        let e = &merge_dimensions(&SourceSet::new(Source::Northwind), &ss).unwrap().employees[0];
        assert_eq!(e.company.as_deref(), Some(DEFAULT_EMPLOYEE_COMPANY));
        assert_eq!(e.job_title.as_deref(), Some("Sales Manager"));
        assert_eq!(e.first_name.as_deref(), Some("Steven"));
    }

    #[test]
    fn test_northwind_missing_column_defaults() {
        let nw = set(
            Source::Northwind,
            &[
                ("Employees", "ID,Company,First Name\n1,Northwind Traders,Nancy\n"),
                ("Products", "ID,Product Name\n5,Chai\n"),
                ("Customers", "ID,Company\n3,Company C\n"),
            ],
        );
        let dims = merge_dimensions(&nw, &SourceSet::new(Source::SqlServer)).unwrap();

        let e = &dims.employees[0];
        assert_eq!(e.first_name.as_deref(), Some("Nancy"));
        assert_eq!(e.last_name.as_deref(), Some(""));
        assert_eq!(e.job_title.as_deref(), Some(""));

        let p = &dims.products[0];
        assert_eq!(p.product_name.as_deref(), Some("Chai"));
        assert_eq!(p.category.as_deref(), Some(""));
        assert_eq!(p.list_price, Some(0.0));
        assert_eq!(p.reorder_level, Some(0));

        let c = &dims.customers[0];
        assert_eq!(c.city.as_deref(), Some(""));
        assert_eq!(c.country_region.as_deref(), Some(""));
    }

    #[test]
    fn test_northwind_missing_key_column_is_fatal() {
        let nw = set(Source::Northwind, &[("Employees", "Company,First Name\nNorthwind,Nancy\n")]);
        let err = merge_dimensions(&nw, &SourceSet::new(Source::SqlServer)).unwrap_err();
        assert!(matches!(err, TransformError::UnresolvedColumn { field: "EmployeeID", .. }));
    }

    #[test]
    fn test_out_of_range_northwind_key_dropped_before_offset() {
        let nw = set(
            Source::Northwind,
            &[("Customers", "ID,Company\n9223372036854775000,Huge\n91,Company CM\n")],
        );
        let ss = set(Source::SqlServer, &[("Customers", "CustomerID,CompanyName\n7,Alfreds\n")]);
        let dims = merge_dimensions(&nw, &ss).unwrap();
        let keys: Vec<i64> = dims.customers.iter().map(|c| c.customer_id).collect();
        assert_eq!(keys, vec![91, 1098]);
    }

    #[test]
    fn test_merge_keyed_drops_keys_shifted_past_integer_range() {
        let nw = vec![EmployeeRow::placeholder(2_147_482_000, "x")];
        let ss = vec![EmployeeRow::placeholder(1, "x"), EmployeeRow::placeholder(700, "x")];
        let keys: Vec<i64> = merge_keyed(nw, ss).iter().map(|e| e.employee_id).collect();
        assert_eq!(keys, vec![2_147_482_000, 2_147_483_001]);

        let nw = vec![EmployeeRow::placeholder(i64::MAX - 10, "x")];
        let merged = merge_keyed(nw, vec![EmployeeRow::placeholder(5, "x")]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merge_keyed_empty_northwind() {
        let rows = vec![EmployeeRow::placeholder(3, "x")];
        assert_eq!(merge_keyed(Vec::new(), rows.clone()), rows);
    }
}
