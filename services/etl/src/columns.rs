//! Column mapping - canonical field names to the ordered list of source
//! header names that may carry them.
//!
//! A mapping table is resolved once against a [`SourceTable`]'s headers.
//! Cell access afterwards goes through the canonical field name; a field
//! whose column is absent reads as `None` or as the caller's default.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::TransformError;
use crate::extract::{Source, SourceTable};

/// One canonical field and the header names accepted for it, in priority
/// order.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub field: &'static str,
    pub candidates: &'static [&'static str],
}

pub const fn col(field: &'static str, candidates: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec { field, candidates }
}

/// A mapping table resolved against one source table.
#[derive(Debug, Clone)]
pub struct Columns {
    source: Source,
    table: &'static str,
    specs: &'static [ColumnSpec],
    index: HashMap<&'static str, usize>,
}

impl Columns {
    pub fn resolve(
        source: Source,
        table: &'static str,
        data: &SourceTable,
        specs: &'static [ColumnSpec],
    ) -> Self {
        let index = specs
            .iter()
            .filter_map(|spec| {
                spec.candidates
                    .iter()
                    .find_map(|name| data.column(name))
                    .map(|idx| (spec.field, idx))
            })
            .collect();

        Self {
            source,
            table,
            specs,
            index,
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    /// Fail unless `field` resolved to a column.
    pub fn require(&self, field: &'static str) -> Result<(), TransformError> {
        if self.has(field) {
            return Ok(());
        }
        let candidates = self
            .specs
            .iter()
            .find(|s| s.field == field)
            .map(|s| s.candidates.join(", "))
            .unwrap_or_default();
        Err(TransformError::UnresolvedColumn {
            source_name: self.source.tag(),
            table: self.table,
            field,
            candidates,
        })
    }

    pub fn require_all(&self, fields: &[&'static str]) -> Result<(), TransformError> {
        fields.iter().try_for_each(|f| self.require(f))
    }

    /// Non-empty cell text for `field`.
    pub fn raw<'r>(&self, row: &'r [String], field: &str) -> Option<&'r str> {
        let idx = *self.index.get(field)?;
        row.get(idx).map(|s| s.as_str()).filter(|s| !s.is_empty())
    }

    pub fn text(&self, row: &[String], field: &str) -> Option<String> {
        self.raw(row, field).map(str::to_string)
    }

    /// Cell text, or `default` when the whole column is absent. An empty
    /// cell in a present column stays `None`.
    pub fn text_or(&self, row: &[String], field: &str, default: &str) -> Option<String> {
        if self.has(field) {
            self.text(row, field)
        } else {
            Some(default.to_string())
        }
    }

    pub fn int(&self, row: &[String], field: &str) -> Option<i64> {
        self.raw(row, field).and_then(parse_int)
    }

    /// A surrogate or foreign key: an integer that fits the INTEGER key
    /// columns. Anything else reads as `None`.
    pub fn key(&self, row: &[String], field: &str) -> Option<i64> {
        self.raw(row, field).and_then(parse_key)
    }

    pub fn int_or(&self, row: &[String], field: &str, default: i64) -> Option<i64> {
        if self.has(field) {
            self.int(row, field)
        } else {
            Some(default)
        }
    }

    pub fn float(&self, row: &[String], field: &str) -> Option<f64> {
        self.raw(row, field).and_then(parse_float)
    }

    pub fn float_or(&self, row: &[String], field: &str, default: f64) -> Option<f64> {
        if self.has(field) {
            self.float(row, field)
        } else {
            Some(default)
        }
    }

    pub fn timestamp(&self, row: &[String], field: &str) -> Option<NaiveDateTime> {
        self.raw(row, field).and_then(parse_timestamp)
    }
}

/// Integer parse that also accepts integral floats ("3.0"). Anything else
/// is `None`.
pub fn parse_int(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Whether `key` can be stored in an INTEGER key column.
pub fn in_key_range(key: i64) -> bool {
    i32::try_from(key).is_ok()
}

pub fn parse_key(raw: &str) -> Option<i64> {
    parse_int(raw).filter(|k| in_key_range(*k))
}

pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Split a single contact name into (first token, last token).
pub fn split_contact_name(full: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(full) = full else {
        return (None, None);
    };
    let mut parts = full.split_whitespace();
    let first = parts.next().map(str::to_string);
    let last = full.split_whitespace().last().map(str::to_string);
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const SPECS: &[ColumnSpec] = &[
        col("ProductID", &["ProductID", "Product ID"]),
        col("ProductName", &["ProductName", "Product Name"]),
        col("ReorderLevel", &["ReorderLevel"]),
    ];

    fn table(csv: &str) -> SourceTable {
        SourceTable::from_csv("Products", csv).unwrap()
    }

    #[test]
    fn test_resolve_prefers_first_candidate() {
        let t = table("Product ID,ProductID\n1,2\n");
        let cols = Columns::resolve(Source::SqlServer, "Products", &t, SPECS);
        assert_eq!(cols.int(&t.rows[0], "ProductID"), Some(2));
    }

    #[test]
    fn test_resolve_falls_back_to_alternate() {
        let t = table("Product ID,Product Name\n7,Chai\n");
        let cols = Columns::resolve(Source::SqlServer, "Products", &t, SPECS);
        assert_eq!(cols.int(&t.rows[0], "ProductID"), Some(7));
        assert_eq!(cols.text(&t.rows[0], "ProductName").as_deref(), Some("Chai"));
    }

    #[test]
    fn test_absent_column_defaults() {
        let t = table("ProductID\n7\n");
        let cols = Columns::resolve(Source::SqlServer, "Products", &t, SPECS);
        assert!(!cols.has("ReorderLevel"));
        assert_eq!(cols.int_or(&t.rows[0], "ReorderLevel", 0), Some(0));
        assert_eq!(cols.text_or(&t.rows[0], "ProductName", "").as_deref(), Some(""));
    }

    #[test]
    fn test_empty_cell_in_present_column_is_none() {
        let t = table("ProductID,ReorderLevel\n7,\n");
        let cols = Columns::resolve(Source::SqlServer, "Products", &t, SPECS);
        assert_eq!(cols.int_or(&t.rows[0], "ReorderLevel", 0), None);
    }

    #[test]
    fn test_require_reports_candidates() {
        let t = table("Name\nx\n");
        let cols = Columns::resolve(Source::SqlServer, "Products", &t, SPECS);
        let err = cols.require("ProductID").unwrap_err().to_string();
        assert!(err.contains("ProductID, Product ID"));
        assert!(err.contains("sqlserver"));
    }

    #[test]
    fn test_parse_int_variants() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int(" 42 "), Some(42));
        assert_eq!(parse_int("42.0"), Some(42));
        assert_eq!(parse_int("42.5"), None);
        assert_eq!(parse_int("ALFKI"), None);
        assert_eq!(parse_int("NaN"), None);
    }

    #[test]
    fn test_parse_key_bounded_to_integer_column() {
        assert_eq!(parse_key("2147483647"), Some(2_147_483_647));
        assert_eq!(parse_key("-5"), Some(-5));
        assert_eq!(parse_key("2147483648"), None);
        assert_eq!(parse_key("9223372036854775000"), None);
        assert_eq!(parse_int("9223372036854775000"), Some(9_223_372_036_854_775_000));
    }

    #[test]
    fn test_parse_float_rejects_non_finite() {
        assert_eq!(parse_float("19.5"), Some(19.5));
        assert_eq!(parse_float("inf"), None);
        assert_eq!(parse_float("n/a"), None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let a = parse_timestamp("2006-01-15 10:30:00").unwrap();
        assert_eq!((a.year(), a.month(), a.day(), a.hour()), (2006, 1, 15, 10));

        let b = parse_timestamp("1/15/2006 00:00:00").unwrap();
        assert_eq!((b.year(), b.month(), b.day()), (2006, 1, 15));

        let c = parse_timestamp("1996-07-04").unwrap();
        assert_eq!((c.year(), c.month(), c.day(), c.hour()), (1996, 7, 4, 0));

        let d = parse_timestamp("1996-07-04 00:00:00.000").unwrap();
        assert_eq!(d.year(), 1996);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_split_contact_name() {
        assert_eq!(
            split_contact_name(Some("Maria Anders")),
            (Some("Maria".to_string()), Some("Anders".to_string()))
        );
        assert_eq!(
            split_contact_name(Some("Ana Trujillo Emparedados")),
            (Some("Ana".to_string()), Some("Emparedados".to_string()))
        );
        assert_eq!(
            split_contact_name(Some("Cher")),
            (Some("Cher".to_string()), Some("Cher".to_string()))
        );
        assert_eq!(split_contact_name(None), (None, None));
    }
}
