//! CSV product import: parsing and row validation.
//!
//! Expected header: `sku,name,description,price,compare_at_price,stock,
//! status,category_slug,tags,images`. Only `sku`, `name` and `price` are
//! required. Prices are decimal major units (`19.99`); `tags` and `images`
//! are `|` separated.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::ProductStatus;
use crate::domain::value_objects::Sku;

const REQUIRED_COLUMNS: [&str; 3] = ["sku", "name", "price"];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV is missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("CSV could not be read: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportIssue {
    pub line: u64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub line: u64,
    pub sku: Sku,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub compare_at_price: Option<i64>,
    pub stock: i32,
    pub status: ProductStatus,
    pub category_slug: Option<String>,
    pub tags: Vec<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ParsedImport {
    pub rows: Vec<ImportRow>,
    pub issues: Vec<ImportIssue>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    sku: Option<String>,
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    price: Option<String>,
    #[serde(default)]
    compare_at_price: Option<String>,
    #[serde(default)]
    stock: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    category_slug: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    images: Option<String>,
}

/// Parses an import file. Row-level problems are collected as issues; only
/// an unreadable file or a missing required column fails the whole import.
pub fn parse_csv(input: &[u8]) -> Result<ParsedImport, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers: csv::StringRecord = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_ascii_lowercase())
        .collect();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(ImportError::MissingColumn(column));
        }
    }

    let mut parsed = ParsedImport::default();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                let line = e.position().map_or(0, csv::Position::line);
                parsed.issues.push(ImportIssue { line, message: e.to_string() });
                continue;
            }
        };
        let line = record.position().map_or(0, csv::Position::line);
        if record.iter().all(str::is_empty) {
            continue;
        }
        let result = record
            .deserialize::<RawRow>(Some(&headers))
            .map_err(|e| e.to_string())
            .and_then(|raw| validate_row(line, raw));
        match result {
            Ok(row) => parsed.rows.push(row),
            Err(message) => parsed.issues.push(ImportIssue { line, message }),
        }
    }
    Ok(parsed)
}

fn validate_row(line: u64, raw: RawRow) -> Result<ImportRow, String> {
    let sku = Sku::new(non_empty(raw.sku).ok_or("sku is required")?).map_err(|e| e.to_string())?;
    let name = non_empty(raw.name).ok_or("name is required")?;
    let price = parse_price(&non_empty(raw.price).ok_or("price is required")?)?;
    let compare_at_price = non_empty(raw.compare_at_price)
        .map(|p| parse_price(&p))
        .transpose()?;
    let stock = match non_empty(raw.stock) {
        Some(s) => s
            .parse::<i32>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| format!("stock '{s}' must be a non-negative integer"))?,
        None => 0,
    };
    let status = match non_empty(raw.status) {
        Some(s) => ProductStatus::parse(&s.to_ascii_lowercase()).map_err(|e| e.to_string())?,
        None => ProductStatus::Draft,
    };

    Ok(ImportRow {
        line,
        sku,
        name,
        description: non_empty(raw.description),
        price,
        compare_at_price,
        stock,
        status,
        category_slug: non_empty(raw.category_slug).map(|s| s.to_ascii_lowercase()),
        tags: split_list(raw.tags),
        images: split_list(raw.images),
    })
}

/// Decimal major units to minor units. At most two decimal places.
pub fn parse_price(raw: &str) -> Result<i64, String> {
    let cleaned = raw.trim().trim_start_matches('$').replace(',', "");
    let value = Decimal::from_str(&cleaned).map_err(|_| format!("price '{raw}' is not a number"))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(format!("price '{raw}' must not be negative"));
    }
    if value.normalize().scale() > 2 {
        return Err(format!("price '{raw}' has more than two decimal places"));
    }
    (value * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| format!("price '{raw}' is too large"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}
