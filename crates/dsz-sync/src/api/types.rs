//! API request and response types
//!
//! Catalog items arrive with far more fields than the sync needs and with
//! loose typing (`stock_qty` is sometimes a string, `price` sometimes a
//! number). Items stay as `serde_json::Value` until [`CatalogRecord::project`]
//! pulls out the three published fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder written when an item carries no usable SKU
pub const UNKNOWN_SKU: &str = "UNKNOWN_SKU";

/// Request body for the auth endpoint
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// One page of the catalog endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageResponse {
    /// Raw items; absent or non-array means there is nothing more to read
    #[serde(default)]
    pub result: Option<Value>,

    /// Total page count as reported by the server
    #[serde(default)]
    pub total_pages: Option<Value>,
}

impl PageResponse {
    /// Items of this page, or `None` when the response carries no item list
    pub fn items(&self) -> Option<&[Value]> {
        match &self.result {
            Some(Value::Array(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Reported page count, defaulting to 1 when absent or unreadable
    pub fn total_pages(&self) -> u32 {
        self.total_pages
            .as_ref()
            .and_then(lenient_integer)
            .map(|n| n.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(1)
    }
}

/// Output unit: exactly the three fields downstream consumers read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub sku: String,
    pub stock: u64,
    /// Fixed two-decimal string, e.g. `"3.50"`
    pub price: String,
}

impl CatalogRecord {
    /// Project a raw catalog item into its published shape
    pub fn project(item: &Value) -> Self {
        let sku = match item.get("sku") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => UNKNOWN_SKU.to_string(),
        };

        let stock = item
            .get("stock_qty")
            .and_then(lenient_integer)
            .map(|n| n.max(0) as u64)
            .unwrap_or(0);

        let price = item
            .get("price")
            .and_then(lenient_float)
            .map(format_price)
            .unwrap_or_else(|| "0.00".to_string());

        Self { sku, stock, price }
    }
}

/// Render a price with exactly two fraction digits, rounding half away from zero
pub fn format_price(value: f64) -> String {
    if !value.is_finite() {
        return "0.00".to_string();
    }
    let rounded = (value * 100.0).round() / 100.0;
    // Avoid "-0.00"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{:.2}", rounded)
}

/// Read an integer from a JSON number, numeric string prefix, or bool
fn lenient_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let prefix = numeric_prefix(s, false);
            Some(prefix.parse::<i64>().unwrap_or(0))
        },
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Read a float from a JSON number, numeric string prefix, or bool
fn lenient_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let prefix = numeric_prefix(s, true);
            Some(prefix.parse::<f64>().unwrap_or(0.0))
        },
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Longest leading `[+-]digits[.digits]` slice after leading whitespace
fn numeric_prefix(s: &str, allow_fraction: bool) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if allow_fraction && end < bytes.len() && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > end + 1 {
            end = frac_end;
        }
    }

    &s[..end]
}
