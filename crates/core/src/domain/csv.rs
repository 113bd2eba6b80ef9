// CSV Codec - stateless row encoding (RFC 4180 escaping)

use crate::domain::Product;

/// Column header line, terminated by a single newline.
///
/// Stable across all rows of an export; emitted exactly once per engine
/// loop invocation.
pub fn header() -> &'static str {
    "id,name,sku,category,status,price,created_at\n"
}

/// Encode one product as a single CSV line terminated by one newline.
pub fn encode_row(product: &Product) -> String {
    format!(
        "{},{},{},{},{},{},{}\n",
        product.id,
        escape_field(&product.name),
        escape_field(&product.sku),
        escape_field(&product.category),
        product.status.as_str(),
        format_price(product.price_cents),
        format_timestamp(product.created_at),
    )
}

/// Encode a chunk of rows as one concatenated data unit.
pub fn encode_rows(products: &[Product]) -> String {
    let mut out = String::with_capacity(products.len() * 64);
    for product in products {
        out.push_str(&encode_row(product));
    }
    out
}

/// Quote a field when it contains a comma, double-quote, or line break;
/// internal double-quotes are doubled.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render minor currency units to a fixed 2-decimal representation.
fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Render an epoch-millisecond timestamp as extended ISO-8601 with UTC
/// offset. Out-of-range values pass through as an empty field.
fn format_timestamp(epoch_millis: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(epoch_millis) {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
        None => String::new(),
    }
}
