// ============================================================
// REPORT TABLE
// ============================================================
// The exported enrollment report as it travels to the spreadsheet

use serde_json::Value;

/// Cell values in the row-major layout the Sheets API reads and writes.
pub type SheetValues = Vec<Vec<Value>>;

/// Header row plus data rows of an exported report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    /// Header row first, then every data row. Headers always stay text;
    /// data cells that look like plain numbers are sent as numbers.
    pub fn to_sheet_values(&self) -> SheetValues {
        let mut values = Vec::with_capacity(self.rows.len() + 1);
        values.push(
            self.headers
                .iter()
                .map(|h| Value::String(h.clone()))
                .collect(),
        );
        for row in &self.rows {
            values.push(row.iter().map(|cell| cell_value(cell)).collect());
        }
        values
    }
}

fn cell_value(raw: &str) -> Value {
    if !is_plain_number(raw) {
        return Value::String(raw.to_string());
    }
    // Integers wider than i64 (long member ids) would lose digits as f64.
    if !raw.contains('.') {
        return match raw.parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => Value::String(raw.to_string()),
        };
    }
    match raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(number) => Value::Number(number),
        None => Value::String(raw.to_string()),
    }
}

/// Digits with an optional sign and decimal part. Leading zeros (zip codes,
/// member ids) and thousands separators keep the cell as text.
fn is_plain_number(raw: &str) -> bool {
    let unsigned = raw.strip_prefix('-').unwrap_or(raw);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if int_part.len() > 1 && int_part.starts_with('0') {
        return false;
    }
    match frac_part {
        Some(f) => !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    }
}
