use csv_async::StringRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column layout of an uploaded user file, in encoding order.
pub const COLUMNS: [&str; 5] = [
    "Email",
    "Name",
    "CreditScore",
    "CreditLines",
    "MaskedPhoneNumber",
];

/// One decoded CSV row.
///
/// Numeric fields hold `None` when the source cell had no leading integer;
/// that is the invalid sentinel and serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub email: String,
    pub name: String,
    pub credit_score: Option<i64>,
    pub credit_lines: Option<i64>,
    pub masked_phone_number: String,
}

/// Store-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record as persisted, carrying the identifier under `_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(rename = "_id")]
    pub id: RecordId,
    #[serde(flatten)]
    pub record: Record,
}

/// Header row of one file, resolved once and shared by every [`RawRow`].
#[derive(Debug, Clone)]
pub struct RowLayout {
    headers: Vec<String>,
}

impl RowLayout {
    pub fn new(headers: &StringRecord) -> Self {
        let headers = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                // Spreadsheet exports often prefix the first header with a BOM
                if i == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();
        Self { headers }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row<'a>(&'a self, fields: &'a StringRecord) -> RawRow<'a> {
        RawRow {
            layout: self,
            fields,
        }
    }

    fn position(&self, column: &str) -> Option<usize> {
        // Duplicate headers: the rightmost one wins
        self.headers.iter().rposition(|h| h == column)
    }
}

/// Column-name to string view over one parsed row.
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    layout: &'a RowLayout,
    fields: &'a StringRecord,
}

impl<'a> RawRow<'a> {
    /// Value of `column`, or `""` when the header or the cell is missing.
    pub fn get(&self, column: &str) -> &'a str {
        self.layout
            .position(column)
            .and_then(|idx| self.fields.get(idx))
            .unwrap_or("")
    }
}

impl Record {
    /// Decode one row. Never fails: missing columns read as empty strings and
    /// unparseable numbers become `None`.
    pub fn from_row(row: &RawRow<'_>) -> Self {
        Self {
            email: row.get("Email").to_owned(),
            name: row.get("Name").to_owned(),
            credit_score: parse_leading_int(row.get("CreditScore")),
            credit_lines: parse_leading_int(row.get("CreditLines")),
            masked_phone_number: row.get("MaskedPhoneNumber").to_owned(),
        }
    }

    /// Re-encode in [`COLUMNS`] order. The sentinel encodes as an empty cell.
    pub fn to_fields(&self) -> [String; 5] {
        [
            self.email.clone(),
            self.name.clone(),
            self.credit_score.map(|v| v.to_string()).unwrap_or_default(),
            self.credit_lines.map(|v| v.to_string()).unwrap_or_default(),
            self.masked_phone_number.clone(),
        ]
    }
}

/// Leading-integer coercion used for every numeric column.
///
/// Skips leading whitespace, accepts one optional sign, then reads base-10
/// digits up to the first non-digit: `"12abc"` is `Some(12)`, `"abc"` and `""`
/// are `None`. A digit run that does not fit in `i64` is also `None`.
pub fn parse_leading_int(input: &str) -> Option<i64> {
    let s = input.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let mut value: i64 = 0;
    for b in digits[..end].bytes() {
        let d = i64::from(b - b'0');
        value = value.checked_mul(10)?;
        // accumulate negatives downwards so i64::MIN stays representable
        value = if negative {
            value.checked_sub(d)?
        } else {
            value.checked_add(d)?
        };
    }
    Some(value)
}
