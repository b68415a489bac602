use std::io::Cursor;

use calamine::{Data, Reader};
use encoding_rs::Encoding;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::ImportError;

/// A single source cell, reduced to the three shapes bank exports use.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(Decimal),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn from_csv_field(field: &str) -> Cell {
        if field.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(field.to_string())
        }
    }

    fn from_sheet(value: &Data) -> Cell {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::from_csv_field(s),
            Data::Int(i) => Cell::Number(Decimal::from(*i)),
            Data::Float(f) => Decimal::from_f64(*f).map_or(Cell::Empty, Cell::Number),
            Data::Bool(b) => Cell::Text(b.to_string()),
            // Excel date cells come through as ISO text so the row
            // normalizer's generic date parse picks them up.
            Data::DateTime(dt) => dt
                .as_datetime()
                .map_or(Cell::Empty, |d| Cell::Text(d.date().to_string())),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    }
}

/// One decoded statement table: trimmed labels of the detected header row
/// plus the data rows after it. Ephemeral — lives for one import call.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Delimiter candidates, in fixed order. The order is part of the contract:
/// when several combinations would parse, the first one wins, so repeated
/// uploads of the same file always resolve identically.
const DELIMITERS: &[u8] = b";,\t";

/// Encoding labels tried per delimiter, in fixed order. Under WHATWG label
/// resolution latin1/iso-8859-1/cp1252 all map to the windows-1252 decoder;
/// the list keeps all four so the attempt log mirrors the search order.
const ENCODINGS: &[&str] = &["utf-8", "latin1", "iso-8859-1", "cp1252"];

const HEADER_DATE_TOKEN: &str = "fecha";
const HEADER_DESC_TOKENS: &[&str] = &["descripción", "descripcion", "detalle"];

/// Decode an uploaded statement into a [`RawTable`].
///
/// Native spreadsheet decoding is attempted first and accepted immediately
/// if it yields a non-empty table. Otherwise every (delimiter, encoding)
/// pair is tried in fixed order, scanning all decoded rows for the header
/// row; the first pair with a usable header wins and stops the search.
pub fn load_table(bytes: &[u8]) -> Result<RawTable, ImportError> {
    let mut attempts = vec!["spreadsheet workbook".to_string()];

    if let Some(table) = try_spreadsheet(bytes) {
        tracing::debug!(rows = table.rows.len(), "loaded statement as spreadsheet");
        return Ok(table);
    }

    for &delimiter in DELIMITERS {
        for &label in ENCODINGS {
            attempts.push(format!("delimiter {:?} / {label}", delimiter as char));

            // Decode-then-use: the first decodable combination is taken as
            // is, not validated against the remaining encodings.
            let Some(text) = decode(bytes, label) else {
                continue;
            };
            let Some(rows) = read_rows(&text, delimiter) else {
                continue;
            };
            let Some(header_idx) = find_header_row(&rows) else {
                continue;
            };

            let table = table_from_rows(rows, header_idx);
            if table.rows.is_empty() {
                return Err(ImportError::UnrecognizedFormat { attempts });
            }
            tracing::debug!(
                delimiter = %(delimiter as char),
                encoding = label,
                header_row = header_idx,
                rows = table.rows.len(),
                "loaded statement as delimited text"
            );
            return Ok(table);
        }
    }

    tracing::warn!("statement format not recognized after exhausting all strategies");
    Err(ImportError::UnrecognizedFormat { attempts })
}

fn decode(bytes: &[u8], label: &str) -> Option<String> {
    let encoding = Encoding::for_label(label.as_bytes())?;
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return None;
    }
    Some(text.into_owned())
}

/// Parse the decoded text as headerless delimited rows. Any record-level
/// parse error discredits the whole (delimiter, encoding) pair.
fn read_rows(text: &str, delimiter: u8) -> Option<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.ok()?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Some(rows)
}

/// First row, in row order, holding "fecha" together with a description
/// token. Tokens are matched against the joined row text, so a header split
/// oddly across cells still qualifies. Single-cell rows are rejected: a
/// wrong delimiter collapses every line into one field, and the tokens
/// would match there even though the table is unusable.
fn find_header_row(rows: &[Vec<String>]) -> Option<usize> {
    rows.iter().position(|row| {
        if row.len() < 2 {
            return false;
        }
        let joined = row.join(" ").to_lowercase();
        joined.contains(HEADER_DATE_TOKEN)
            && HEADER_DESC_TOKENS.iter().any(|t| joined.contains(t))
    })
}

fn table_from_rows(rows: Vec<Vec<String>>, header_idx: usize) -> RawTable {
    let mut rows = rows;
    let data = rows.split_off(header_idx + 1);
    let headers = rows
        .pop()
        .unwrap_or_default()
        .iter()
        .map(|label| label.trim().to_string())
        .collect();

    RawTable {
        headers,
        rows: data
            .into_iter()
            .map(|row| row.iter().map(|f| Cell::from_csv_field(f)).collect())
            .collect(),
    }
}

/// Binary spreadsheet attempt: first sheet, first row as header. Returns
/// `None` when the bytes are not a workbook or the sheet has no data rows,
/// letting the delimited-text search take over.
fn try_spreadsheet(bytes: &[u8]) -> Option<RawTable> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes)).ok()?;
    let range = workbook.worksheet_range_at(0)?.ok()?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()?
        .iter()
        .map(|d| d.to_string().trim().to_string())
        .collect();
    let data: Vec<Vec<Cell>> = rows
        .map(|row| row.iter().map(Cell::from_sheet).collect())
        .collect();

    if data.is_empty() {
        return None;
    }
    Some(RawTable { headers, rows: data })
}
