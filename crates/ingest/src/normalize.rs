use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use gastos_core::{decimal_to_cents, truncate_description, TransactionKind};

use crate::columns::ColumnRoleMap;
use crate::table::Cell;

/// One statement row with date, amount, polarity and description resolved.
#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub date: NaiveDate,
    /// Positive, rounded to 2 decimal places.
    pub amount: Decimal,
    pub kind: TransactionKind,
    /// Truncated form used for dedup and persistence.
    pub description: String,
    pub raw_description: String,
}

/// Rows whose description contains one of these are export boilerplate
/// (running totals, footer notes), not transactions.
const BOILERPLATE_MARKERS: &[&str] = &["subtotal", "notas:", "información referencial"];

/// Formats tried by the generic date parse, first success wins.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%m/%d/%Y", "%Y/%m/%d", "%d/%m/%y", "%d.%m.%Y",
];

/// Normalize one data row against the resolved column map.
///
/// `None` means skip: the row is structurally invalid or boilerplate. Skips
/// are silent by contract — one malformed row must never abort the rest of
/// the statement — and do not count toward any import statistic.
///
/// `today` anchors the year inference for `DD/Mon` shorthand dates.
pub fn normalize_row(
    row: &[Cell],
    map: &ColumnRoleMap,
    today: NaiveDate,
) -> Option<NormalizedRow> {
    let date = parse_date_cell(row.get(map.date)?, today)?;

    let raw_description = match row.get(map.description)? {
        Cell::Text(s) => s.trim().to_string(),
        Cell::Number(n) => n.to_string(),
        Cell::Empty => return None,
    };
    // "nan" guards against null-like serialization artifacts upstream.
    if raw_description.is_empty() || raw_description == "nan" {
        return None;
    }
    let lower = raw_description.to_lowercase();
    if BOILERPLATE_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }

    let debit = amount_in(row, map.debit);
    let credit = amount_in(row, map.credit);

    let (amount, kind) = if debit > Decimal::ZERO {
        (debit, TransactionKind::Expense)
    } else if credit > Decimal::ZERO {
        (credit, TransactionKind::Income)
    } else {
        return None;
    };

    let amount = amount.round_dp(2);
    // An amount that does not fit in i64 cents can never be persisted;
    // the row is malformed, not the statement.
    decimal_to_cents(amount)?;

    Some(NormalizedRow {
        date,
        amount,
        kind,
        description: truncate_description(&raw_description),
        raw_description,
    })
}

fn amount_in(row: &[Cell], column: Option<usize>) -> Decimal {
    column
        .and_then(|idx| row.get(idx))
        .map_or(Decimal::ZERO, cell_amount)
}

fn cell_amount(cell: &Cell) -> Decimal {
    match cell {
        Cell::Empty => Decimal::ZERO,
        Cell::Number(n) => *n,
        Cell::Text(s) => parse_locale_amount(s),
    }
}

/// Chilean bank exports write `12.500,50` for 12500.50: periods are
/// thousands separators, the comma is the decimal mark. Unparseable text is
/// treated as zero so a stray cell never aborts its row.
fn parse_locale_amount(s: &str) -> Decimal {
    let cleaned = s.replace('.', "").replace(',', ".");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(cleaned).unwrap_or(Decimal::ZERO)
}

fn parse_date_cell(cell: &Cell, today: NaiveDate) -> Option<NaiveDate> {
    let Cell::Text(raw) = cell else {
        return None;
    };
    let s = raw.trim();
    parse_shorthand_date(s, today).or_else(|| parse_generic_date(s))
}

/// `DD/MonAbbrev` shorthand (e.g. `02/Ene`, `31/dic`) used by statements
/// that omit the year. The year is inferred relative to `today`: December
/// seen in January belongs to the previous year, January seen in December
/// to the next.
fn parse_shorthand_date(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let (day, month_name) = s.split_once('/')?;
    let day: u32 = day.trim().parse().ok()?;
    let month = spanish_month(&month_name.trim().to_lowercase())?;

    let year = match (month, today.month()) {
        (12, 1) => today.year() - 1,
        (1, 12) => today.year() + 1,
        _ => today.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn spanish_month(name: &str) -> Option<u32> {
    match name {
        "ene" | "enero" => Some(1),
        "feb" | "febrero" => Some(2),
        "mar" | "marzo" => Some(3),
        "abr" | "abril" => Some(4),
        "may" | "mayo" => Some(5),
        "jun" | "junio" => Some(6),
        "jul" | "julio" => Some(7),
        "ago" | "agosto" => Some(8),
        "sep" | "septiembre" => Some(9),
        "oct" | "octubre" => Some(10),
        "nov" | "noviembre" => Some(11),
        "dic" | "diciembre" => Some(12),
        _ => None,
    }
}

fn parse_generic_date(s: &str) -> Option<NaiveDate> {
    let attempt = |text: &str| {
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    };
    // Datetime-ish cells ("2024-01-15 00:00:00") parse by their date part.
    attempt(s).or_else(|| s.split_whitespace().next().and_then(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn map() -> ColumnRoleMap {
        ColumnRoleMap {
            date: 0,
            description: 1,
            debit: Some(2),
            credit: Some(3),
        }
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn row(cells: &[Cell]) -> Vec<Cell> {
        cells.to_vec()
    }

    // ── dates ─────────────────────────────────────────────────────────────────

    #[test]
    fn shorthand_december_in_january_is_previous_year() {
        let d = parse_shorthand_date("31/Dic", date(2026, 1, 15)).unwrap();
        assert_eq!(d, date(2025, 12, 31));
    }

    #[test]
    fn shorthand_january_in_december_is_next_year() {
        let d = parse_shorthand_date("02/Ene", date(2025, 12, 28)).unwrap();
        assert_eq!(d, date(2026, 1, 2));
    }

    #[test]
    fn shorthand_same_year_otherwise() {
        let d = parse_shorthand_date("15/ago", date(2026, 6, 1)).unwrap();
        assert_eq!(d, date(2026, 8, 15));
    }

    #[test]
    fn shorthand_accepts_full_month_names() {
        let d = parse_shorthand_date("07/Septiembre", date(2026, 6, 1)).unwrap();
        assert_eq!(d, date(2026, 9, 7));
    }

    #[test]
    fn shorthand_rejects_unknown_month() {
        assert!(parse_shorthand_date("15/xyz", date(2026, 6, 1)).is_none());
    }

    #[test]
    fn generic_parses_common_formats() {
        assert_eq!(parse_generic_date("2026-03-09"), Some(date(2026, 3, 9)));
        assert_eq!(parse_generic_date("09/03/2026"), Some(date(2026, 3, 9)));
        assert_eq!(parse_generic_date("09-03-2026"), Some(date(2026, 3, 9)));
    }

    #[test]
    fn generic_parses_datetime_by_date_part() {
        assert_eq!(
            parse_generic_date("2026-03-09 00:00:00"),
            Some(date(2026, 3, 9))
        );
    }

    #[test]
    fn generic_rejects_garbage() {
        assert_eq!(parse_generic_date("not-a-date"), None);
    }

    // ── amounts ───────────────────────────────────────────────────────────────

    #[test]
    fn locale_amount_with_thousands_and_decimal_comma() {
        assert_eq!(
            parse_locale_amount("1.234,56"),
            Decimal::from_str("1234.56").unwrap()
        );
        assert_eq!(
            parse_locale_amount("12.500,50"),
            Decimal::from_str("12500.50").unwrap()
        );
    }

    #[test]
    fn locale_amount_plain_integer() {
        assert_eq!(parse_locale_amount("45000"), Decimal::from(45000));
    }

    #[test]
    fn locale_amount_empty_and_garbage_are_zero() {
        assert_eq!(parse_locale_amount(""), Decimal::ZERO);
        assert_eq!(parse_locale_amount("   "), Decimal::ZERO);
        assert_eq!(parse_locale_amount("N/A"), Decimal::ZERO);
    }

    // ── whole rows ────────────────────────────────────────────────────────────

    #[test]
    fn debit_row_becomes_expense() {
        let r = row(&[text("05/Feb"), text("COMPRA"), text("12.500,50"), Cell::Empty]);
        let n = normalize_row(&r, &map(), date(2026, 2, 10)).unwrap();
        assert_eq!(n.kind, TransactionKind::Expense);
        assert_eq!(n.amount, Decimal::from_str("12500.50").unwrap());
        assert_eq!(n.date, date(2026, 2, 5));
    }

    #[test]
    fn credit_row_becomes_income() {
        let r = row(&[text("2026-02-05"), text("SUELDO"), Cell::Empty, text("850.000")]);
        let n = normalize_row(&r, &map(), date(2026, 2, 10)).unwrap();
        assert_eq!(n.kind, TransactionKind::Income);
        assert_eq!(n.amount, Decimal::from(850_000));
    }

    #[test]
    fn debit_wins_when_both_columns_carry_values() {
        let r = row(&[text("2026-02-05"), text("AJUSTE"), text("100"), text("200")]);
        let n = normalize_row(&r, &map(), date(2026, 2, 10)).unwrap();
        assert_eq!(n.kind, TransactionKind::Expense);
        assert_eq!(n.amount, Decimal::from(100));
    }

    #[test]
    fn both_amounts_zero_skips() {
        let r = row(&[text("2026-02-05"), text("SALDO"), Cell::Empty, Cell::Empty]);
        assert!(normalize_row(&r, &map(), date(2026, 2, 10)).is_none());
    }

    #[test]
    fn unparseable_date_skips() {
        let r = row(&[text("??"), text("COMPRA"), text("100"), Cell::Empty]);
        assert!(normalize_row(&r, &map(), date(2026, 2, 10)).is_none());
    }

    #[test]
    fn boilerplate_rows_skip() {
        for desc in ["SUBTOTAL MOVIMIENTOS", "Notas: ver anexo", "INFORMACIÓN REFERENCIAL"] {
            let r = row(&[text("2026-02-05"), text(desc), text("100"), Cell::Empty]);
            assert!(normalize_row(&r, &map(), date(2026, 2, 10)).is_none(), "{desc}");
        }
    }

    #[test]
    fn nan_description_skips() {
        let r = row(&[text("2026-02-05"), text("nan"), text("100"), Cell::Empty]);
        assert!(normalize_row(&r, &map(), date(2026, 2, 10)).is_none());
    }

    #[test]
    fn missing_cells_skip_instead_of_panicking() {
        let r = row(&[text("2026-02-05")]);
        assert!(normalize_row(&r, &map(), date(2026, 2, 10)).is_none());
    }

    #[test]
    fn long_description_truncates_but_keeps_raw() {
        let long = format!("PAGO {}", "x".repeat(300));
        let r = row(&[text("2026-02-05"), text(&long), text("100"), Cell::Empty]);
        let n = normalize_row(&r, &map(), date(2026, 2, 10)).unwrap();
        assert_eq!(n.description.chars().count(), 200);
        assert_eq!(n.raw_description, long);
    }

    #[test]
    fn astronomical_amount_skips_instead_of_panicking() {
        // 20 digits: parses as a valid Decimal but exceeds i64 cents.
        let r = row(&[
            text("2026-02-05"),
            text("COMPRA"),
            text("99999999999999999999"),
            Cell::Empty,
        ]);
        assert!(normalize_row(&r, &map(), date(2026, 2, 10)).is_none());
    }

    #[test]
    fn numeric_sheet_cells_feed_amounts_directly() {
        let r = row(&[
            text("2026-02-05"),
            text("COMPRA"),
            Cell::Number(Decimal::from_str("45990.129").unwrap()),
            Cell::Empty,
        ]);
        let n = normalize_row(&r, &map(), date(2026, 2, 10)).unwrap();
        assert_eq!(n.amount, Decimal::from_str("45990.13").unwrap());
    }
}
