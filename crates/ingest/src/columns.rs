use crate::ImportError;

/// Semantic column roles the resolver must locate in a statement header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Date,
    Description,
    Debit,
    Credit,
}

/// Role → column index mapping, computed once per file and held read-only
/// for the row normalizer. Debit and credit are independently optional but
/// never both absent.
#[derive(Debug, Clone)]
pub struct ColumnRoleMap {
    pub date: usize,
    pub description: usize,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
}

const DATE_KEYWORDS: &[&str] = &["fecha", "date"];
const DESCRIPTION_KEYWORDS: &[&str] = &[
    "descripción",
    "descripcion",
    "description",
    "detalle",
    "glosa",
];
const DEBIT_KEYWORDS: &[&str] = &["cargo", "cargos", "debe", "egreso", "gasto"];
const CREDIT_KEYWORDS: &[&str] = &[
    "abono", "abonos", "haber", "ingreso", "deposito", "depósito",
];

fn matches_any(label: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| label.contains(k))
}

/// Assign roles to header labels by keyword matching.
///
/// Labels are lowercased and tested against the four keyword sets in the
/// order date, description, debit, credit; a label claims at most one role
/// and the first label matching a set wins it (scan order = column order).
/// Fails if date or description is unresolved, or if neither debit nor
/// credit is found, listing the labels actually seen.
pub fn resolve_columns(headers: &[String]) -> Result<ColumnRoleMap, ImportError> {
    let mut date = None;
    let mut description = None;
    let mut debit = None;
    let mut credit = None;

    for (idx, label) in headers.iter().enumerate() {
        let lower = label.trim().to_lowercase();
        if date.is_none() && matches_any(&lower, DATE_KEYWORDS) {
            date = Some(idx);
        } else if description.is_none() && matches_any(&lower, DESCRIPTION_KEYWORDS) {
            description = Some(idx);
        } else if debit.is_none() && matches_any(&lower, DEBIT_KEYWORDS) {
            debit = Some(idx);
        } else if credit.is_none() && matches_any(&lower, CREDIT_KEYWORDS) {
            credit = Some(idx);
        }
    }

    let mut missing = Vec::new();
    if date.is_none() {
        missing.push(Role::Date);
    }
    if description.is_none() {
        missing.push(Role::Description);
    }
    if debit.is_none() && credit.is_none() {
        missing.push(Role::Debit);
        missing.push(Role::Credit);
    }
    if !missing.is_empty() {
        return Err(ImportError::UnresolvedColumns {
            missing,
            available: headers.to_vec(),
        });
    }

    Ok(ColumnRoleMap {
        date: date.unwrap(),
        description: description.unwrap(),
        debit,
        credit,
    })
}
