use crate::error::Result;
use crate::types::{Category, Dataset, Dimension, Dimensions, MeasurementRecord};
use crate::util::{coerce_amount, parse_i32_safe};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// What happened while turning a raw source into records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub coerced_amounts: usize,
    pub unknown_categories: usize,
    pub missing_columns: Vec<Dimension>,
}

/// Canonical field names and the column names accepted for each. Older
/// stores and exports used Portuguese column names.
pub(crate) const FIELD_ALIASES: [(&str, &[&str]); 8] = [
    ("year", &["year", "ano"]),
    ("month", &["month", "mes"]),
    ("project", &["project", "projeto"]),
    ("supplier", &["supplier", "fornecedor"]),
    ("category", &["category", "categoria"]),
    ("contract", &["contract", "contrato"]),
    ("budgeted_amount", &["budgeted_amount", "valor_orcado", "orcado"]),
    ("measured_amount", &["measured_amount", "valor_medido", "medido"]),
];

/// One source row as text, before any parsing. Fields follow the order
/// of `FIELD_ALIASES`.
#[derive(Debug, Default)]
pub(crate) struct RawRow {
    pub year: Option<String>,
    pub month: Option<String>,
    pub project: Option<String>,
    pub supplier: Option<String>,
    pub category: Option<String>,
    pub contract: Option<String>,
    pub budgeted_amount: Option<String>,
    pub measured_amount: Option<String>,
}

impl RawRow {
    /// Build from one CSV record using the header positions found by
    /// `column_positions`.
    fn from_record(record: &StringRecord, positions: &[Option<usize>]) -> Self {
        let field = |i: usize| {
            positions
                .get(i)
                .copied()
                .flatten()
                .and_then(|idx| record.get(idx))
                .map(str::to_string)
        };
        Self {
            year: field(0),
            month: field(1),
            project: field(2),
            supplier: field(3),
            category: field(4),
            contract: field(5),
            budgeted_amount: field(6),
            measured_amount: field(7),
        }
    }
}

/// The column (out of `columns`) that provides `field`, if any.
pub(crate) fn resolve_column<'a>(field: &str, columns: &'a [String]) -> Option<&'a str> {
    let aliases = FIELD_ALIASES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, aliases)| *aliases)?;
    columns
        .iter()
        .find(|c| aliases.iter().any(|a| c.eq_ignore_ascii_case(a)))
        .map(String::as_str)
}

/// Header index for every `FIELD_ALIASES` entry, resolved the same
/// case-insensitive way as `detect_dimensions`.
pub(crate) fn column_positions(columns: &[String]) -> Vec<Option<usize>> {
    FIELD_ALIASES
        .iter()
        .map(|(field, _)| {
            resolve_column(field, columns).and_then(|col| columns.iter().position(|c| c.as_str() == col))
        })
        .collect()
}

/// Which dimensions a set of column names provides.
pub(crate) fn detect_dimensions(columns: &[String]) -> Dimensions {
    let mut dimensions = Dimensions::all();
    for dim in Dimension::ALL {
        dimensions.set(dim, resolve_column(dim.column(), columns).is_some());
    }
    dimensions
}

/// Turn a raw row into a record. Returns `None` (and counts the skip) when
/// a present year/month column holds something unusable; amounts never
/// cause a skip, they are coerced to `0.0`.
pub(crate) fn clean_row(
    row: RawRow,
    dimensions: &Dimensions,
    report: &mut LoadReport,
) -> Option<MeasurementRecord> {
    let year = if dimensions.year {
        match parse_i32_safe(row.year.as_deref()) {
            Some(y) => y,
            None => {
                report.skipped_rows += 1;
                return None;
            }
        }
    } else {
        0
    };
    let month = if dimensions.month {
        match parse_i32_safe(row.month.as_deref()) {
            Some(m) if (1..=12).contains(&m) => m as u32,
            _ => {
                report.skipped_rows += 1;
                return None;
            }
        }
    } else {
        0
    };

    let category = match row.category.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => {
            let parsed = Category::parse(s);
            if parsed.is_none() {
                report.unknown_categories += 1;
            }
            parsed
        }
        _ => None,
    };

    let (budgeted_amount, coerced_b) = coerce_amount(row.budgeted_amount.as_deref());
    let (measured_amount, coerced_m) = coerce_amount(row.measured_amount.as_deref());
    report.coerced_amounts += usize::from(coerced_b) + usize::from(coerced_m);

    Some(MeasurementRecord {
        year,
        month,
        project: row.project.unwrap_or_default().trim().to_string(),
        supplier: row.supplier.unwrap_or_default().trim().to_string(),
        category,
        contract: row.contract.filter(|c| !c.trim().is_empty()),
        budgeted_amount,
        measured_amount,
    })
}

pub fn load_csv<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<(Dataset, LoadReport)> {
    let file = std::fs::File::open(path)?;
    read_csv(file, delimiter)
}

/// Read a record export back into a dataset. Rows whose dimension values
/// cannot be parsed are skipped; unparseable amounts become `0.0`.
pub fn read_csv<R: Read>(mut reader: R, delimiter: u8) -> Result<(Dataset, LoadReport)> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);

    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let dimensions = detect_dimensions(&headers);
    let positions = column_positions(&headers);

    let mut report = LoadReport {
        missing_columns: dimensions.missing(),
        ..LoadReport::default()
    };
    let mut records = Vec::new();

    for result in rdr.records() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => RawRow::from_record(&r, &positions),
            Err(_) => {
                report.skipped_rows += 1;
                continue;
            }
        };
        if let Some(record) = clean_row(row, &dimensions, &mut report) {
            records.push(record);
        }
    }

    Ok((
        Dataset {
            records,
            dimensions,
        },
        report,
    ))
}
