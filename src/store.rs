// Single-file SQLite store: one fact table plus three read-only summary
// views. Every public function opens what it needs and lets the
// connection drop on return; nothing is held across calls.
use crate::aggregate::{build_rows, GroupTotals};
use crate::error::{ReportError, Result};
use crate::loader::{clean_row, detect_dimensions, resolve_column, LoadReport, RawRow, FIELD_ALIASES};
use crate::types::{AggregateRow, Dataset, GroupKey, GroupingMode, MeasurementRecord};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub const TABLE: &str = "measurements";

const CREATE_TABLE: &str = "
    DROP TABLE IF EXISTS measurements;
    CREATE TABLE measurements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        year INTEGER,
        month INTEGER,
        project TEXT,
        supplier TEXT,
        category TEXT,
        contract TEXT,
        budgeted_amount REAL,
        measured_amount REAL
    );
";

const VIEW_MONTH: &str = "vw_month_agg";
const VIEW_PROJECT: &str = "vw_project_agg";
const VIEW_SUPPLIER: &str = "vw_supplier_agg";

const CREATE_VIEWS: [&str; 3] = [
    "CREATE VIEW IF NOT EXISTS vw_month_agg AS
     SELECT year, month,
            CASE month
              WHEN 1 THEN 'Jan' WHEN 2 THEN 'Feb' WHEN 3 THEN 'Mar' WHEN 4 THEN 'Apr'
              WHEN 5 THEN 'May' WHEN 6 THEN 'Jun' WHEN 7 THEN 'Jul' WHEN 8 THEN 'Aug'
              WHEN 9 THEN 'Sep' WHEN 10 THEN 'Oct' WHEN 11 THEN 'Nov' WHEN 12 THEN 'Dec'
            END AS month_abbrev,
            COUNT(*) AS records,
            SUM(budgeted_amount) AS total_budgeted,
            SUM(measured_amount) AS total_measured
     FROM measurements
     GROUP BY year, month",
    "CREATE VIEW IF NOT EXISTS vw_project_agg AS
     SELECT project, COUNT(*) AS records,
            SUM(budgeted_amount) AS total_budgeted,
            SUM(measured_amount) AS total_measured
     FROM measurements
     GROUP BY project",
    "CREATE VIEW IF NOT EXISTS vw_supplier_agg AS
     SELECT supplier, COUNT(*) AS records,
            SUM(budgeted_amount) AS total_budgeted,
            SUM(measured_amount) AS total_measured
     FROM measurements
     GROUP BY supplier",
];

pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    Ok(Connection::open(path)?)
}

/// Drop and recreate the fact table. Existing views are left alone; they
/// resolve against the new table.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLE)?;
    Ok(())
}

/// Insert all records in a single transaction.
pub fn insert_records(conn: &mut Connection, records: &[MeasurementRecord]) -> Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO measurements
               (year, month, project, supplier, category, contract, budgeted_amount, measured_amount)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for r in records {
            stmt.execute(params![
                r.year,
                r.month,
                r.project,
                r.supplier,
                r.category.map(|c| c.as_str()),
                r.contract,
                r.budgeted_amount,
                r.measured_amount,
            ])?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

/// Idempotent: safe to run on every setup.
pub fn create_views(conn: &Connection) -> Result<()> {
    for sql in CREATE_VIEWS {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Rebuild the store at `path` from `records` and (re)create the views.
pub fn build_store<P: AsRef<Path>>(path: P, records: &[MeasurementRecord]) -> Result<usize> {
    let mut conn = open(path)?;
    create_schema(&conn)?;
    let written = insert_records(&mut conn, records)?;
    create_views(&conn)?;
    Ok(written)
}

fn check_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ReportError::InvalidArgument(format!(
            "'{name}' is not a valid table name"
        )))
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

pub fn has_table(conn: &Connection, table: &str) -> Result<bool> {
    check_identifier(table)?;
    Ok(!table_columns(conn, table)?.is_empty())
}

fn value_to_text(v: Value) -> Option<String> {
    match v {
        Value::Null | Value::Blob(_) => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
    }
}

pub fn load_dataset<P: AsRef<Path>>(path: P, table: &str) -> Result<(Dataset, LoadReport)> {
    let conn = open(path)?;
    load_dataset_from(&conn, table)
}

/// Read every row of `table`. Only the columns that exist are selected;
/// absent dimensions are reported, absent or non-numeric amounts read as 0.0.
pub fn load_dataset_from(conn: &Connection, table: &str) -> Result<(Dataset, LoadReport)> {
    check_identifier(table)?;
    let columns = table_columns(conn, table)?;
    if columns.is_empty() {
        return Err(ReportError::InvalidArgument(format!(
            "store has no '{table}' table"
        )));
    }
    let dimensions = detect_dimensions(&columns);

    let select: Vec<String> = FIELD_ALIASES
        .iter()
        .map(|(field, _)| match resolve_column(field, &columns) {
            Some(col) => format!("\"{col}\" AS {field}"),
            None => format!("NULL AS {field}"),
        })
        .collect();
    let sql = format!("SELECT {} FROM {table}", select.join(", "));

    let mut stmt = conn.prepare(&sql)?;
    let raw_rows = stmt
        .query_map([], |row| {
            Ok(RawRow {
                year: value_to_text(row.get(0)?),
                month: value_to_text(row.get(1)?),
                project: value_to_text(row.get(2)?),
                supplier: value_to_text(row.get(3)?),
                category: value_to_text(row.get(4)?),
                contract: value_to_text(row.get(5)?),
                budgeted_amount: value_to_text(row.get(6)?),
                measured_amount: value_to_text(row.get(7)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut report = LoadReport {
        missing_columns: dimensions.missing(),
        ..LoadReport::default()
    };
    let mut records = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        report.total_rows += 1;
        if let Some(record) = clean_row(raw, &dimensions, &mut report) {
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

fn view_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'view' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn amount(v: Value) -> f64 {
    match v {
        Value::Integer(i) => i as f64,
        Value::Real(f) => f,
        other => crate::util::coerce_amount(value_to_text(other).as_deref()).0,
    }
}

/// Read one precomputed summary view. `Ok(None)` when the view has not
/// been created.
pub fn load_view(conn: &Connection, mode: GroupingMode) -> Result<Option<Vec<AggregateRow>>> {
    let (view, sql) = match mode {
        GroupingMode::Month => (
            VIEW_MONTH,
            "SELECT year, month, records, total_budgeted, total_measured FROM vw_month_agg",
        ),
        GroupingMode::Project => (
            VIEW_PROJECT,
            "SELECT project, NULL, records, total_budgeted, total_measured FROM vw_project_agg",
        ),
        GroupingMode::Supplier => (
            VIEW_SUPPLIER,
            "SELECT supplier, NULL, records, total_budgeted, total_measured FROM vw_supplier_agg",
        ),
    };
    if !view_exists(conn, view)? {
        log::warn!("View {view} is not available");
        return Ok(None);
    }

    let mut stmt = conn.prepare(sql)?;
    let totals = stmt
        .query_map([], |row| {
            let first: Value = row.get(0)?;
            let second: Value = row.get(1)?;
            let record_count: i64 = row.get(2)?;
            let key = match mode {
                GroupingMode::Month => GroupKey::Month {
                    year: amount(first) as i32,
                    month: amount(second) as u32,
                },
                GroupingMode::Project => GroupKey::Project(value_to_text(first).unwrap_or_default()),
                GroupingMode::Supplier => {
                    GroupKey::Supplier(value_to_text(first).unwrap_or_default())
                }
            };
            Ok(GroupTotals {
                key,
                record_count: record_count.max(0) as usize,
                total_budgeted: amount(row.get(3)?),
                total_measured: amount(row.get(4)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(build_rows(totals, false)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::generator::generate;
    use crate::types::{Category, Dimension};

    fn seeded(records: &[MeasurementRecord]) -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        create_schema(&conn).expect("schema");
        insert_records(&mut conn, records).expect("insert");
        conn
    }

    #[test]
    fn records_round_trip_through_the_store() -> Result<()> {
        let records = generate(&GeneratorConfig {
            years: vec![2024],
            contracts: true,
            ..GeneratorConfig::default()
        });
        let conn = seeded(&records);
        let (dataset, report) = load_dataset_from(&conn, TABLE)?;
        assert_eq!(report.total_rows, records.len());
        assert_eq!(report.coerced_amounts, 0);
        assert!(report.missing_columns.is_empty());
        assert_eq!(dataset.records, records);
        Ok(())
    }

    #[test]
    fn views_are_idempotent_and_match_grouping() -> Result<()> {
        let records = generate(&GeneratorConfig {
            years: vec![2023],
            ..GeneratorConfig::default()
        });
        let conn = seeded(&records);
        create_views(&conn)?;
        create_views(&conn)?;

        let months = load_view(&conn, GroupingMode::Month)?.expect("month view");
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].key, GroupKey::Month { year: 2023, month: 1 });
        assert_eq!(months[0].record_count, 50);

        let suppliers = load_view(&conn, GroupingMode::Supplier)?.expect("supplier view");
        assert_eq!(suppliers.len(), 10);
        let view_total: f64 = suppliers.iter().map(|r| r.total_budgeted).sum();
        let raw_total: f64 = records.iter().map(|r| r.budgeted_amount).sum();
        assert!((view_total - raw_total).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn missing_view_is_reported_as_unavailable() -> Result<()> {
        let conn = seeded(&[]);
        assert!(has_table(&conn, TABLE)?);
        assert!(!has_table(&conn, "vw_month_agg")?);
        assert_eq!(load_view(&conn, GroupingMode::Project)?, None);
        Ok(())
    }

    #[test]
    fn legacy_schema_degrades_gracefully() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE medicoes (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 ano INTEGER, mes INTEGER, fornecedor TEXT, categoria TEXT,
                 valor_orcado REAL, valor_medido TEXT
             );
             INSERT INTO medicoes (ano, mes, fornecedor, categoria, valor_orcado, valor_medido)
             VALUES (2023, 1, 'Fornecedor 1', 'Materiais', 1000.0, '950.5'),
                    (2023, 2, 'Fornecedor 2', 'Serviços', 500, 'n/a');",
        )?;
        let (dataset, report) = load_dataset_from(&conn, "medicoes")?;
        assert_eq!(report.missing_columns, vec![Dimension::Project]);
        assert_eq!(report.coerced_amounts, 1);
        assert!(!dataset.dimensions.project);
        assert_eq!(dataset.records.len(), 2);
        assert_eq!(dataset.records[0].measured_amount, 950.5);
        assert_eq!(dataset.records[0].category, Some(Category::Materials));
        assert_eq!(dataset.records[1].budgeted_amount, 500.0);
        assert_eq!(dataset.records[1].measured_amount, 0.0);
        Ok(())
    }

    #[test]
    fn unknown_table_is_an_error() {
        let conn = Connection::open_in_memory().expect("open");
        assert!(matches!(
            load_dataset_from(&conn, "nothing_here"),
            Err(ReportError::InvalidArgument(_))
        ));
        assert!(matches!(
            load_dataset_from(&conn, "x; DROP TABLE y"),
            Err(ReportError::InvalidArgument(_))
        ));
    }

    #[test]
    fn build_store_writes_a_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("measurements.db");
        let records = generate(&GeneratorConfig {
            years: vec![2025],
            projects: vec!["P".to_string()],
            suppliers: vec!["S".to_string()],
            ..GeneratorConfig::default()
        });
        assert_eq!(build_store(&path, &records)?, 12);
        // Rebuilding replaces rather than appends.
        assert_eq!(build_store(&path, &records)?, 12);
        let (dataset, _) = load_dataset(&path, TABLE)?;
        assert_eq!(dataset.records.len(), 12);
        Ok(())
    }
}
