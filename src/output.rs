use crate::config::ReportConfig;
use crate::error::{ReportError, Result};
use crate::types::{AggregateExportRow, Category, RecordExportRow, Report, ReportStatus};
use crate::util::{format_currency, format_pct, resolve_locale};
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const COLOR_PRIMARY: &str = "#1f4e79";
const COLOR_SECONDARY: &str = "#6c757d";
const COLOR_ALERT: &str = "#d9534f";
const COLOR_SUCCESS: &str = "#28a745";

const MONEY_FORMAT: &str = "#,##0.00";
const PCT_FORMAT: &str = "+0.00\"%\";-0.00\"%\"";

/// Serialize rows to CSV. Headers come from the row type's field names.
pub fn csv_bytes<T: Serialize>(rows: &[T], delimiter: u8, bom: bool) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if bom {
        buf.extend_from_slice(UTF8_BOM);
    }
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(buf);
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.into_inner()
        .map_err(|e| ReportError::Io(e.into_error()))
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T], config: &ReportConfig) -> Result<()> {
    let bytes = csv_bytes(rows, config.delimiter_byte()?, config.csv_bom)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// One spreadsheet cell. Amounts stay numeric; only the display format
/// differs.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Money(f64),
    Percent(f64),
    Empty,
}

pub trait SheetRow {
    fn headers() -> &'static [&'static str];
    fn cells(&self) -> Vec<Cell>;
}

impl SheetRow for RecordExportRow {
    fn headers() -> &'static [&'static str] {
        &[
            "Year",
            "Month",
            "Project",
            "Supplier",
            "Category",
            "Contract",
            "Budgeted",
            "Measured",
            "Difference",
            "Deviation (%)",
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(i64::from(self.year)),
            Cell::Int(i64::from(self.month)),
            Cell::Text(self.project.clone()),
            Cell::Text(self.supplier.clone()),
            self.category
                .map(|c: Category| Cell::Text(c.to_string()))
                .unwrap_or(Cell::Empty),
            self.contract
                .clone()
                .map(Cell::Text)
                .unwrap_or(Cell::Empty),
            Cell::Money(self.budgeted_amount),
            Cell::Money(self.measured_amount),
            Cell::Money(self.deviation_abs),
            Cell::Percent(self.deviation_pct),
        ]
    }
}

impl SheetRow for AggregateExportRow {
    fn headers() -> &'static [&'static str] {
        &[
            "Group",
            "Records",
            "Budgeted",
            "Measured",
            "Difference",
            "Deviation (%)",
            "Execution (%)",
            "Cumulative budgeted",
            "Cumulative measured",
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.group.clone()),
            Cell::Int(self.records as i64),
            Cell::Money(self.total_budgeted),
            Cell::Money(self.total_measured),
            Cell::Money(self.deviation_abs),
            Cell::Percent(self.deviation_pct),
            Cell::Percent(self.execution_pct),
            Cell::Money(self.cumulative_budgeted),
            Cell::Money(self.cumulative_measured),
        ]
    }
}

/// Single-sheet workbook with a bold header row.
pub fn xlsx_bytes<T: SheetRow>(rows: &[T], sheet_name: &str) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let money = Format::new().set_num_format(MONEY_FORMAT);
    let pct = Format::new().set_num_format(PCT_FORMAT);
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name)?;
        for (col, title) in T::headers().iter().enumerate() {
            let col = col as u16;
            sheet.write_string_with_format(0, col, *title, &header)?;
            sheet.set_column_width(col, 18)?;
        }
        for (idx, row) in rows.iter().enumerate() {
            let r = (idx + 1) as u32;
            for (col, cell) in row.cells().into_iter().enumerate() {
                let col = col as u16;
                match cell {
                    Cell::Text(s) => {
                        sheet.write_string(r, col, s)?;
                    }
                    Cell::Int(n) => {
                        sheet.write_number(r, col, n as f64)?;
                    }
                    Cell::Money(v) => {
                        sheet.write_number_with_format(r, col, v, &money)?;
                    }
                    Cell::Percent(v) => {
                        sheet.write_number_with_format(r, col, v, &pct)?;
                    }
                    Cell::Empty => {}
                }
            }
        }
    }
    Ok(workbook.save_to_buffer()?)
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{table_str}\n");
}

/// Console summary: KPI lines, the detail table and any insights.
pub fn print_report(report: &Report, max_rows: usize) {
    match &report.status {
        ReportStatus::Ready => {}
        ReportStatus::NoData { message } | ReportStatus::Unavailable { message } => {
            println!("{message}\n");
        }
    }
    let k = &report.formatted_kpis;
    println!("Total budgeted: {}", k.total_budgeted);
    println!("Total measured: {}", k.total_measured);
    println!("Deviation:      {} ({})", k.deviation_abs, k.deviation_pct);
    println!("Execution:      {}", k.execution_pct);
    println!(
        "Max deviation:  {}   Mean deviation: {}\n",
        k.max_deviation_pct, k.mean_deviation_pct
    );
    preview_table_rows(&report.table, max_rows);

    for o in &report.insights.outliers {
        println!(
            "Outlier: {} / {} {}-{:02} measured {:.2} (threshold {:.2})",
            o.project, o.supplier, o.year, o.month, o.measured_amount, o.threshold
        );
    }
    for s in &report.insights.supplier_overruns {
        println!(
            "Overrun: {} at {:.2}% of budget",
            s.supplier, s.execution_pct
        );
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn sign_color(v: f64) -> &'static str {
    if v >= 0.0 {
        COLOR_SUCCESS
    } else {
        COLOR_ALERT
    }
}

const STYLE: &str = "
body { font-family: Arial, sans-serif; background: #ffffff; color: #1a1a1a; margin: 24px; }
h1 { color: __PRIMARY__; text-align: center; }
.kpis { display: flex; flex-wrap: wrap; justify-content: center; gap: 12px; }
.kpi { background: #f8f9fa; border-radius: 10px; padding: 14px; width: 200px; text-align: center;
       box-shadow: 0 2px 6px rgba(0,0,0,0.06); }
.kpi .title { font-size: 14px; font-weight: bold; color: #444; margin-bottom: 6px; }
.kpi .value { font-size: 20px; font-weight: 600; }
.banner { background: #fff3cd; border: 1px solid #ffe69c; padding: 12px; border-radius: 6px; margin: 16px 0; }
table { border-collapse: collapse; width: 100%; margin-top: 16px; }
th { background: __PRIMARY__; color: #fff; padding: 6px; }
td { padding: 6px; border-bottom: 1px solid #e5e5e5; text-align: right; }
td:first-child { text-align: center; }
.caption { color: __SECONDARY__; font-size: 13px; text-align: center; }
";

const CHART_IDS: [&str; 5] = [
    "chart-bar",
    "chart-cumulative",
    "chart-pie",
    "chart-category-pie",
    "chart-heatmap",
];

const CHART_SCRIPT: &str = "
const charts = __CHARTS__;
const bl = charts.bar_line;
Plotly.newPlot('chart-bar', [
  { type: 'bar', name: 'Budgeted', x: bl.labels, y: bl.budgeted, marker: { color: '__SECONDARY__' } },
  { type: 'bar', name: 'Measured', x: bl.labels, y: bl.measured, marker: { color: '__PRIMARY__' } },
  { type: 'scatter', mode: 'lines+markers', name: 'Deviation (%)', x: bl.labels, y: bl.deviation_pct, yaxis: 'y2' }
], { barmode: 'group', title: 'Budgeted vs Measured', yaxis2: { overlaying: 'y', side: 'right' } });
const cu = charts.cumulative;
Plotly.newPlot('chart-cumulative', [
  { type: 'scatter', name: 'Cumulative budgeted', x: cu.labels, y: cu.budgeted, fill: 'tozeroy' },
  { type: 'scatter', name: 'Cumulative measured', x: cu.labels, y: cu.measured, fill: 'tonexty' }
], { title: 'Cumulative' });
Plotly.newPlot('chart-pie', [
  { type: 'pie', labels: charts.pie.map(s => s.label), values: charts.pie.map(s => s.value) }
], { title: 'Share of measured' });
if (charts.category_pie.length > 0) {
  Plotly.newPlot('chart-category-pie', [
    { type: 'pie', hole: 0.4, labels: charts.category_pie.map(s => s.label),
      values: charts.category_pie.map(s => s.value) }
  ], { title: 'Measured by category' });
}
if (charts.heatmap.cells.length > 0) {
  Plotly.newPlot('chart-heatmap', [
    { type: 'heatmap', z: charts.heatmap.cells, x: charts.heatmap.column_labels,
      y: charts.heatmap.row_labels, colorscale: 'RdYlGn' }
  ], { title: 'Mean deviation (%) by year and month' });
}
";

/// Self-contained HTML page: KPI cards, charts, detail table, insights.
/// `generated_at` is printed in the footer as given.
pub fn render_html(report: &Report, config: &ReportConfig, generated_at: &str) -> Result<String> {
    let style = STYLE
        .replace("__PRIMARY__", COLOR_PRIMARY)
        .replace("__SECONDARY__", COLOR_SECONDARY);
    let body = match &report.status {
        ReportStatus::NoData { message } | ReportStatus::Unavailable { message } => {
            format!("<div class=\"banner\">{}</div>\n", escape_html(message))
        }
        ReportStatus::Ready => format!(
            "{}{}{}{}",
            chart_containers(),
            detail_table_section(report),
            insights_section(report, config),
            chart_script(report)?
        ),
    };

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Measurement Dashboard</title>
<script src="{PLOTLY_CDN}"></script>
<style>{style}</style>
</head>
<body>
<h1>Measurement Dashboard</h1>
<p class="caption">Grouped by {grouping}</p>
{kpis}{body}<p class="caption">Generated {generated_at}</p>
</body>
</html>
"#,
        grouping = escape_html(&report.grouping),
        kpis = kpi_section(report),
        generated_at = escape_html(generated_at),
    ))
}

fn kpi_card(title: &str, value: &str, color: Option<&str>) -> String {
    let style = color
        .map(|c| format!(" style=\"color:{c}\""))
        .unwrap_or_default();
    format!(
        "<div class=\"kpi\"{style}><div class=\"title\">{title}</div><div class=\"value\">{}</div></div>\n",
        escape_html(value)
    )
}

fn kpi_section(report: &Report) -> String {
    let k = &report.formatted_kpis;
    let cards = [
        kpi_card("Total budgeted", &k.total_budgeted, None),
        kpi_card("Total measured", &k.total_measured, None),
        kpi_card(
            "Deviation (%)",
            &k.deviation_pct,
            Some(sign_color(report.kpis.deviation_pct)),
        ),
        kpi_card("Execution (%)", &k.execution_pct, None),
        kpi_card(
            "Max deviation (%)",
            &k.max_deviation_pct,
            Some(sign_color(report.kpis.max_deviation_pct)),
        ),
    ];
    format!(
        "<div class=\"kpis\">\n{}</div>\n<p class=\"caption\">Mean deviation: {}</p>\n",
        cards.concat(),
        escape_html(&k.mean_deviation_pct)
    )
}

fn chart_containers() -> String {
    CHART_IDS
        .iter()
        .map(|id| format!("<div id=\"{id}\"></div>\n"))
        .collect()
}

fn detail_table_section(report: &Report) -> String {
    let header: String = [
        "Group",
        "Records",
        "Budgeted",
        "Measured",
        "Difference",
        "Deviation",
        "Execution",
    ]
    .iter()
    .map(|h| format!("<th>{h}</th>"))
    .collect();
    let rows: String = report
        .table
        .iter()
        .zip(&report.aggregates)
        .map(|(row, raw)| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td style=\"color:{}\">{}</td><td style=\"color:{}\">{}</td><td>{}</td></tr>\n",
                escape_html(&row.group),
                row.records,
                escape_html(&row.budgeted),
                escape_html(&row.measured),
                sign_color(raw.deviation_abs),
                escape_html(&row.difference),
                sign_color(raw.deviation_pct),
                escape_html(&row.deviation),
                escape_html(&row.execution),
            )
        })
        .collect();
    format!("<table>\n<tr>{header}</tr>\n{rows}</table>\n")
}

fn insights_section(report: &Report, config: &ReportConfig) -> String {
    if report.insights.is_empty() {
        return String::new();
    }
    let locale = resolve_locale(&config.locale);
    let money = |v: f64| escape_html(&format_currency(v, &locale, &config.currency_symbol));
    let outliers = report.insights.outliers.iter().map(|o| {
        format!(
            "<li>Outlier: {} / {} {}-{:02} measured {} (threshold {})</li>\n",
            escape_html(&o.project),
            escape_html(&o.supplier),
            o.year,
            o.month,
            money(o.measured_amount),
            money(o.threshold),
        )
    });
    let overruns = report.insights.supplier_overruns.iter().map(|s| {
        format!(
            "<li>Supplier {} executed {} of budget</li>\n",
            escape_html(&s.supplier),
            escape_html(&format_pct(s.execution_pct, &locale)),
        )
    });
    let items: String = outliers.chain(overruns).collect();
    format!("<h2>Insights</h2>\n<ul>\n{items}</ul>\n")
}

fn chart_script(report: &Report) -> Result<String> {
    // `</` inside an inline script would end the element early.
    let charts = serde_json::to_string(&report.charts)?.replace("</", "<\\/");
    let script = CHART_SCRIPT
        .replace("__CHARTS__", &charts)
        .replace("__PRIMARY__", COLOR_PRIMARY)
        .replace("__SECONDARY__", COLOR_SECONDARY);
    Ok(format!("<script>{script}</script>\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Filter;
    use crate::loader::read_csv;
    use crate::reports::{build_report, ReportRequest};
    use crate::types::{Dataset, GroupingMode, MeasurementRecord};

    fn three_rows() -> Vec<MeasurementRecord> {
        vec![
            MeasurementRecord {
                year: 2023,
                month: 1,
                project: "Projeto A".to_string(),
                supplier: "Fornecedor 1".to_string(),
                category: Some(Category::Labor),
                contract: Some("CT-001".to_string()),
                budgeted_amount: 12_345.67,
                measured_amount: 11_000.01,
            },
            MeasurementRecord {
                year: 2023,
                month: 2,
                project: "Projeto A".to_string(),
                supplier: "Fornecedor, Filial 2".to_string(),
                category: Some(Category::Equipment),
                contract: None,
                budgeted_amount: 5_000.0,
                measured_amount: 6_000.5,
            },
            MeasurementRecord {
                year: 2024,
                month: 12,
                project: "Projeto B".to_string(),
                supplier: "Fornecedor 3".to_string(),
                category: None,
                contract: None,
                budgeted_amount: 0.1,
                measured_amount: 0.2,
            },
        ]
    }

    fn export_rows(records: &[MeasurementRecord]) -> Vec<RecordExportRow> {
        records.iter().map(RecordExportRow::from).collect()
    }

    #[test]
    fn csv_export_round_trips_amounts() -> Result<()> {
        let records = three_rows();
        let bytes = csv_bytes(&export_rows(&records), b',', false)?;
        let (dataset, report) = read_csv(&bytes[..], b',')?;
        assert_eq!(report.skipped_rows, 0);
        assert_eq!(dataset.records.len(), 3);
        for (a, b) in records.iter().zip(&dataset.records) {
            assert!((a.budgeted_amount - b.budgeted_amount).abs() < 1e-9);
            assert!((a.measured_amount - b.measured_amount).abs() < 1e-9);
            assert_eq!(a.supplier, b.supplier);
            assert_eq!(a.category, b.category);
        }
        Ok(())
    }

    #[test]
    fn semicolon_csv_with_bom_round_trips() -> Result<()> {
        let records = three_rows();
        let bytes = csv_bytes(&export_rows(&records), b';', true)?;
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8_lossy(&bytes[UTF8_BOM.len()..]).to_string();
        assert!(text.starts_with("year;month;project;supplier;category;contract"));

        let (dataset, _) = read_csv(&bytes[..], b';')?;
        assert_eq!(dataset.records, records);
        Ok(())
    }

    fn zip_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("xlsx is a zip");
        let mut entry = archive.by_name(name).expect("entry present");
        let mut text = String::new();
        std::io::Read::read_to_string(&mut entry, &mut text).expect("utf-8 entry");
        text
    }

    fn cell_xml<'a>(sheet: &'a str, reference: &str) -> &'a str {
        let start = sheet
            .find(&format!("<c r=\"{reference}\""))
            .expect("cell present");
        let end = start + sheet[start..].find("</c>").expect("cell closed");
        &sheet[start..end]
    }

    #[test]
    fn xlsx_export_keeps_amounts_numeric() -> Result<()> {
        let bytes = xlsx_bytes(&export_rows(&three_rows()), "Measurements")?;
        assert!(bytes.starts_with(b"PK"));

        let workbook = zip_entry(&bytes, "xl/workbook.xml");
        assert_eq!(workbook.matches("<sheet ").count(), 1);
        assert!(workbook.contains("name=\"Measurements\""));

        let strings = zip_entry(&bytes, "xl/sharedStrings.xml");
        for header in RecordExportRow::headers() {
            assert!(strings.contains(header), "missing header {header}");
        }

        let sheet = zip_entry(&bytes, "xl/worksheets/sheet1.xml");
        // Header row is a shared string, amounts are plain numbers with a
        // number-format style attached.
        assert!(cell_xml(&sheet, "A1").contains("t=\"s\""));
        let budgeted = cell_xml(&sheet, "G2");
        assert!(!budgeted.contains("t=\""));
        assert!(budgeted.contains(" s=\""));
        assert!(budgeted.contains("<v>12345.67</v>"));
        let deviation = cell_xml(&sheet, "J4");
        assert!(!deviation.contains("t=\""));
        assert!(deviation.contains(" s=\""));
        assert!(deviation.contains("<v>"));

        let styles = zip_entry(&bytes, "xl/styles.xml");
        assert!(styles.contains("numFmtId=\"4\""));
        assert!(styles.contains("0.00&quot;%&quot;"));
        Ok(())
    }

    #[test]
    fn sheet_cells_match_headers() {
        let rows = export_rows(&three_rows());
        assert_eq!(rows[0].cells().len(), RecordExportRow::headers().len());
        assert_eq!(rows[2].cells()[4], Cell::Empty);
        assert_eq!(rows[0].cells()[6], Cell::Money(12_345.67));
    }

    #[test]
    fn html_page_shows_kpis_and_charts() -> Result<()> {
        let dataset = Dataset::new(three_rows());
        let config = ReportConfig::default();
        let report = build_report(&dataset, &ReportRequest::new(GroupingMode::Month), &config);
        let html = render_html(&report, &config, "16/10/2026 10:00")?;
        assert!(html.contains("R$ 17.345,77"));
        assert!(html.contains("Plotly.newPlot('chart-bar'"));
        assert!(html.contains("<div id=\"chart-category-pie\"></div>"));
        assert!(html.contains("charts.category_pie.map"));
        assert!(html.contains("\"category_pie\":[{\"label\":\"labor\""));
        assert!(html.contains("Jan/2023"));
        assert!(html.contains("Generated 16/10/2026 10:00"));
        assert!(!html.contains("__CHARTS__"));
        Ok(())
    }

    #[test]
    fn html_page_shows_no_data_banner() -> Result<()> {
        let dataset = Dataset::new(three_rows());
        let config = ReportConfig::default();
        let request = ReportRequest {
            filter: Filter::new().with_years([1999]),
            ..ReportRequest::new(GroupingMode::Project)
        };
        let report = build_report(&dataset, &request, &config);
        let html = render_html(&report, &config, "now")?;
        assert!(html.contains("No data for this filter."));
        assert!(!html.contains("Plotly.newPlot"));
        Ok(())
    }

    #[test]
    fn html_escapes_group_names() -> Result<()> {
        let mut records = three_rows();
        records[0].supplier = "<b>Evil</b>".to_string();
        let dataset = Dataset::new(records);
        let config = ReportConfig::default();
        let report = build_report(&dataset, &ReportRequest::new(GroupingMode::Supplier), &config);
        let html = render_html(&report, &config, "now")?;
        assert!(html.contains("&lt;b&gt;Evil&lt;/b&gt;"));
        assert!(!html.contains("<td><b>Evil</b></td>"));
        Ok(())
    }
}
