use crate::aggregate::{
    apply_filter, category_totals, group_records, order_rows, totals, Filter, GroupOptions,
    Grouping, RowOrder,
};
use crate::config::ReportConfig;
use crate::types::{
    AggregateExportRow, AggregateRow, BarLineSeries, Charts, CumulativeSeries, Dataset,
    DetailRow, Dimensions, FormattedKpis, GroupKey, GroupingMode, Heatmap, Insights, Kpis,
    MeasurementRecord, OutlierRecord, PieSlice, Report, ReportStatus, SupplierOverrun,
};
use crate::util::{
    average, format_currency, format_pct, month_abbrev, resolve_locale, safe_pct, std_dev,
};
use num_format::Locale;
use std::collections::BTreeMap;

pub const NO_DATA_MESSAGE: &str = "No data for this filter.";

/// What the presentation layer asks for on each interaction.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub filter: Filter,
    pub mode: GroupingMode,
    /// Show only the `top_n` largest projects/suppliers by budget.
    pub top: bool,
}

impl ReportRequest {
    pub fn new(mode: GroupingMode) -> Self {
        Self {
            filter: Filter::default(),
            mode,
            top: false,
        }
    }
}

pub fn group_label(key: &GroupKey, locale_name: &str) -> String {
    match key {
        GroupKey::Month { year, month } => format!("{}/{}", month_abbrev(*month, locale_name), year),
        GroupKey::Project(name) | GroupKey::Supplier(name) => {
            if name.is_empty() {
                "(none)".to_string()
            } else {
                name.clone()
            }
        }
    }
}

pub fn compute_kpis(rows: &[AggregateRow]) -> Kpis {
    if rows.is_empty() {
        return Kpis::default();
    }
    let total_budgeted: f64 = rows.iter().map(|r| r.total_budgeted).sum();
    let total_measured: f64 = rows.iter().map(|r| r.total_measured).sum();
    let deviation_abs = total_measured - total_budgeted;
    let deviations: Vec<f64> = rows.iter().map(|r| r.deviation_pct).collect();
    let max_deviation_pct = deviations
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    Kpis {
        total_budgeted,
        total_measured,
        deviation_abs,
        deviation_pct: safe_pct(deviation_abs, total_budgeted),
        execution_pct: safe_pct(total_measured, total_budgeted),
        max_deviation_pct,
        mean_deviation_pct: average(&deviations),
        record_count: rows.iter().map(|r| r.record_count).sum(),
        group_count: rows.len(),
    }
}

/// Totals straight from records, for when no grouping is available.
fn kpis_from_records(records: &[&MeasurementRecord]) -> Kpis {
    let (total_budgeted, total_measured) = totals(records);
    let deviation_abs = total_measured - total_budgeted;
    Kpis {
        total_budgeted,
        total_measured,
        deviation_abs,
        deviation_pct: safe_pct(deviation_abs, total_budgeted),
        execution_pct: safe_pct(total_measured, total_budgeted),
        record_count: records.len(),
        ..Kpis::default()
    }
}

pub fn format_kpis(kpis: &Kpis, locale: &Locale, symbol: &str) -> FormattedKpis {
    FormattedKpis {
        total_budgeted: format_currency(kpis.total_budgeted, locale, symbol),
        total_measured: format_currency(kpis.total_measured, locale, symbol),
        deviation_abs: format_currency(kpis.deviation_abs, locale, symbol),
        deviation_pct: format_pct(kpis.deviation_pct, locale),
        execution_pct: format_pct(kpis.execution_pct, locale),
        max_deviation_pct: format_pct(kpis.max_deviation_pct, locale),
        mean_deviation_pct: format_pct(kpis.mean_deviation_pct, locale),
    }
}

pub fn detail_table(rows: &[AggregateRow], config: &ReportConfig) -> Vec<DetailRow> {
    let locale = resolve_locale(&config.locale);
    let symbol = config.currency_symbol.as_str();
    rows.iter()
        .map(|r| DetailRow {
            group: group_label(&r.key, &config.locale),
            records: r.record_count,
            budgeted: format_currency(r.total_budgeted, &locale, symbol),
            measured: format_currency(r.total_measured, &locale, symbol),
            difference: format_currency(r.deviation_abs, &locale, symbol),
            deviation: format_pct(r.deviation_pct, &locale),
            execution: format_pct(r.execution_pct, &locale),
        })
        .collect()
}

/// Numeric rows for CSV/XLSX export of the grouped view.
pub fn aggregate_export_rows(rows: &[AggregateRow], locale_name: &str) -> Vec<AggregateExportRow> {
    rows.iter()
        .map(|r| AggregateExportRow {
            group: group_label(&r.key, locale_name),
            records: r.record_count,
            total_budgeted: r.total_budgeted,
            total_measured: r.total_measured,
            deviation_abs: r.deviation_abs,
            deviation_pct: r.deviation_pct,
            execution_pct: r.execution_pct,
            cumulative_budgeted: r.cumulative_budgeted,
            cumulative_measured: r.cumulative_measured,
        })
        .collect()
}

pub fn bar_line_series(rows: &[AggregateRow], locale_name: &str) -> BarLineSeries {
    BarLineSeries {
        labels: rows.iter().map(|r| group_label(&r.key, locale_name)).collect(),
        budgeted: rows.iter().map(|r| r.total_budgeted).collect(),
        measured: rows.iter().map(|r| r.total_measured).collect(),
        deviation_pct: rows.iter().map(|r| r.deviation_pct).collect(),
    }
}

pub fn cumulative_series(rows: &[AggregateRow], locale_name: &str) -> CumulativeSeries {
    CumulativeSeries {
        labels: rows.iter().map(|r| group_label(&r.key, locale_name)).collect(),
        budgeted: rows.iter().map(|r| r.cumulative_budgeted).collect(),
        measured: rows.iter().map(|r| r.cumulative_measured).collect(),
    }
}

fn slices(values: Vec<(String, f64)>) -> Vec<PieSlice> {
    let total: f64 = values.iter().map(|(_, v)| v).sum();
    values
        .into_iter()
        .map(|(label, value)| PieSlice {
            share_pct: safe_pct(value, total),
            label,
            value,
        })
        .collect()
}

/// Share of measured amount per group.
pub fn pie_slices(rows: &[AggregateRow], locale_name: &str) -> Vec<PieSlice> {
    slices(
        rows.iter()
            .map(|r| (group_label(&r.key, locale_name), r.total_measured))
            .collect(),
    )
}

pub fn category_pie(records: &[&MeasurementRecord]) -> Vec<PieSlice> {
    slices(
        category_totals(records)
            .into_iter()
            .map(|(c, _, measured)| (c.to_string(), measured))
            .collect(),
    )
}

/// Mean record deviation per (year, month). Empty when the source has no
/// year or month column.
pub fn heatmap(records: &[&MeasurementRecord], dims: &Dimensions, locale_name: &str) -> Heatmap {
    if !dims.year || !dims.month || records.is_empty() {
        return Heatmap::default();
    }
    let mut cells: BTreeMap<i32, [Vec<f64>; 12]> = BTreeMap::new();
    for r in records {
        if !(1..=12).contains(&r.month) {
            continue;
        }
        let row = cells.entry(r.year).or_insert_with(Default::default);
        row[(r.month - 1) as usize].push(r.deviation_pct());
    }
    Heatmap {
        row_labels: cells.keys().map(|y| y.to_string()).collect(),
        column_labels: (1..=12).map(|m| month_abbrev(m, locale_name)).collect(),
        cells: cells
            .values()
            .map(|months| {
                months
                    .iter()
                    .map(|v| (!v.is_empty()).then(|| average(v)))
                    .collect()
            })
            .collect(),
    }
}

/// Records whose measured amount exceeds `mean + sigma * sd` of the set.
pub fn find_outliers(records: &[&MeasurementRecord], sigma: f64) -> Vec<OutlierRecord> {
    let measured: Vec<f64> = records.iter().map(|r| r.measured_amount).collect();
    let sd = std_dev(&measured);
    if sd == 0.0 {
        return Vec::new();
    }
    let threshold = average(&measured) + sigma * sd;
    records
        .iter()
        .filter(|r| r.measured_amount > threshold)
        .map(|r| OutlierRecord {
            year: r.year,
            month: r.month,
            project: r.project.clone(),
            supplier: r.supplier.clone(),
            measured_amount: r.measured_amount,
            threshold,
        })
        .collect()
}

/// Suppliers whose overall execution exceeds `threshold_pct`.
pub fn supplier_overruns(
    records: &[&MeasurementRecord],
    dims: &Dimensions,
    threshold_pct: f64,
) -> Vec<SupplierOverrun> {
    let grouping = group_records(records, GroupingMode::Supplier, dims, &GroupOptions::default());
    grouping
        .rows()
        .iter()
        .filter(|r| r.execution_pct > threshold_pct)
        .map(|r| SupplierOverrun {
            supplier: group_label(&r.key, ""),
            total_budgeted: r.total_budgeted,
            total_measured: r.total_measured,
            execution_pct: r.execution_pct,
        })
        .collect()
}

/// One full recompute: filter, group, and shape everything the
/// presentation layer shows.
pub fn build_report(dataset: &Dataset, request: &ReportRequest, config: &ReportConfig) -> Report {
    let locale = resolve_locale(&config.locale);
    let filtered = apply_filter(dataset, &request.filter);
    crate::logging::log_filtered(dataset.records.len(), filtered.len());

    let options = GroupOptions {
        order: RowOrder::Natural,
        reset_cumulative_yearly: config.cumulative_reset_yearly,
    };
    let grouping = group_records(&filtered, request.mode, &dataset.dimensions, &options);

    let (status, kpis, rows) = match grouping {
        Grouping::Unavailable { mode, missing } => {
            crate::logging::log_grouping_unavailable(mode, &missing);
            let names: Vec<&str> = missing.iter().map(|d| d.column()).collect();
            let message = format!(
                "Grouping by {mode} is unavailable: missing column(s) {}.",
                names.join(", ")
            );
            (
                ReportStatus::Unavailable { message },
                kpis_from_records(&filtered),
                Vec::new(),
            )
        }
        Grouping::Rows(rows) => {
            let kpis = compute_kpis(&rows);
            let status = if filtered.is_empty() {
                ReportStatus::NoData {
                    message: NO_DATA_MESSAGE.to_string(),
                }
            } else {
                ReportStatus::Ready
            };
            let order = if request.top {
                RowOrder::TopBudgeted(config.top_n)
            } else {
                RowOrder::Natural
            };
            (status, kpis, order_rows(rows, request.mode, order))
        }
    };

    let charts = Charts {
        bar_line: bar_line_series(&rows, &config.locale),
        cumulative: cumulative_series(&rows, &config.locale),
        pie: pie_slices(&rows, &config.locale),
        category_pie: if dataset.dimensions.category {
            category_pie(&filtered)
        } else {
            Vec::new()
        },
        heatmap: heatmap(&filtered, &dataset.dimensions, &config.locale),
    };

    let insights = Insights {
        outliers: find_outliers(&filtered, config.outlier_sigma),
        supplier_overruns: supplier_overruns(
            &filtered,
            &dataset.dimensions,
            config.overrun_threshold_pct,
        ),
    };

    Report {
        grouping: request.mode.to_string(),
        formatted_kpis: format_kpis(&kpis, &locale, &config.currency_symbol),
        status,
        kpis,
        table: detail_table(&rows, config),
        aggregates: aggregate_export_rows(&rows, &config.locale),
        charts,
        insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::build_rows;
    use crate::aggregate::GroupTotals;
    use crate::types::Category;

    fn rec(month: u32, supplier: &str, b: f64, m: f64) -> MeasurementRecord {
        MeasurementRecord {
            year: 2024,
            month,
            project: "P".to_string(),
            supplier: supplier.to_string(),
            category: Some(Category::Materials),
            contract: None,
            budgeted_amount: b,
            measured_amount: m,
        }
    }

    fn en() -> ReportConfig {
        ReportConfig {
            locale: "en".to_string(),
            currency_symbol: "$".to_string(),
            ..ReportConfig::default()
        }
    }

    #[test]
    fn kpis_from_groups() {
        let rows = build_rows(
            vec![
                GroupTotals {
                    key: GroupKey::Supplier("A".into()),
                    record_count: 2,
                    total_budgeted: 100.0,
                    total_measured: 150.0,
                },
                GroupTotals {
                    key: GroupKey::Supplier("B".into()),
                    record_count: 1,
                    total_budgeted: 100.0,
                    total_measured: 90.0,
                },
            ],
            false,
        );
        let kpis = compute_kpis(&rows);
        assert_eq!(kpis.total_budgeted, 200.0);
        assert_eq!(kpis.total_measured, 240.0);
        assert_eq!(kpis.deviation_abs, 40.0);
        assert!((kpis.deviation_pct - 20.0).abs() < 1e-9);
        assert!((kpis.execution_pct - 120.0).abs() < 1e-9);
        assert!((kpis.max_deviation_pct - 50.0).abs() < 1e-9);
        assert!((kpis.mean_deviation_pct - 20.0).abs() < 1e-9);
        assert_eq!(kpis.record_count, 3);
        assert_eq!(kpis.group_count, 2);
    }

    #[test]
    fn empty_rows_give_zero_kpis() {
        assert_eq!(compute_kpis(&[]), Kpis::default());
    }

    #[test]
    fn unknown_project_yields_no_data_state() {
        let dataset = Dataset::new(vec![rec(1, "S", 100.0, 100.0), rec(2, "S", 50.0, 60.0)]);
        let request = ReportRequest {
            filter: Filter::new().with_projects(["Missing"]),
            ..ReportRequest::new(GroupingMode::Month)
        };
        let report = build_report(&dataset, &request, &en());
        assert_eq!(
            report.status,
            ReportStatus::NoData {
                message: NO_DATA_MESSAGE.to_string()
            }
        );
        assert_eq!(report.kpis.total_budgeted, 0.0);
        assert_eq!(report.kpis.total_measured, 0.0);
        assert_eq!(report.kpis.execution_pct, 0.0);
        assert_eq!(report.formatted_kpis.execution_pct, "+0.00%");
        assert!(report.table.is_empty());
        assert!(report.charts.bar_line.labels.is_empty());
        assert!(report.charts.heatmap.cells.is_empty());
        assert!(report.insights.is_empty());
    }

    #[test]
    fn table_strings_follow_locale() {
        let dataset = Dataset::new(vec![rec(3, "S", 1234.5, 1000.0)]);
        let report = build_report(&dataset, &ReportRequest::new(GroupingMode::Month), &en());
        assert_eq!(report.status, ReportStatus::Ready);
        let row = &report.table[0];
        assert_eq!(row.group, "Mar/2024");
        assert_eq!(row.budgeted, "$ 1,234.50");
        assert_eq!(row.difference, "$ -234.50");
        assert_eq!(row.deviation, "-19.00%");

        let pt = ReportConfig::default();
        let report = build_report(&dataset, &ReportRequest::new(GroupingMode::Month), &pt);
        assert_eq!(report.table[0].group, "Mar/2024");
        assert_eq!(report.table[0].budgeted, "R$ 1.234,50");
        assert_eq!(report.formatted_kpis.total_measured, "R$ 1.000,00");
    }

    #[test]
    fn chart_series_line_up_with_rows() {
        let dataset = Dataset::new(vec![
            rec(1, "S1", 100.0, 80.0),
            rec(1, "S2", 100.0, 120.0),
            rec(2, "S1", 200.0, 200.0),
        ]);
        let report = build_report(&dataset, &ReportRequest::new(GroupingMode::Supplier), &en());
        let bars = &report.charts.bar_line;
        assert_eq!(bars.labels, vec!["S1", "S2"]);
        assert_eq!(bars.budgeted, vec![300.0, 100.0]);
        assert_eq!(bars.measured, vec![280.0, 120.0]);
        assert_eq!(report.charts.cumulative.budgeted, vec![300.0, 400.0]);
        assert_eq!(report.aggregates[1].group, "S2");
        assert_eq!(report.aggregates[1].execution_pct, 120.0);

        let share: f64 = report.charts.pie.iter().map(|s| s.share_pct).sum();
        assert!((share - 100.0).abs() < 1e-9);
        assert_eq!(report.charts.category_pie.len(), 1);
        assert_eq!(report.charts.category_pie[0].label, "materials");

        let heat = &report.charts.heatmap;
        assert_eq!(heat.row_labels, vec!["2024"]);
        assert_eq!(heat.column_labels.len(), 12);
        assert_eq!(heat.cells[0][0], Some(0.0));
        assert_eq!(heat.cells[0][1], Some(0.0));
        assert_eq!(heat.cells[0][2], None);
    }

    #[test]
    fn top_n_keeps_kpis_over_all_groups() {
        let dataset = Dataset::new(vec![
            rec(1, "S1", 100.0, 100.0),
            rec(1, "S2", 300.0, 300.0),
            rec(1, "S3", 200.0, 200.0),
        ]);
        let config = ReportConfig {
            top_n: 2,
            ..en()
        };
        let request = ReportRequest {
            top: true,
            ..ReportRequest::new(GroupingMode::Supplier)
        };
        let report = build_report(&dataset, &request, &config);
        let groups: Vec<&str> = report.table.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(groups, vec!["S2", "S3"]);
        assert_eq!(report.kpis.total_budgeted, 600.0);
        assert_eq!(report.kpis.group_count, 3);
    }

    #[test]
    fn unavailable_grouping_still_reports_totals() {
        let mut dataset = Dataset::new(vec![rec(1, "S", 100.0, 110.0)]);
        dataset.dimensions.project = false;
        let report = build_report(&dataset, &ReportRequest::new(GroupingMode::Project), &en());
        assert!(matches!(report.status, ReportStatus::Unavailable { .. }));
        assert_eq!(report.kpis.total_measured, 110.0);
        assert!((report.kpis.execution_pct - 110.0).abs() < 1e-9);
        assert!(report.table.is_empty());
    }

    #[test]
    fn outliers_use_three_sigma_of_measured() {
        let mut records: Vec<MeasurementRecord> =
            (0..20).map(|i| rec(1 + i % 12, "S", 100.0, 100.0)).collect();
        records.push(rec(6, "Big", 100.0, 10_000.0));
        let refs: Vec<&MeasurementRecord> = records.iter().collect();
        let outliers = find_outliers(&refs, 3.0);
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].supplier, "Big");
        assert!(outliers[0].threshold < 10_000.0);

        let flat: Vec<&MeasurementRecord> = records[..20].iter().collect();
        assert!(find_outliers(&flat, 3.0).is_empty());
    }

    #[test]
    fn suppliers_over_threshold_are_flagged() {
        let records = vec![
            rec(1, "S1", 100.0, 130.0),
            rec(1, "S2", 100.0, 110.0),
            rec(2, "S3", 0.0, 50.0),
        ];
        let refs: Vec<&MeasurementRecord> = records.iter().collect();
        let flagged = supplier_overruns(&refs, &Dimensions::all(), 120.0);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].supplier, "S1");
        assert!((flagged[0].execution_pct - 130.0).abs() < 1e-9);
    }
}
