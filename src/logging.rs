use crate::config::AppConfig;
use crate::loader::LoadReport;
use crate::types::{Dimension, GroupingMode};
use log::{debug, info, warn};

/// Initialize the logger with appropriate level based on verbosity
pub fn init_logger(verbose: bool, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Off
    } else if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // `try_init` so repeated initialisation (tests) does not panic.
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .try_init();

    debug!("Logger initialized with level: {level:?}");
}

pub fn log_config_info(config: &AppConfig) {
    let g = &config.generator;
    let r = &config.report;
    debug!(
        "Generator: seed={}, years={:?}, projects={}, suppliers={}, budget=[{}, {}], multiplier=[{}, {}]",
        g.seed,
        g.years,
        g.projects.len(),
        g.suppliers.len(),
        g.budget_min,
        g.budget_max,
        g.multiplier_min,
        g.multiplier_max
    );
    debug!(
        "Report: locale={}, delimiter='{}', bom={}, top_n={}",
        r.locale, r.csv_delimiter, r.csv_bom, r.top_n
    );
}

pub fn log_load_report(source: &str, report: &LoadReport) {
    info!(
        "Loaded {} record(s) from {source}",
        crate::util::format_int(report.total_rows)
    );
    if report.coerced_amounts > 0 {
        warn!(
            "{} amount value(s) were not numeric and were read as 0.0",
            report.coerced_amounts
        );
    }
    if report.unknown_categories > 0 {
        warn!(
            "{} row(s) carried an unrecognised category",
            report.unknown_categories
        );
    }
    for dim in &report.missing_columns {
        warn!("Column '{dim}' is missing; filtering and grouping by it are disabled");
    }
}

pub fn log_grouping_unavailable(mode: GroupingMode, missing: &[Dimension]) {
    let names: Vec<&str> = missing.iter().map(|d| d.column()).collect();
    warn!(
        "Grouping by {mode} is unavailable (missing column(s): {})",
        names.join(", ")
    );
}

pub fn log_filtered(total: usize, kept: usize) {
    if kept == 0 {
        warn!("No data for this filter ({total} record(s) before filtering)");
    } else {
        info!("Filter kept {kept} of {total} record(s)");
    }
}
