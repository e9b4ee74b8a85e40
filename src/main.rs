// Entry point and high-level CLI flow.
//
// - `generate` builds the SQLite store from synthetic data.
// - `views` prints the precomputed summary views.
// - `report` loads the store (or a CSV export), applies filters and
//   writes the requested outputs.
mod aggregate;
mod config;
mod error;
mod generator;
mod loader;
mod logging;
mod output;
mod reports;
mod store;
mod types;
mod util;

use aggregate::Filter;
use clap::{Args, Parser, Subcommand};
use config::{AppConfig, CliOverrides, GeneratorConfig};
use error::Result;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use types::{AggregateExportRow, Category, GroupingMode, RecordExportRow};

const DEFAULT_DB: &str = "measurements.db";
const PREVIEW_ROWS: usize = 12;

#[derive(Parser)]
#[command(author, version, about = "Budget vs measurement reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Suppress log output
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Use specific config file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate synthetic records and rebuild the store
    Generate {
        #[arg(long, value_name = "PATH", default_value = DEFAULT_DB)]
        db: PathBuf,

        /// Random seed (default: 42)
        #[arg(long)]
        seed: Option<u64>,

        /// Attach a contract identifier per supplier
        #[arg(long)]
        contracts: bool,

        /// One project/supplier with large monthly totals
        #[arg(long)]
        monthly_totals: bool,
    },
    /// Create the summary views if needed and print them
    Views {
        #[arg(long, value_name = "PATH", default_value = DEFAULT_DB)]
        db: PathBuf,

        #[arg(long, value_name = "LOCALE")]
        locale: Option<String>,
    },
    /// Filter, group and export
    Report(ReportArgs),
}

#[derive(Args)]
struct ReportArgs {
    // Input
    #[arg(long, value_name = "PATH", help_heading = "Input")]
    db: Option<PathBuf>,

    /// Read a record CSV export instead of the store
    #[arg(long, value_name = "PATH", conflicts_with = "db", help_heading = "Input")]
    csv: Option<PathBuf>,

    /// Fact table to read from the store
    #[arg(long, value_name = "NAME", default_value = store::TABLE, help_heading = "Input")]
    table: String,

    // Grouping & filters
    /// month, project or supplier
    #[arg(long, default_value = "month", help_heading = "Grouping & Filters")]
    group: GroupingMode,

    #[arg(long, value_delimiter = ',', help_heading = "Grouping & Filters")]
    years: Vec<i32>,

    #[arg(long, value_delimiter = ',', help_heading = "Grouping & Filters")]
    months: Vec<u32>,

    #[arg(long, value_delimiter = ',', help_heading = "Grouping & Filters")]
    projects: Vec<String>,

    #[arg(long, value_delimiter = ',', help_heading = "Grouping & Filters")]
    suppliers: Vec<String>,

    #[arg(long, value_delimiter = ',', help_heading = "Grouping & Filters")]
    categories: Vec<Category>,

    /// Only the largest groups by budget (project/supplier grouping)
    #[arg(long, help_heading = "Grouping & Filters")]
    top: bool,

    #[arg(long, value_name = "N", help_heading = "Grouping & Filters")]
    top_n: Option<usize>,

    /// Restart cumulative sums each year
    #[arg(long, help_heading = "Grouping & Filters")]
    cumulative_reset_yearly: bool,

    // Formatting
    #[arg(long, value_name = "LOCALE", help_heading = "Formatting")]
    locale: Option<String>,

    #[arg(long, value_name = "CHAR", help_heading = "Formatting")]
    csv_delimiter: Option<String>,

    /// Prefix CSV exports with a UTF-8 BOM
    #[arg(long, help_heading = "Formatting")]
    csv_bom: bool,

    // Outputs
    /// Grouped table as CSV
    #[arg(long, value_name = "PATH", help_heading = "Outputs")]
    export_csv: Option<PathBuf>,

    /// Grouped table as XLSX
    #[arg(long, value_name = "PATH", help_heading = "Outputs")]
    export_xlsx: Option<PathBuf>,

    /// Filtered records as CSV
    #[arg(long, value_name = "PATH", help_heading = "Outputs")]
    export_records: Option<PathBuf>,

    /// Filtered records as XLSX
    #[arg(long, value_name = "PATH", help_heading = "Outputs")]
    export_records_xlsx: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help_heading = "Outputs")]
    html: Option<PathBuf>,

    /// Full report as JSON
    #[arg(long, value_name = "PATH", help_heading = "Outputs")]
    json: Option<PathBuf>,
}

impl ReportArgs {
    fn filter(&self) -> Filter {
        Filter::new()
            .with_years(self.years.iter().copied())
            .with_months(self.months.iter().copied())
            .with_projects(self.projects.iter().map(|s| s.trim()))
            .with_suppliers(self.suppliers.iter().map(|s| s.trim()))
            .with_categories(self.categories.iter().copied())
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => AppConfig::load_from_file(p),
        None => AppConfig::load_from_standard_locations(),
    }
}

fn handle_generate(
    mut config: AppConfig,
    db: &Path,
    seed: Option<u64>,
    contracts: bool,
    monthly_totals: bool,
) -> Result<()> {
    if monthly_totals {
        config.generator = GeneratorConfig {
            seed: config.generator.seed,
            years: config.generator.years.clone(),
            ..GeneratorConfig::monthly_totals()
        };
    }
    config.merge_with_cli(&CliOverrides {
        seed,
        contracts,
        ..CliOverrides::default()
    });
    config.generator.validate()?;
    logging::log_config_info(&config);

    let records = generator::generate(&config.generator);
    let written = store::build_store(db, &records)?;
    log::info!(
        "Wrote {} record(s) to {}",
        util::format_int(written),
        db.display()
    );
    println!(
        "Store ready: {} ({} records, views created)",
        db.display(),
        util::format_int(written)
    );
    Ok(())
}

fn handle_views(mut config: AppConfig, db: &Path, locale: Option<String>) -> Result<()> {
    config.merge_with_cli(&CliOverrides {
        locale,
        ..CliOverrides::default()
    });
    let conn = store::open(db)?;
    if store::has_table(&conn, store::TABLE)? {
        store::create_views(&conn)?;
    }
    for mode in [GroupingMode::Month, GroupingMode::Project, GroupingMode::Supplier] {
        println!("Summary by {mode}\n");
        match store::load_view(&conn, mode)? {
            Some(rows) => {
                let table = reports::detail_table(&rows, &config.report);
                output::preview_table_rows(&table, table.len());
            }
            None => println!("(view not available; run `generate` first)\n"),
        }
    }
    Ok(())
}

fn handle_report(mut config: AppConfig, args: &ReportArgs) -> Result<()> {
    config.merge_with_cli(&CliOverrides {
        locale: args.locale.clone(),
        csv_delimiter: args.csv_delimiter.clone(),
        csv_bom: args.csv_bom,
        top_n: args.top_n,
        cumulative_reset_yearly: args.cumulative_reset_yearly,
        ..CliOverrides::default()
    });
    config.report.validate()?;
    logging::log_config_info(&config);
    let delimiter = config.report.delimiter_byte()?;

    let (dataset, load_report) = match &args.csv {
        Some(path) => {
            let loaded = loader::load_csv(path, delimiter)?;
            logging::log_load_report(&path.display().to_string(), &loaded.1);
            loaded
        }
        None => {
            let db = args.db.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DB));
            let loaded = store::load_dataset(&db, &args.table)?;
            logging::log_load_report(&db.display().to_string(), &loaded.1);
            loaded
        }
    };
    if load_report.skipped_rows > 0 {
        println!(
            "Note: {} row(s) skipped due to invalid year/month.",
            util::format_int(load_report.skipped_rows)
        );
    }

    let request = reports::ReportRequest {
        filter: args.filter(),
        mode: args.group,
        top: args.top,
    };
    if request.filter.is_unrestricted() {
        log::debug!("No filter applied");
    }
    let report = reports::build_report(&dataset, &request, &config.report);
    output::print_report(&report, PREVIEW_ROWS);

    if let Some(path) = &args.export_csv {
        output::write_csv(path, &report.aggregates, &config.report)?;
        println!("(Grouped table exported to {})", path.display());
    }
    if let Some(path) = &args.export_xlsx {
        let bytes = output::xlsx_bytes::<AggregateExportRow>(&report.aggregates, "Summary")?;
        output::write_bytes(path, &bytes)?;
        println!("(Grouped table exported to {})", path.display());
    }
    if args.export_records.is_some() || args.export_records_xlsx.is_some() {
        let rows: Vec<RecordExportRow> = aggregate::apply_filter(&dataset, &request.filter)
            .into_iter()
            .map(RecordExportRow::from)
            .collect();
        if let Some(path) = &args.export_records {
            output::write_csv(path, &rows, &config.report)?;
            println!("(Records exported to {})", path.display());
        }
        if let Some(path) = &args.export_records_xlsx {
            let bytes = output::xlsx_bytes(&rows, "Measurements")?;
            output::write_bytes(path, &bytes)?;
            println!("(Records exported to {})", path.display());
        }
    }
    if let Some(path) = &args.html {
        let generated_at = chrono::Local::now().format("%d/%m/%Y %H:%M").to_string();
        let html = output::render_html(&report, &config.report, &generated_at)?;
        output::write_bytes(path, html.as_bytes())?;
        println!("(Dashboard written to {})", path.display());
    }
    if let Some(path) = &args.json {
        output::write_json(path, &report)?;
        println!("(Report written to {})", path.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Generate {
            db,
            seed,
            contracts,
            monthly_totals,
        } => handle_generate(config, &db, seed, contracts, monthly_totals),
        Command::Views { db, locale } => handle_views(config, &db, locale),
        Command::Report(args) => handle_report(config, &args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
