use crate::error::{ReportError, Result};
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "measurement_report.toml";

/// Parameters for the synthetic fact table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub years: Vec<i32>,
    pub projects: Vec<String>,
    pub suppliers: Vec<String>,
    pub categories: Vec<Category>,
    pub budget_min: f64,
    pub budget_max: f64,
    /// Measured amount is `budgeted * U(multiplier_min, multiplier_max)`.
    pub multiplier_min: f64,
    pub multiplier_max: f64,
    /// Attach a `CT-NNN` contract identifier per supplier.
    pub contracts: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            years: vec![2023, 2024, 2025],
            projects: ('A'..='E').map(|c| format!("Projeto {c}")).collect(),
            suppliers: (1..=10).map(|i| format!("Fornecedor {i}")).collect(),
            categories: Category::ALL.to_vec(),
            budget_min: 5_000.0,
            budget_max: 50_000.0,
            multiplier_min: 0.8,
            multiplier_max: 1.2,
            contracts: false,
        }
    }
}

impl GeneratorConfig {
    /// One project and one supplier with large monthly totals and a wider
    /// measured band, as used by the monthly-totals dashboard.
    pub fn monthly_totals() -> Self {
        Self {
            projects: vec!["Projeto Geral".to_string()],
            suppliers: vec!["Fornecedor Geral".to_string()],
            budget_min: 400_000.0,
            budget_max: 800_000.0,
            multiplier_min: 0.6,
            multiplier_max: 1.2,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("budget_min", self.budget_min),
            ("budget_max", self.budget_max),
            ("multiplier_min", self.multiplier_min),
            ("multiplier_max", self.multiplier_max),
        ];
        for (name, value) in bounds {
            if !value.is_finite() {
                return Err(ReportError::Config(format!("{name} must be finite")));
            }
        }
        Ok(())
    }
}

/// Presentation and export settings, passed explicitly to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// num-format locale name, e.g. `pt`, `en`, `de`.
    pub locale: String,
    pub currency_symbol: String,
    /// `,` or `;`
    pub csv_delimiter: String,
    /// Prefix CSV output with a UTF-8 byte-order mark.
    pub csv_bom: bool,
    /// Number of groups shown in top-N project/supplier views.
    pub top_n: usize,
    pub outlier_sigma: f64,
    pub overrun_threshold_pct: f64,
    /// Restart month-grouping cumulative sums at each new year.
    pub cumulative_reset_yearly: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            locale: "pt".to_string(),
            currency_symbol: "R$".to_string(),
            csv_delimiter: ",".to_string(),
            csv_bom: false,
            top_n: 10,
            outlier_sigma: 3.0,
            overrun_threshold_pct: 120.0,
            cumulative_reset_yearly: false,
        }
    }
}

impl ReportConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.csv_delimiter.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(ReportError::Config(format!(
                "csv_delimiter must be a single ASCII character, got '{}'",
                self.csv_delimiter
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.delimiter_byte()?;
        if !self.outlier_sigma.is_finite() || !self.overrun_threshold_pct.is_finite() {
            return Err(ReportError::Config(
                "outlier_sigma and overrun_threshold_pct must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub generator: GeneratorConfig,
    pub report: ReportConfig,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.generator.validate()?;
        config.report.validate()?;
        Ok(config)
    }

    /// Use `./measurement_report.toml` when present, defaults otherwise.
    pub fn load_from_standard_locations() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            log::debug!("Loading configuration from {}", path.display());
            return Self::load_from_file(path);
        }
        Ok(Self::default())
    }

    pub fn merge_with_cli(&mut self, cli: &CliOverrides) {
        if let Some(seed) = cli.seed {
            self.generator.seed = seed;
        }
        if let Some(ref locale) = cli.locale {
            self.report.locale = locale.clone();
        }
        if let Some(ref delimiter) = cli.csv_delimiter {
            self.report.csv_delimiter = delimiter.clone();
        }
        if cli.csv_bom {
            self.report.csv_bom = true;
        }
        if let Some(top_n) = cli.top_n {
            self.report.top_n = top_n;
        }
        if cli.contracts {
            self.generator.contracts = true;
        }
        if cli.cumulative_reset_yearly {
            self.report.cumulative_reset_yearly = true;
        }
    }
}

/// Configuration values that can come from the command line.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub seed: Option<u64>,
    pub locale: Option<String>,
    pub csv_delimiter: Option<String>,
    pub csv_bom: bool,
    pub top_n: Option<usize>,
    pub contracts: bool,
    pub cumulative_reset_yearly: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.generator.years, vec![2023, 2024, 2025]);
        assert_eq!(config.generator.projects.len(), 5);
        assert_eq!(config.generator.suppliers.len(), 10);
        assert_eq!(config.report.locale, "pt");
        assert_eq!(config.report.outlier_sigma, 3.0);
    }

    #[test]
    fn test_config_load_from_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(
            b"[generator]\nseed = 7\nyears = [2024]\ncategories = [\"labor\"]\n\n[report]\nlocale = \"en\"\ncsv_delimiter = \";\"\n",
        )?;

        let config = AppConfig::load_from_file(file.path())?;
        assert_eq!(config.generator.seed, 7);
        assert_eq!(config.generator.years, vec![2024]);
        assert_eq!(config.generator.categories, vec![Category::Labor]);
        assert_eq!(config.generator.budget_min, 5_000.0);
        assert_eq!(config.report.locale, "en");
        assert_eq!(config.report.delimiter_byte()?, b';');
        Ok(())
    }

    #[test]
    fn test_config_rejects_bad_delimiter() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"[report]\ncsv_delimiter = \";;\"\n")?;
        assert!(matches!(
            AppConfig::load_from_file(file.path()),
            Err(ReportError::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn test_config_merge_with_cli() {
        let mut config = AppConfig::default();
        let cli = CliOverrides {
            seed: Some(99),
            locale: Some("en".to_string()),
            csv_bom: true,
            ..Default::default()
        };

        config.merge_with_cli(&cli);

        assert_eq!(config.generator.seed, 99);
        assert_eq!(config.report.locale, "en");
        assert!(config.report.csv_bom);
        assert_eq!(config.report.csv_delimiter, ",");
    }

    #[test]
    fn test_monthly_totals_preset() {
        let config = GeneratorConfig::monthly_totals();
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.multiplier_min, 0.6);
        assert!(config.validate().is_ok());
    }
}
