use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Labor,
    Materials,
    Services,
    Equipment,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Labor,
        Category::Materials,
        Category::Services,
        Category::Equipment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Labor => "labor",
            Category::Materials => "materials",
            Category::Services => "services",
            Category::Equipment => "equipment",
        }
    }

    /// Accepts the English labels and the Portuguese ones older stores were
    /// written with. Matching ignores case and surrounding whitespace.
    pub fn parse(s: &str) -> Option<Category> {
        match s.trim().to_lowercase().as_str() {
            "labor" | "labour" | "mão de obra" | "mao de obra" => Some(Category::Labor),
            "materials" | "materiais" => Some(Category::Materials),
            "services" | "serviços" | "servicos" => Some(Category::Services),
            "equipment" | "equipamentos" => Some(Category::Equipment),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::parse(s).ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// One budget-vs-measurement fact. Never mutated after generation or load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub year: i32,
    pub month: u32,
    pub project: String,
    pub supplier: String,
    pub category: Option<Category>,
    pub contract: Option<String>,
    pub budgeted_amount: f64,
    pub measured_amount: f64,
}

impl MeasurementRecord {
    pub fn deviation_abs(&self) -> f64 {
        self.measured_amount - self.budgeted_amount
    }

    pub fn deviation_pct(&self) -> f64 {
        crate::util::safe_pct(self.deviation_abs(), self.budgeted_amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Year,
    Month,
    Project,
    Supplier,
    Category,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Year,
        Dimension::Month,
        Dimension::Project,
        Dimension::Supplier,
        Dimension::Category,
    ];

    /// Column name in the fact table and in CSV exports.
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Year => "year",
            Dimension::Month => "month",
            Dimension::Project => "project",
            Dimension::Supplier => "supplier",
            Dimension::Category => "category",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Which dimension columns the record source actually provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub year: bool,
    pub month: bool,
    pub project: bool,
    pub supplier: bool,
    pub category: bool,
}

impl Dimensions {
    pub fn all() -> Self {
        Self {
            year: true,
            month: true,
            project: true,
            supplier: true,
            category: true,
        }
    }

    pub fn has(&self, dim: Dimension) -> bool {
        match dim {
            Dimension::Year => self.year,
            Dimension::Month => self.month,
            Dimension::Project => self.project,
            Dimension::Supplier => self.supplier,
            Dimension::Category => self.category,
        }
    }

    pub fn set(&mut self, dim: Dimension, present: bool) {
        match dim {
            Dimension::Year => self.year = present,
            Dimension::Month => self.month = present,
            Dimension::Project => self.project = present,
            Dimension::Supplier => self.supplier = present,
            Dimension::Category => self.category = present,
        }
    }

    pub fn missing(&self) -> Vec<Dimension> {
        Dimension::ALL.into_iter().filter(|d| !self.has(*d)).collect()
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::all()
    }
}

/// A read-only fact set together with the dimensions it carries.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<MeasurementRecord>,
    pub dimensions: Dimensions,
}

impl Dataset {
    pub fn new(records: Vec<MeasurementRecord>) -> Self {
        Self {
            records,
            dimensions: Dimensions::all(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupingMode {
    Month,
    Project,
    Supplier,
}

impl GroupingMode {
    /// Dimension whose column must be present for this grouping to work.
    /// Month grouping also needs the year column.
    pub fn required(&self) -> &'static [Dimension] {
        match self {
            GroupingMode::Month => &[Dimension::Year, Dimension::Month],
            GroupingMode::Project => &[Dimension::Project],
            GroupingMode::Supplier => &[Dimension::Supplier],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupingMode::Month => "month",
            GroupingMode::Project => "project",
            GroupingMode::Supplier => "supplier",
        }
    }
}

impl fmt::Display for GroupingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "month" | "mes" | "mês" => Ok(GroupingMode::Month),
            "project" | "projeto" => Ok(GroupingMode::Project),
            "supplier" | "fornecedor" => Ok(GroupingMode::Supplier),
            other => Err(format!(
                "unknown grouping '{other}' (expected month, project or supplier)"
            )),
        }
    }
}

/// Ordering of the derived `Ord` matters: months sort by (year, month).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Month { year: i32, month: u32 },
    Project(String),
    Supplier(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub key: GroupKey,
    pub record_count: usize,
    pub total_budgeted: f64,
    pub total_measured: f64,
    pub deviation_abs: f64,
    pub deviation_pct: f64,
    pub execution_pct: f64,
    pub cumulative_budgeted: f64,
    pub cumulative_measured: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub total_budgeted: f64,
    pub total_measured: f64,
    pub deviation_abs: f64,
    pub deviation_pct: f64,
    pub execution_pct: f64,
    pub max_deviation_pct: f64,
    pub mean_deviation_pct: f64,
    pub record_count: usize,
    pub group_count: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DetailRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Records")]
    #[tabled(rename = "Records")]
    pub records: usize,
    #[serde(rename = "Budgeted")]
    #[tabled(rename = "Budgeted")]
    pub budgeted: String,
    #[serde(rename = "Measured")]
    #[tabled(rename = "Measured")]
    pub measured: String,
    #[serde(rename = "Difference")]
    #[tabled(rename = "Difference")]
    pub difference: String,
    #[serde(rename = "Deviation")]
    #[tabled(rename = "Deviation")]
    pub deviation: String,
    #[serde(rename = "Execution")]
    #[tabled(rename = "Execution")]
    pub execution: String,
}

/// Flat, numeric view of a record used for CSV/XLSX export.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecordExportRow {
    pub year: i32,
    pub month: u32,
    pub project: String,
    pub supplier: String,
    pub category: Option<Category>,
    pub contract: Option<String>,
    pub budgeted_amount: f64,
    pub measured_amount: f64,
    pub deviation_abs: f64,
    pub deviation_pct: f64,
}

impl From<&MeasurementRecord> for RecordExportRow {
    fn from(r: &MeasurementRecord) -> Self {
        Self {
            year: r.year,
            month: r.month,
            project: r.project.clone(),
            supplier: r.supplier.clone(),
            category: r.category,
            contract: r.contract.clone(),
            budgeted_amount: r.budgeted_amount,
            measured_amount: r.measured_amount,
            deviation_abs: r.deviation_abs(),
            deviation_pct: r.deviation_pct(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AggregateExportRow {
    pub group: String,
    pub records: usize,
    pub total_budgeted: f64,
    pub total_measured: f64,
    pub deviation_abs: f64,
    pub deviation_pct: f64,
    pub execution_pct: f64,
    pub cumulative_budgeted: f64,
    pub cumulative_measured: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct OutlierRecord {
    pub year: i32,
    pub month: u32,
    pub project: String,
    pub supplier: String,
    pub measured_amount: f64,
    pub threshold: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SupplierOverrun {
    pub supplier: String,
    pub total_budgeted: f64,
    pub total_measured: f64,
    pub execution_pct: f64,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct Insights {
    pub outliers: Vec<OutlierRecord>,
    pub supplier_overruns: Vec<SupplierOverrun>,
}

impl Insights {
    pub fn is_empty(&self) -> bool {
        self.outliers.is_empty() && self.supplier_overruns.is_empty()
    }
}

/// Category labels plus parallel value arrays for bar and line charts.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct BarLineSeries {
    pub labels: Vec<String>,
    pub budgeted: Vec<f64>,
    pub measured: Vec<f64>,
    pub deviation_pct: Vec<f64>,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct CumulativeSeries {
    pub labels: Vec<String>,
    pub budgeted: Vec<f64>,
    pub measured: Vec<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    pub share_pct: f64,
}

/// Mean record deviation (%) per year (rows) and month (columns).
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct Heatmap {
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct Charts {
    pub bar_line: BarLineSeries,
    pub cumulative: CumulativeSeries,
    pub pie: Vec<PieSlice>,
    pub category_pie: Vec<PieSlice>,
    pub heatmap: Heatmap,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReportStatus {
    Ready,
    NoData { message: String },
    Unavailable { message: String },
}

#[derive(Debug, Serialize, Clone)]
pub struct Report {
    pub grouping: String,
    pub status: ReportStatus,
    pub kpis: Kpis,
    pub formatted_kpis: FormattedKpis,
    pub table: Vec<DetailRow>,
    pub aggregates: Vec<AggregateExportRow>,
    pub charts: Charts,
    pub insights: Insights,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct FormattedKpis {
    pub total_budgeted: String,
    pub total_measured: String,
    pub deviation_abs: String,
    pub deviation_pct: String,
    pub execution_pct: String,
    pub max_deviation_pct: String,
    pub mean_deviation_pct: String,
}
