// Filtering and grouped totals over a read-only record set.
//
// Every filter change re-runs `apply_filter` + `group_records` from
// scratch; nothing here is cached or persisted.
use crate::types::{
    AggregateRow, Category, Dataset, Dimension, Dimensions, GroupKey, GroupingMode,
    MeasurementRecord,
};
use crate::util::safe_pct;
use std::collections::{BTreeMap, BTreeSet};

/// Set-membership predicate per dimension. An empty set means "no
/// restriction" on that dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub years: BTreeSet<i32>,
    pub months: BTreeSet<u32>,
    pub projects: BTreeSet<String>,
    pub suppliers: BTreeSet<String>,
    pub categories: BTreeSet<Category>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_years<I: IntoIterator<Item = i32>>(mut self, years: I) -> Self {
        self.years.extend(years);
        self
    }

    pub fn with_months<I: IntoIterator<Item = u32>>(mut self, months: I) -> Self {
        self.months.extend(months);
        self
    }

    pub fn with_projects<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projects.extend(projects.into_iter().map(Into::into));
        self
    }

    pub fn with_suppliers<I, S>(mut self, suppliers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suppliers.extend(suppliers.into_iter().map(Into::into));
        self
    }

    pub fn with_categories<I: IntoIterator<Item = Category>>(mut self, categories: I) -> Self {
        self.categories.extend(categories);
        self
    }

    /// Drop every restriction.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_unrestricted(&self) -> bool {
        self.restricted_dimensions().is_empty()
    }

    pub fn restricted_dimensions(&self) -> Vec<Dimension> {
        let mut dims = Vec::new();
        if !self.years.is_empty() {
            dims.push(Dimension::Year);
        }
        if !self.months.is_empty() {
            dims.push(Dimension::Month);
        }
        if !self.projects.is_empty() {
            dims.push(Dimension::Project);
        }
        if !self.suppliers.is_empty() {
            dims.push(Dimension::Supplier);
        }
        if !self.categories.is_empty() {
            dims.push(Dimension::Category);
        }
        dims
    }

    /// Restrictions on dimensions the source does not carry are ignored.
    pub fn matches(&self, r: &MeasurementRecord, dims: &Dimensions) -> bool {
        let year_ok = !dims.year || self.years.is_empty() || self.years.contains(&r.year);
        let month_ok = !dims.month || self.months.is_empty() || self.months.contains(&r.month);
        let project_ok =
            !dims.project || self.projects.is_empty() || self.projects.contains(&r.project);
        let supplier_ok =
            !dims.supplier || self.suppliers.is_empty() || self.suppliers.contains(&r.supplier);
        let category_ok = !dims.category
            || self.categories.is_empty()
            || r.category.is_some_and(|c| self.categories.contains(&c));
        year_ok && month_ok && project_ok && supplier_ok && category_ok
    }
}

pub fn apply_filter<'a>(dataset: &'a Dataset, filter: &Filter) -> Vec<&'a MeasurementRecord> {
    for dim in filter.restricted_dimensions() {
        if !dataset.dimensions.has(dim) {
            log::warn!("Ignoring filter on '{dim}': column not available");
        }
    }
    dataset
        .records
        .iter()
        .filter(|r| filter.matches(r, &dataset.dimensions))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// Chronological for months, ascending name otherwise.
    #[default]
    Natural,
    /// Largest `total_budgeted` first, truncated to `n` rows. Month
    /// grouping always stays chronological.
    TopBudgeted(usize),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupOptions {
    pub order: RowOrder,
    /// Month grouping only: cumulative sums restart at each new year.
    pub reset_cumulative_yearly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Grouping {
    Rows(Vec<AggregateRow>),
    Unavailable {
        mode: GroupingMode,
        missing: Vec<Dimension>,
    },
}

impl Grouping {
    pub fn rows(&self) -> &[AggregateRow] {
        match self {
            Grouping::Rows(rows) => rows,
            Grouping::Unavailable { .. } => &[],
        }
    }
}

/// Raw sums for one group before derived metrics are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotals {
    pub key: GroupKey,
    pub record_count: usize,
    pub total_budgeted: f64,
    pub total_measured: f64,
}

pub fn group_key(r: &MeasurementRecord, mode: GroupingMode) -> GroupKey {
    match mode {
        GroupingMode::Month => GroupKey::Month {
            year: r.year,
            month: r.month,
        },
        GroupingMode::Project => GroupKey::Project(r.project.clone()),
        GroupingMode::Supplier => GroupKey::Supplier(r.supplier.clone()),
    }
}

pub fn group_records(
    records: &[&MeasurementRecord],
    mode: GroupingMode,
    dims: &Dimensions,
    options: &GroupOptions,
) -> Grouping {
    let missing: Vec<Dimension> = mode
        .required()
        .iter()
        .copied()
        .filter(|d| !dims.has(*d))
        .collect();
    if !missing.is_empty() {
        return Grouping::Unavailable { mode, missing };
    }

    let mut map: BTreeMap<GroupKey, (usize, f64, f64)> = BTreeMap::new();
    for r in records {
        let e = map.entry(group_key(r, mode)).or_insert((0, 0.0, 0.0));
        e.0 += 1;
        e.1 += r.budgeted_amount;
        e.2 += r.measured_amount;
    }
    let totals = map
        .into_iter()
        .map(|(key, (record_count, total_budgeted, total_measured))| GroupTotals {
            key,
            record_count,
            total_budgeted,
            total_measured,
        })
        .collect();

    let rows = build_rows(totals, options.reset_cumulative_yearly);
    Grouping::Rows(order_rows(rows, mode, options.order))
}

/// Attach deviation, execution and cumulative figures. Cumulative sums run
/// in natural key order regardless of the order `totals` arrives in.
pub fn build_rows(mut totals: Vec<GroupTotals>, reset_yearly: bool) -> Vec<AggregateRow> {
    totals.sort_by(|a, b| a.key.cmp(&b.key));

    let mut cum_budgeted = 0.0;
    let mut cum_measured = 0.0;
    let mut current_year: Option<i32> = None;
    let mut rows = Vec::with_capacity(totals.len());

    for t in totals {
        if reset_yearly {
            if let GroupKey::Month { year, .. } = &t.key {
                if current_year != Some(*year) {
                    cum_budgeted = 0.0;
                    cum_measured = 0.0;
                    current_year = Some(*year);
                }
            }
        }
        cum_budgeted += t.total_budgeted;
        cum_measured += t.total_measured;
        let deviation_abs = t.total_measured - t.total_budgeted;
        rows.push(AggregateRow {
            key: t.key,
            record_count: t.record_count,
            total_budgeted: t.total_budgeted,
            total_measured: t.total_measured,
            deviation_abs,
            deviation_pct: safe_pct(deviation_abs, t.total_budgeted),
            execution_pct: safe_pct(t.total_measured, t.total_budgeted),
            cumulative_budgeted: cum_budgeted,
            cumulative_measured: cum_measured,
        });
    }
    rows
}

/// Presentation order for already-built rows. Cumulative figures keep the
/// values they got in natural order.
pub fn order_rows(
    mut rows: Vec<AggregateRow>,
    mode: GroupingMode,
    order: RowOrder,
) -> Vec<AggregateRow> {
    match (mode, order) {
        (GroupingMode::Month, _) | (_, RowOrder::Natural) => rows,
        (_, RowOrder::TopBudgeted(n)) => {
            // Stable sort keeps ascending-name order among equal totals.
            rows.sort_by(|a, b| b.total_budgeted.total_cmp(&a.total_budgeted));
            rows.truncate(n);
            rows
        }
    }
}

/// (budgeted, measured) sums over a record subset.
pub fn totals(records: &[&MeasurementRecord]) -> (f64, f64) {
    records.iter().fold((0.0, 0.0), |(b, m), r| {
        (b + r.budgeted_amount, m + r.measured_amount)
    })
}

/// Budgeted/measured totals per category, in category order. Records
/// without a category are left out.
pub fn category_totals(records: &[&MeasurementRecord]) -> Vec<(Category, f64, f64)> {
    let mut map: BTreeMap<Category, (f64, f64)> = BTreeMap::new();
    for r in records {
        if let Some(c) = r.category {
            let e = map.entry(c).or_insert((0.0, 0.0));
            e.0 += r.budgeted_amount;
            e.1 += r.measured_amount;
        }
    }
    map.into_iter().map(|(c, (b, m))| (c, b, m)).collect()
}
