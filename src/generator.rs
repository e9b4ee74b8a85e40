// Synthetic fact generation.
//
// One record per (year, month, project, supplier). Category, budget and
// the measured multiplier are drawn from a `StdRng` seeded from the
// configuration, so the same config always yields the same records.
use crate::config::GeneratorConfig;
use crate::types::MeasurementRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const MONTHS: std::ops::RangeInclusive<u32> = 1..=12;

pub fn generate(config: &GeneratorConfig) -> Vec<MeasurementRecord> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let budget = ordered(config.budget_min, config.budget_max);
    let multiplier = ordered(config.multiplier_min, config.multiplier_max);

    let capacity = config.years.len() * 12 * config.projects.len() * config.suppliers.len();
    let mut records = Vec::with_capacity(capacity);

    for &year in &config.years {
        for month in MONTHS {
            for project in &config.projects {
                for (idx, supplier) in config.suppliers.iter().enumerate() {
                    let category = config.categories.choose(&mut rng).copied();
                    let budgeted_amount = round_cents(sample(&mut rng, budget));
                    let measured_amount =
                        round_cents(budgeted_amount * sample(&mut rng, multiplier));
                    let contract = config.contracts.then(|| contract_id(idx));
                    records.push(MeasurementRecord {
                        year,
                        month,
                        project: project.clone(),
                        supplier: supplier.clone(),
                        category,
                        contract,
                        budgeted_amount,
                        measured_amount,
                    });
                }
            }
        }
    }

    log::debug!(
        "Generated {} record(s) with seed {}",
        records.len(),
        config.seed
    );
    records
}

/// `CT-001` for the first supplier, `CT-002` for the second, ...
pub fn contract_id(supplier_index: usize) -> String {
    format!("CT-{:03}", supplier_index + 1)
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    let a = if a.is_finite() { a } else { 0.0 };
    let b = if b.is_finite() { b } else { 0.0 };
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn sample(rng: &mut StdRng, (lo, hi): (f64, f64)) -> f64 {
    if lo == hi {
        return lo;
    }
    rng.gen_range(lo..=hi)
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn single(seed: u64) -> GeneratorConfig {
        GeneratorConfig {
            seed,
            years: vec![2023],
            projects: vec!["P".to_string()],
            suppliers: vec!["S".to_string()],
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn one_record_per_combination() {
        let records = generate(&GeneratorConfig::default());
        assert_eq!(records.len(), 3 * 12 * 5 * 10);

        let records = generate(&single(1));
        assert_eq!(records.len(), 12);
        let months: Vec<u32> = records.iter().map(|r| r.month).collect();
        assert_eq!(months, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_records() {
        let a = generate(&GeneratorConfig::default());
        let b = generate(&GeneratorConfig::default());
        assert_eq!(a, b);

        let c = generate(&GeneratorConfig {
            seed: 43,
            ..GeneratorConfig::default()
        });
        assert_ne!(a, c);
    }

    #[test]
    fn amounts_stay_within_configured_bands() {
        let config = GeneratorConfig::default();
        for r in generate(&config) {
            assert!(r.budgeted_amount >= config.budget_min && r.budgeted_amount <= config.budget_max);
            // One cent of slack for rounding of the measured value.
            assert!(r.measured_amount >= r.budgeted_amount * config.multiplier_min - 0.01);
            assert!(r.measured_amount <= r.budgeted_amount * config.multiplier_max + 0.01);
            assert_eq!(r.budgeted_amount, round_cents(r.budgeted_amount));
            assert!(r.category.is_some());
            assert!(r.contract.is_none());
        }
    }

    #[test]
    fn inverted_ranges_are_swapped() {
        let config = GeneratorConfig {
            budget_min: 100.0,
            budget_max: 10.0,
            multiplier_min: 1.0,
            multiplier_max: 1.0,
            ..single(5)
        };
        for r in generate(&config) {
            assert!((10.0..=100.0).contains(&r.budgeted_amount));
            assert_eq!(r.measured_amount, r.budgeted_amount);
        }
    }

    #[test]
    fn contracts_and_categories_follow_config() {
        let config = GeneratorConfig {
            contracts: true,
            suppliers: vec!["S1".to_string(), "S2".to_string()],
            categories: vec![Category::Services],
            ..single(9)
        };
        let records = generate(&config);
        assert_eq!(records[0].contract.as_deref(), Some("CT-001"));
        assert_eq!(records[1].contract.as_deref(), Some("CT-002"));
        assert!(records.iter().all(|r| r.category == Some(Category::Services)));

        let empty = generate(&GeneratorConfig {
            projects: vec![],
            ..single(9)
        });
        assert!(empty.is_empty());
    }
}
