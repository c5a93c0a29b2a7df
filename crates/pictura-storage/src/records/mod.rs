pub mod file;
pub mod memory;

use indexmap::IndexMap;
use pictura_core::{GenerationRecord, ProviderUsage, RecordFilter, round_cost};
use uuid::Uuid;

type Records = IndexMap<Uuid, GenerationRecord>;

/// Newest first; records sharing a timestamp come back latest-inserted first
fn latest(records: &Records, limit: usize) -> Vec<GenerationRecord> {
    let mut live: Vec<&GenerationRecord> = records.values().rev().filter(|r| !r.is_deleted()).collect();
    live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    live.into_iter().take(limit).cloned().collect()
}

fn count(records: &Records, filter: &RecordFilter) -> u64 {
    records.values().filter(|r| filter.matches(r)).count() as u64
}

fn sum_cost(records: &Records, filter: &RecordFilter) -> f64 {
    let total = records
        .values()
        .filter(|r| filter.matches(r))
        .filter_map(GenerationRecord::cost)
        .sum();
    round_cost(total)
}

fn breakdown_by_provider(records: &Records, filter: &RecordFilter) -> IndexMap<String, ProviderUsage> {
    let mut breakdown: IndexMap<String, ProviderUsage> = IndexMap::new();

    for record in records.values().filter(|r| filter.matches(r)) {
        let usage = breakdown.entry(record.provider.clone()).or_default();
        usage.count += 1;
        usage.total_cost = round_cost(usage.total_cost + record.cost().unwrap_or(0.0));
    }

    breakdown
}
