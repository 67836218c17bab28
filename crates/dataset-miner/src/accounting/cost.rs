//! Token usage accounting and cost estimation

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{ModelPrice, PricingConfig};
use crate::error::{Error, Result};
use crate::types::{OperationKind, UsageRecord};

/// Built-in USD prices per thousand tokens
const BUILTIN_PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o-mini", ModelPrice::new(0.000_15, 0.000_6)),
    ("llama-3.1-8b-instant", ModelPrice::new(0.000_05, 0.000_08)),
    ("llama-3.3-70b-versatile", ModelPrice::new(0.000_59, 0.000_79)),
    ("mixtral-8x7b-32768", ModelPrice::new(0.000_24, 0.000_24)),
    ("gemma2-9b-it", ModelPrice::new(0.000_2, 0.000_2)),
];

/// Price lookup keyed by model name
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: BTreeMap<String, ModelPrice>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PriceTable {
    /// The shipped price entries
    pub fn builtin() -> Self {
        Self {
            prices: BUILTIN_PRICES
                .iter()
                .map(|(model, price)| (model.to_string(), *price))
                .collect(),
        }
    }

    /// Built-in entries extended or overridden by configuration
    pub fn with_overrides(models: &BTreeMap<String, ModelPrice>) -> Self {
        let mut table = Self::builtin();
        for (model, price) in models {
            table.prices.insert(model.clone(), *price);
        }
        table
    }

    pub fn insert(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.prices.insert(model.into(), price);
    }

    /// Find a price; `name:tag` falls back to `name`
    pub fn lookup(&self, model: &str) -> Result<ModelPrice> {
        if let Some(price) = self.prices.get(model) {
            return Ok(*price);
        }
        model
            .split_once(':')
            .and_then(|(base, _)| self.prices.get(base))
            .copied()
            .ok_or_else(|| Error::PricingNotFound(model.to_string()))
    }
}

/// Totals for one operation kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationCost {
    pub calls: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub cost: f64,
}

/// Aggregated usage for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostSummary {
    pub total_input_tokens: usize,
    pub total_output_tokens: usize,
    pub total_cost: f64,
    pub by_operation: BTreeMap<OperationKind, OperationCost>,
    /// Grand total divided by the number of pairs written
    pub average_cost_per_pair: f64,
    /// Models that had no price entry and were counted at zero cost
    pub unpriced_models: Vec<String>,
}

impl CostSummary {
    pub fn total_tokens(&self) -> usize {
        self.total_input_tokens + self.total_output_tokens
    }

    pub fn operation(&self, kind: OperationKind) -> OperationCost {
        self.by_operation.get(&kind).cloned().unwrap_or_default()
    }
}

/// Running record of every model call
#[derive(Debug)]
pub struct CostTracker {
    table: PriceTable,
    /// Price everything as this model instead of the one used
    price_as: Option<String>,
    records: Vec<UsageRecord>,
    warned: BTreeSet<String>,
}

impl CostTracker {
    pub fn new(table: PriceTable, price_as: Option<String>) -> Self {
        Self {
            table,
            price_as,
            records: Vec::new(),
            warned: BTreeSet::new(),
        }
    }

    pub fn from_config(config: &PricingConfig) -> Self {
        Self::new(
            PriceTable::with_overrides(&config.models),
            config.price_as.clone(),
        )
    }

    /// Append a usage record, warning once for each model without a price
    pub fn record(&mut self, usage: UsageRecord) {
        let priced_model = self.priced_model(&usage).to_string();
        if let Err(e) = self.table.lookup(&priced_model) {
            if self.warned.insert(priced_model) {
                tracing::warn!("{}; its calls are counted at zero cost", e);
            }
        }
        self.records.push(usage);
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    /// Cost of one call, or `None` when its model has no price
    pub fn cost_of(&self, usage: &UsageRecord) -> Option<f64> {
        let price = self.table.lookup(self.priced_model(usage)).ok()?;
        Some(
            usage.input_tokens as f64 / 1000.0 * price.input_per_1k
                + usage.output_tokens as f64 / 1000.0 * price.output_per_1k,
        )
    }

    /// Recompute the summary from all records
    pub fn summary(&self, pair_count: usize) -> CostSummary {
        let mut summary = CostSummary::default();
        let mut unpriced = BTreeSet::new();

        for usage in &self.records {
            let cost = match self.cost_of(usage) {
                Some(cost) => cost,
                None => {
                    unpriced.insert(self.priced_model(usage).to_string());
                    0.0
                }
            };

            summary.total_input_tokens += usage.input_tokens;
            summary.total_output_tokens += usage.output_tokens;
            summary.total_cost += cost;

            let entry = summary.by_operation.entry(usage.operation).or_default();
            entry.calls += 1;
            entry.input_tokens += usage.input_tokens;
            entry.output_tokens += usage.output_tokens;
            entry.cost += cost;
        }

        if pair_count > 0 {
            summary.average_cost_per_pair = summary.total_cost / pair_count as f64;
        }
        summary.unpriced_models = unpriced.into_iter().collect();
        summary
    }

    fn priced_model<'a>(&'a self, usage: &'a UsageRecord) -> &'a str {
        self.price_as.as_deref().unwrap_or(&usage.model)
    }
}
