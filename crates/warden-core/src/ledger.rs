//! Cost ledger: per-model pricing, budget tracking, and routing.
//!
//! All budget mutation serializes on one mutex so concurrent usage reports
//! aggregate exactly; alerts fire once per threshold crossing.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, WardenError};
use crate::evidence::{EventKind, EvidenceLog};
use crate::types::Timestamp;

/// Cost per 1,000 tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    pub input_token_cost: f64,
    pub output_token_cost: f64,
}

/// One model entry in a budget, with routing priority and optional sub-cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetModel {
    pub model_id: String,
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
}

/// Per-scope monetary cap with an alert threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    pub max_cost: f64,
    pub current_cost: f64,
    /// Percentage of `max_cost` at which the single alert fires.
    pub alert_threshold: f64,
    pub models: Vec<BudgetModel>,
    #[serde(default)]
    pub alert_fired: bool,
    /// Spend attributed per model, for sub-cap enforcement.
    #[serde(default)]
    pub model_spend: HashMap<String, f64>,
}

impl Budget {
    pub fn breached(&self) -> bool {
        self.current_cost >= self.max_cost
    }

    pub fn remaining(&self) -> f64 {
        (self.max_cost - self.current_cost).max(0.0)
    }

    fn lists_model(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m.model_id == model_id)
    }
}

/// One recorded usage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub timestamp: Timestamp,
}

/// Alert emitted when a budget crosses its threshold.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAlert {
    pub budget_id: String,
    pub threshold_pct: f64,
    pub current_cost: f64,
    pub max_cost: f64,
}

/// Outcome of one `track_usage` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackReport {
    pub cost: f64,
    pub alerts: Vec<BudgetAlert>,
}

/// Pure cost forecast over the pricing table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub estimated_cost: f64,
    pub confidence: f64,
    pub breakdown: Vec<ForecastLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastLine {
    pub model_id: String,
    pub tokens: u64,
    pub cost: f64,
}

/// The ledger: pricing table, budgets, and the usage log.
pub struct CostLedger {
    pricing: RwLock<HashMap<String, ModelPricing>>,
    budgets: Mutex<HashMap<String, Budget>>,
    usage_log: Mutex<Vec<Usage>>,
    evidence: Arc<EvidenceLog>,
}

impl CostLedger {
    pub fn new(evidence: Arc<EvidenceLog>) -> Self {
        let mut pricing = HashMap::new();
        for (model, table) in default_pricing() {
            pricing.insert(model.to_string(), table);
        }
        Self {
            pricing: RwLock::new(pricing),
            budgets: Mutex::new(HashMap::new()),
            usage_log: Mutex::new(Vec::new()),
            evidence,
        }
    }

    pub fn register_model(&self, model_id: impl Into<String>, pricing: ModelPricing) {
        self.pricing.write().insert(model_id.into(), pricing);
    }

    pub fn pricing_for(&self, model_id: &str) -> Result<ModelPricing> {
        self.pricing
            .read()
            .get(model_id)
            .copied()
            .ok_or_else(|| WardenError::ModelNotFound(model_id.to_string()))
    }

    pub fn known_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.pricing.read().keys().cloned().collect();
        models.sort();
        models
    }

    pub fn create_budget(
        &self,
        id: impl Into<String>,
        max_cost: f64,
        alert_threshold: f64,
        models: Vec<BudgetModel>,
    ) -> Budget {
        let budget = Budget {
            id: id.into(),
            max_cost,
            current_cost: 0.0,
            alert_threshold,
            models,
            alert_fired: false,
            model_spend: HashMap::new(),
        };
        self.budgets.lock().insert(budget.id.clone(), budget.clone());
        budget
    }

    pub fn get_budget(&self, id: &str) -> Result<Budget> {
        self.budgets
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| WardenError::BudgetNotFound(id.to_string()))
    }

    pub fn update_budget_models(&self, id: &str, models: Vec<BudgetModel>) -> Result<Budget> {
        let mut budgets = self.budgets.lock();
        let budget = budgets
            .get_mut(id)
            .ok_or_else(|| WardenError::BudgetNotFound(id.to_string()))?;
        budget.models = models;
        Ok(budget.clone())
    }

    pub fn usage_log(&self) -> Vec<Usage> {
        self.usage_log.lock().clone()
    }

    /// Record usage against every budget that lists the model.
    ///
    /// The usage is recorded even when a cap is blown; `BudgetExceeded` is
    /// raised afterwards so callers cannot lose the record.
    pub fn track_usage(
        &self,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<TrackReport> {
        let pricing = self.pricing_for(model_id)?;
        let cost = (input_tokens as f64 / 1000.0) * pricing.input_token_cost
            + (output_tokens as f64 / 1000.0) * pricing.output_token_cost;

        self.usage_log.lock().push(Usage {
            model_id: model_id.to_string(),
            input_tokens,
            output_tokens,
            cost,
            timestamp: crate::types::now(),
        });

        let mut alerts = Vec::new();
        let mut breach: Option<(String, f64, f64)> = None;
        {
            let mut budgets = self.budgets.lock();
            for budget in budgets.values_mut() {
                if !budget.lists_model(model_id) {
                    continue;
                }
                budget.current_cost += cost;
                *budget.model_spend.entry(model_id.to_string()).or_insert(0.0) += cost;

                let alert_at = budget.max_cost * budget.alert_threshold / 100.0;
                if !budget.alert_fired && budget.current_cost >= alert_at {
                    budget.alert_fired = true;
                    alerts.push(BudgetAlert {
                        budget_id: budget.id.clone(),
                        threshold_pct: budget.alert_threshold,
                        current_cost: budget.current_cost,
                        max_cost: budget.max_cost,
                    });
                }
                if budget.breached() && breach.is_none() {
                    breach = Some((budget.id.clone(), budget.current_cost, budget.max_cost));
                }
            }
        }

        for alert in &alerts {
            tracing::warn!(
                budget = %alert.budget_id,
                current = alert.current_cost,
                "budget alert threshold crossed"
            );
        }

        if let Some((budget_id, current_cost, max_cost)) = breach {
            self.evidence.append(
                EventKind::BudgetBreached,
                None,
                json!({
                    "budgetId": budget_id,
                    "modelId": model_id,
                    "currentCost": current_cost,
                    "maxCost": max_cost,
                }),
            );
            return Err(WardenError::BudgetExceeded {
                budget_id,
                current_cost,
                max_cost,
            });
        }

        Ok(TrackReport { cost, alerts })
    }

    /// Record an externally computed cost against one budget, bypassing the
    /// pricing table. Breaches surface in the returned budget, not as an
    /// error, so status endpoints can keep reporting.
    pub fn add_consumption(&self, budget_id: &str, amount: f64) -> Result<Budget> {
        let (snapshot, newly_breached) = {
            let mut budgets = self.budgets.lock();
            let budget = budgets
                .get_mut(budget_id)
                .ok_or_else(|| WardenError::BudgetNotFound(budget_id.to_string()))?;
            let was_breached = budget.breached();
            budget.current_cost += amount;
            let alert_at = budget.max_cost * budget.alert_threshold / 100.0;
            if !budget.alert_fired && budget.current_cost >= alert_at {
                budget.alert_fired = true;
                tracing::warn!(budget = %budget.id, "budget alert threshold crossed");
            }
            let newly_breached = budget.breached() && !was_breached;
            (budget.clone(), newly_breached)
        };
        if newly_breached {
            self.evidence.append(
                EventKind::BudgetBreached,
                None,
                json!({
                    "budgetId": snapshot.id,
                    "currentCost": snapshot.current_cost,
                    "maxCost": snapshot.max_cost,
                }),
            );
        }
        Ok(snapshot)
    }

    /// Pick the highest-priority model whose projected input cost fits the
    /// budget remainder and its own sub-cap.
    pub fn route_request(&self, budget_id: &str, estimated_input_tokens: u64) -> Result<String> {
        let budget = self.get_budget(budget_id)?;
        let pricing = self.pricing.read();

        let mut candidates: Vec<&BudgetModel> = budget.models.iter().collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

        let remaining = budget.remaining();
        for model in candidates {
            let Some(table) = pricing.get(&model.model_id) else {
                tracing::debug!(model = %model.model_id, "skipping unpriced model during routing");
                continue;
            };
            let projected = (estimated_input_tokens as f64 / 1000.0) * table.input_token_cost;
            if projected > remaining {
                continue;
            }
            if let Some(cap) = model.max_cost {
                let spent = budget.model_spend.get(&model.model_id).copied().unwrap_or(0.0);
                if projected > (cap - spent).max(0.0) {
                    continue;
                }
            }
            return Ok(model.model_id.clone());
        }

        Err(WardenError::NoViableModel(budget_id.to_string()))
    }

    /// Pure function over the pricing table.
    pub fn forecast_cost(
        &self,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<Forecast> {
        let pricing = self.pricing_for(model_id)?;
        let input_cost = (input_tokens as f64 / 1000.0) * pricing.input_token_cost;
        let output_cost = (output_tokens as f64 / 1000.0) * pricing.output_token_cost;
        Ok(Forecast {
            estimated_cost: input_cost + output_cost,
            confidence: 0.95,
            breakdown: vec![ForecastLine {
                model_id: model_id.to_string(),
                tokens: input_tokens + output_tokens,
                cost: input_cost + output_cost,
            }],
        })
    }

    /// Aggregated per-model spend, for the FinOps block of audit packs.
    pub fn finops_summary(&self) -> serde_json::Value {
        let usage = self.usage_log.lock();
        let mut per_model: HashMap<String, (u64, f64)> = HashMap::new();
        let mut total = 0.0;
        for entry in usage.iter() {
            let slot = per_model.entry(entry.model_id.clone()).or_insert((0, 0.0));
            slot.0 += entry.input_tokens + entry.output_tokens;
            slot.1 += entry.cost;
            total += entry.cost;
        }
        json!({
            "totalCost": total,
            "perModel": per_model
                .into_iter()
                .map(|(model, (tokens, cost))| json!({
                    "modelId": model,
                    "tokens": tokens,
                    "cost": cost,
                }))
                .collect::<Vec<_>>(),
        })
    }
}

/// Built-in pricing tiers; enough spread to exercise routing.
fn default_pricing() -> Vec<(&'static str, ModelPricing)> {
    vec![
        (
            "gpt-4o-mini",
            ModelPricing {
                input_token_cost: 0.000_15,
                output_token_cost: 0.000_6,
            },
        ),
        (
            "gpt-4o",
            ModelPricing {
                input_token_cost: 0.002_5,
                output_token_cost: 0.01,
            },
        ),
        (
            "o1",
            ModelPricing {
                input_token_cost: 0.015,
                output_token_cost: 0.06,
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> CostLedger {
        CostLedger::new(Arc::new(EvidenceLog::new()))
    }

    fn two_tier_models() -> Vec<BudgetModel> {
        vec![
            BudgetModel {
                model_id: "gpt-4o-mini".to_string(),
                priority: 1,
                max_cost: None,
            },
            BudgetModel {
                model_id: "o1".to_string(),
                priority: 2,
                max_cost: None,
            },
        ]
    }

    #[test]
    fn usage_cost_follows_pricing_table() {
        let ledger = ledger();
        ledger.create_budget("b", 100.0, 80.0, two_tier_models());

        let report = ledger.track_usage("gpt-4o-mini", 1000, 1000).unwrap();
        assert!((report.cost - 0.000_75).abs() < 1e-12);

        let budget = ledger.get_budget("b").unwrap();
        assert!((budget.current_cost - report.cost).abs() < 1e-12);
    }

    #[test]
    fn current_cost_is_sum_of_usages() {
        let ledger = ledger();
        ledger.create_budget("b", 100.0, 80.0, two_tier_models());

        let mut expected = 0.0;
        for _ in 0..5 {
            expected += ledger.track_usage("o1", 2000, 500).unwrap().cost;
        }
        let budget = ledger.get_budget("b").unwrap();
        assert!((budget.current_cost - expected).abs() < 1e-9);
        assert_eq!(ledger.usage_log().len(), 5);
    }

    #[test]
    fn alert_fires_exactly_once() {
        let ledger = ledger();
        // o1 at 1M input tokens costs 15.0; threshold 50% of 40 is 20.
        ledger.create_budget("b", 40.0, 50.0, two_tier_models());

        let first = ledger.track_usage("o1", 1_000_000, 0).unwrap();
        assert!(first.alerts.is_empty());
        let second = ledger.track_usage("o1", 1_000_000, 0).unwrap();
        assert_eq!(second.alerts.len(), 1);
        // Threshold stays crossed, no re-fire.
        let err = ledger.track_usage("o1", 1_000_000, 0);
        match err {
            Ok(report) => assert!(report.alerts.is_empty()),
            Err(WardenError::BudgetExceeded { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn exceeding_budget_errors_but_records_usage() {
        let evidence = Arc::new(EvidenceLog::new());
        let ledger = CostLedger::new(evidence.clone());
        ledger.create_budget("tiny", 0.01, 80.0, two_tier_models());

        let err = ledger.track_usage("o1", 10_000, 0).unwrap_err();
        assert_eq!(err.code(), "BudgetExceeded");
        assert_eq!(ledger.usage_log().len(), 1);

        let budget = ledger.get_budget("tiny").unwrap();
        assert!(budget.breached());
        assert_eq!(evidence.event_count(), 1);
        assert_eq!(evidence.events()[0].kind, EventKind::BudgetBreached);
    }

    #[test]
    fn routing_prefers_priority_within_budget() {
        let ledger = ledger();
        ledger.create_budget("roomy", 10.0, 80.0, two_tier_models());
        assert_eq!(ledger.route_request("roomy", 1000).unwrap(), "o1");

        ledger.create_budget("tight", 0.01, 80.0, two_tier_models());
        assert_eq!(ledger.route_request("tight", 1000).unwrap(), "gpt-4o-mini");
    }

    #[test]
    fn routing_respects_model_sub_cap() {
        let ledger = ledger();
        let models = vec![
            BudgetModel {
                model_id: "gpt-4o-mini".to_string(),
                priority: 1,
                max_cost: None,
            },
            BudgetModel {
                model_id: "o1".to_string(),
                priority: 2,
                // Sub-cap below the projected 0.015 for 1000 tokens.
                max_cost: Some(0.01),
            },
        ];
        ledger.create_budget("capped", 10.0, 80.0, models);
        assert_eq!(ledger.route_request("capped", 1000).unwrap(), "gpt-4o-mini");
    }

    #[test]
    fn routing_fails_when_nothing_fits() {
        let ledger = ledger();
        ledger.create_budget("empty", 0.0, 80.0, two_tier_models());
        // gpt-4o-mini projects above 0 for any tokens, so nothing fits.
        let err = ledger.route_request("empty", 1000).unwrap_err();
        assert_eq!(err.code(), "NoViableModel");
    }

    #[test]
    fn forecast_is_pure_and_confident() {
        let ledger = ledger();
        let forecast = ledger.forecast_cost("gpt-4o", 2000, 1000).unwrap();
        assert!((forecast.estimated_cost - (0.005 + 0.01)).abs() < 1e-12);
        assert!((forecast.confidence - 0.95).abs() < f64::EPSILON);
        assert_eq!(forecast.breakdown.len(), 1);
        assert_eq!(forecast.breakdown[0].tokens, 3000);
        assert_eq!(ledger.get_budget("nope").unwrap_err().code(), "BudgetNotFound");
    }

    #[test]
    fn unknown_model_is_rejected() {
        let ledger = ledger();
        assert_eq!(
            ledger.track_usage("imaginary", 10, 10).unwrap_err().code(),
            "ModelNotFound"
        );
    }
}
