//! Shared application state.
//!
//! Every component handle is created once at startup and threaded through
//! the handlers; tests build a fresh state per scenario. There are no
//! process-lifetime singletons.

use std::sync::Arc;

use warden_core::{
    BudgetModel, CostLedger, EvidenceLog, MissionCoordinator, Redactor, TransformEngine,
};

use crate::config::GatewayConfig;
use crate::Result;

/// The id of the budget backing `/finops/budget` and default routing.
pub const DEFAULT_BUDGET_ID: &str = "default";

/// Gateway state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub redactor: Arc<Redactor>,
    pub evidence: Arc<EvidenceLog>,
    pub ledger: Arc<CostLedger>,
    pub engine: Arc<TransformEngine>,
    pub coordinator: Arc<MissionCoordinator>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let redactor = Arc::new(Redactor::with_default_policies());
        let evidence = Arc::new(EvidenceLog::with_store(&config.store_path)?);
        let ledger = Arc::new(CostLedger::new(evidence.clone()));
        let engine = Arc::new(TransformEngine::new());
        let coordinator = Arc::new(MissionCoordinator::new(
            redactor.clone(),
            engine.clone(),
            evidence.clone(),
        ));

        ledger.create_budget(
            DEFAULT_BUDGET_ID,
            config.default_budget,
            config.alert_threshold,
            default_budget_models(),
        );

        Ok(Self {
            config,
            redactor,
            evidence,
            ledger,
            engine,
            coordinator,
        })
    }

    /// In-memory state for tests: no evidence store on disk.
    pub fn ephemeral(config: GatewayConfig) -> Self {
        let redactor = Arc::new(Redactor::with_default_policies());
        let evidence = Arc::new(EvidenceLog::new());
        let ledger = Arc::new(CostLedger::new(evidence.clone()));
        let engine = Arc::new(TransformEngine::new());
        let coordinator = Arc::new(MissionCoordinator::new(
            redactor.clone(),
            engine.clone(),
            evidence.clone(),
        ));
        ledger.create_budget(
            DEFAULT_BUDGET_ID,
            config.default_budget,
            config.alert_threshold,
            default_budget_models(),
        );
        Self {
            config,
            redactor,
            evidence,
            ledger,
            engine,
            coordinator,
        }
    }
}

/// Premium first, cheap fallback.
fn default_budget_models() -> Vec<BudgetModel> {
    vec![
        BudgetModel {
            model_id: "o1".to_string(),
            priority: 3,
            max_cost: None,
        },
        BudgetModel {
            model_id: "gpt-4o".to_string(),
            priority: 2,
            max_cost: None,
        },
        BudgetModel {
            model_id: "gpt-4o-mini".to_string(),
            priority: 1,
            max_cost: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_state_has_default_budget() {
        let state = AppState::ephemeral(GatewayConfig::default());
        let budget = state.ledger.get_budget(DEFAULT_BUDGET_ID).unwrap();
        assert_eq!(budget.models.len(), 3);
        assert!(!budget.breached());
    }
}
