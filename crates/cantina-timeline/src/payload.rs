use cantina_bus::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::Plan;

impl Validate for Plan {
    fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err("a plan must have at least one step".to_string());
        }
        Ok(())
    }
}

/// Body of `/timeline/plan_completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCompleted {
    pub plan_id: Uuid,
}

impl Validate for PlanCompleted {}

/// Body of `/timeline/plan_failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFailed {
    pub plan_id: Uuid,
    pub step: String,
    pub error: String,
}

impl Validate for PlanFailed {}

/// Body of `/timeline/plan_cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCancelled {
    pub plan_id: Uuid,
    pub reason: String,
}

impl Validate for PlanCancelled {}
