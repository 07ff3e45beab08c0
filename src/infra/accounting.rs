// SPDX-License-Identifier: MIT

//! Accounting collaborator
//!
//! Called once per execution when the aggregate transitions into its final
//! finished state, and only for executions launched on behalf of an app.
//! All accounting is best-effort: failures are logged by the caller and never
//! change execution state.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Commission owed to an app for a finished execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionRequest {
    pub payer_uid: String,
    pub execution_id: String,
    /// Credits consumed by the execution
    pub amount: i64,
    pub app_id: String,
}

/// Usage tally and commission contract
#[async_trait]
pub trait Accounting: Send + Sync {
    /// Total credits consumed by an execution
    async fn tally_credit_usage(&self, uid: &str, execution_id: &str) -> Result<i64>;

    /// Record a commission for the app that published the workflow
    async fn record_commission(&self, request: CommissionRequest) -> Result<()>;
}

/// In-memory accounting used by tests and the bundled binary. Reports a
/// fixed per-execution usage and keeps recorded commissions for inspection.
#[derive(Clone)]
pub struct InMemoryAccounting {
    usage_per_execution: i64,
    commissions: Arc<Mutex<Vec<CommissionRequest>>>,
}

impl InMemoryAccounting {
    pub fn new(usage_per_execution: i64) -> Self {
        Self {
            usage_per_execution,
            commissions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn recorded_commissions(&self) -> Vec<CommissionRequest> {
        self.commissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for InMemoryAccounting {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl Accounting for InMemoryAccounting {
    async fn tally_credit_usage(&self, _uid: &str, _execution_id: &str) -> Result<i64> {
        Ok(self.usage_per_execution)
    }

    async fn record_commission(&self, request: CommissionRequest) -> Result<()> {
        let mut commissions = self.commissions.lock().unwrap_or_else(|e| e.into_inner());
        commissions.push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commission_is_recorded() {
        let accounting = InMemoryAccounting::new(25);

        let usage = accounting.tally_credit_usage("u-1", "we-1").await.unwrap();
        assert_eq!(usage, 25);

        accounting
            .record_commission(CommissionRequest {
                payer_uid: "u-1".to_string(),
                execution_id: "we-1".to_string(),
                amount: usage,
                app_id: "app-1".to_string(),
            })
            .await
            .unwrap();

        let recorded = accounting.recorded_commissions();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].app_id, "app-1");
        assert_eq!(recorded[0].amount, 25);
    }
}
