/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - pipeline (token / DPoP / consent / cache), read ports, clock
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::services::clock::Clock;
use crate::services::open_finance::{
    AccessPipeline, Account, AccountDataReadPort, Balance, InsurancePolicy, ResourceReadPort,
    Transaction,
};

/// Backing stores for every Open Finance resource the API serves.
#[derive(Clone)]
pub struct ReadPorts {
    pub policies: Arc<dyn ResourceReadPort<InsurancePolicy>>,
    pub accounts: Arc<dyn ResourceReadPort<Account>>,
    pub balances: Arc<dyn AccountDataReadPort<Balance>>,
    pub transactions: Arc<dyn AccountDataReadPort<Transaction>>,
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AccessPipeline>,
    pub ports: ReadPorts,
    pub clock: Arc<dyn Clock>,
    // Absolute base used to rebuild the proof's expected `htu`.
    pub public_base_url: Option<String>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pipeline", &self.pipeline)
            .field("clock", &self.clock)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        pipeline: AccessPipeline,
        ports: ReadPorts,
        clock: Arc<dyn Clock>,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            ports,
            clock,
            public_base_url,
        }
    }
}
