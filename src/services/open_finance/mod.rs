/*
 * Responsibility
 * - Open Finance の読み取り対象 (policy / account / balance / transaction) と read port の定義
 * - AccessPipeline: proof 検証 → consent 認可 → cache 経由の読み取り
 */
pub mod pipeline;
pub mod resources;

use thiserror::Error;

pub use pipeline::{AccessPipeline, AccessRequest, PipelineSettings, ServeOutcome};
pub use resources::{
    Account, AccountDataReadPort, AccountScoped, Balance, BookingWindow, InsurancePolicy,
    OpenFinanceResource, ResourceReadPort, Scope, Transaction,
};

/// Failure of an external port (consent store, data read port).
#[derive(Debug, Error)]
pub enum PortError {
    #[error("port call timed out")]
    Timeout,
    #[error("port backend error: {0}")]
    Backend(String),
}
