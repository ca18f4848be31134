/**
 * Responsibility
 * - repo が上位に伝える意味の定義
 * - port 境界 (PortError) への変換
 */
use thiserror::Error;

use crate::services::open_finance::PortError;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("db error")]
    Db(#[from] sqlx::Error),
}

impl From<RepoError> for PortError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Db(sqlx::Error::PoolTimedOut) => PortError::Timeout,
            RepoError::Db(e) => PortError::Backend(e.to_string()),
        }
    }
}
