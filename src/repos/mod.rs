pub mod account_repo;
pub mod balance_repo;
pub mod consent_repo;
pub mod error;
pub mod memory;
pub mod policy_repo;
pub mod transaction_repo;
