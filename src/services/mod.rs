pub mod auth;
pub mod cache;
pub mod clock;
pub mod consent;
pub mod open_finance;
