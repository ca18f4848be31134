/*
 * Responsibility
 * - Open Finance resource server (DPoP + consent-scoped cached reads)
 * - main.rs と tests/ の両方から使う module tree
 */
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod repos;
pub mod services;
pub mod state;
