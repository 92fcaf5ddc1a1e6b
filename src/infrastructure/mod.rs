pub mod anthropic_client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod kv_store;
pub mod logging;
pub mod summary_client;
pub mod summary_ledger;
pub mod task_repository;
