pub mod app;
pub mod callback_verifier;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway_signing;
pub mod http_client;
pub mod momo_adapter;
pub mod payos_adapter;
pub mod reconciliation_worker;
pub mod seepay_adapter;
pub mod setup;
