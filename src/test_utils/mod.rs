//! Test utilities for unit and HTTP-level testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - An in-memory store implementing every repository trait
//! - A scripted gateway and callback verifier
//! - A builder for `AppState` wired to the above

mod app_state_builder;
mod factories;
mod fake_gateway;
mod payment_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use fake_gateway::*;
pub use payment_mocks::*;
