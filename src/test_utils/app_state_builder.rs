//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` wires a real `PaymentOrchestrator` to the in-memory
//! store, scripted MoMo and PayOS gateways and a switchable callback
//! verifier. SeePay is left unconfigured.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;

use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        entitlement::EntitlementActivator,
        gateway_registry::GatewayRegistry,
        ledger::TransactionLedger,
        payment::{PaymentOrchestrator, PaymentSettings},
    },
    domain::entities::{payment_provider::PaymentProvider, planning::Planning},
    infra::config::AppConfig,
    test_utils::{FakeGateway, InMemoryPaymentStore, StaticCallbackVerifier},
};

/// Config with no provider credentials and default timings.
pub fn create_test_config() -> AppConfig {
    AppConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_url: "postgres://localhost/planning_payments_test".to_string(),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        public_base_url: "http://localhost:3001".parse().unwrap(),
        default_provider: PaymentProvider::Momo,
        gateway_timeout_secs: 10,
        status_poll_after_secs: 120,
        pending_retention_secs: 86_400,
        checkout_reuse_window_secs: 900,
        reconcile_interval_secs: 60,
        momo: None,
        payos: None,
        seepay: None,
    }
}

pub struct TestAppStateBuilder {
    store: Arc<InMemoryPaymentStore>,
    momo: Arc<FakeGateway>,
    payos: Arc<FakeGateway>,
    verifier: Arc<StaticCallbackVerifier>,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryPaymentStore::new()),
            momo: Arc::new(FakeGateway::new(PaymentProvider::Momo)),
            payos: Arc::new(FakeGateway::new(PaymentProvider::PayOs)),
            verifier: Arc::new(StaticCallbackVerifier::accepting()),
        }
    }

    pub fn with_planning(self, planning: Planning) -> Self {
        self.store.add_planning(planning);
        self
    }

    /// Handle on the backing store for seeding and assertions after `build`.
    pub fn store(&self) -> Arc<InMemoryPaymentStore> {
        self.store.clone()
    }

    pub fn momo(&self) -> Arc<FakeGateway> {
        self.momo.clone()
    }

    pub fn verifier(&self) -> Arc<StaticCallbackVerifier> {
        self.verifier.clone()
    }

    pub fn build(self) -> AppState {
        let registry = GatewayRegistry::new()
            .with_gateway(self.momo)
            .with_gateway(self.payos);

        let orchestrator = PaymentOrchestrator::new(
            Arc::new(TransactionLedger::new(self.store.clone())),
            self.store.clone(),
            Arc::new(registry),
            self.verifier,
            Arc::new(EntitlementActivator::new(
                self.store.clone(),
                self.store.clone(),
            )),
            PaymentSettings::default(),
        );

        AppState {
            config: Arc::new(create_test_config()),
            payments: Arc::new(orchestrator),
        }
    }
}
