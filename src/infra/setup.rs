use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{http::app_state::AppState, persistence::PostgresPersistence},
    application::use_cases::{
        entitlement::EntitlementActivator,
        gateway_registry::GatewayRegistry,
        ledger::TransactionLedger,
        payment::{PaymentOrchestrator, PaymentSettings},
    },
    domain::entities::payment_provider::PaymentProvider,
    infra::{
        callback_verifier::HmacCallbackVerifier, config::AppConfig, db::init_db,
        error::InfraError, http_client::build_client, momo_adapter::MomoAdapter,
        payos_adapter::PayOsAdapter, seepay_adapter::SeePayAdapter,
    },
};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let pool = init_db(&config.database_url).await?;
    let postgres_arc = Arc::new(PostgresPersistence::new(pool));

    let registry = build_gateway_registry(&config)?;
    let providers = registry.providers();
    if providers.is_empty() {
        tracing::warn!("No payment provider credentials configured");
    } else {
        tracing::info!(providers = ?providers, "Payment providers registered");
    }

    let ledger = Arc::new(TransactionLedger::new(postgres_arc.clone()));
    let activator = Arc::new(EntitlementActivator::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
    ));
    let verifier = Arc::new(HmacCallbackVerifier::from_config(&config));

    let orchestrator = PaymentOrchestrator::new(
        ledger,
        postgres_arc,
        Arc::new(registry),
        verifier,
        activator,
        payment_settings(&config),
    );

    Ok(AppState {
        config: Arc::new(config),
        payments: Arc::new(orchestrator),
    })
}

pub fn payment_settings(config: &AppConfig) -> PaymentSettings {
    PaymentSettings {
        default_provider: config.default_provider,
        status_poll_after: ChronoDuration::seconds(config.status_poll_after_secs),
        pending_retention: ChronoDuration::seconds(config.pending_retention_secs),
        checkout_reuse_window: ChronoDuration::seconds(config.checkout_reuse_window_secs),
    }
}

/// Register an adapter for every provider whose credentials are present.
pub fn build_gateway_registry(config: &AppConfig) -> Result<GatewayRegistry, InfraError> {
    let client = build_client(Duration::from_secs(config.gateway_timeout_secs))
        .map_err(InfraError::HttpClient)?;
    let return_url = config.return_url();
    let mut registry = GatewayRegistry::new();

    if let Some(momo) = &config.momo {
        registry = registry.with_gateway(Arc::new(MomoAdapter::new(
            client.clone(),
            momo,
            return_url.clone(),
            config.ipn_url(PaymentProvider::Momo),
        )));
    }
    if let Some(payos) = &config.payos {
        registry = registry.with_gateway(Arc::new(PayOsAdapter::new(
            client.clone(),
            payos,
            format!("{return_url}?result=success"),
            format!("{return_url}?result=cancel"),
        )));
    }
    if let Some(seepay) = &config.seepay {
        registry = registry.with_gateway(Arc::new(SeePayAdapter::new(
            client.clone(),
            seepay,
            &return_url,
        )));
    }

    Ok(registry)
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "planning_payments=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs)
    let file = File::create("app.log").expect("cannot create log file");
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
