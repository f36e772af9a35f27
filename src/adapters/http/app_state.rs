use std::sync::Arc;

use axum::extract::FromRef;

use crate::{infra::config::AppConfig, use_cases::payment::PaymentOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub payments: Arc<PaymentOrchestrator>,
}

impl FromRef<AppState> for Arc<PaymentOrchestrator> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.payments.clone()
    }
}
