use std::{collections::HashMap, sync::Arc};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::PaymentGatewayPort,
    domain::entities::payment_provider::PaymentProvider,
};

/// Maps each provider to its configured gateway adapter.
///
/// Providers without credentials are simply never registered, so selecting
/// one yields `ProviderNotConfigured`.
#[derive(Default, Clone)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGatewayPort>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGatewayPort>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn get(&self, provider: PaymentProvider) -> AppResult<Arc<dyn PaymentGatewayPort>> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or(AppError::ProviderNotConfigured)
    }

    pub fn is_configured(&self, provider: PaymentProvider) -> bool {
        self.gateways.contains_key(&provider)
    }

    /// Configured providers in declaration order
    pub fn providers(&self) -> Vec<PaymentProvider> {
        PaymentProvider::all()
            .iter()
            .copied()
            .filter(|p| self.is_configured(*p))
            .collect()
    }
}
