use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::domain::entities::payment_provider::PaymentProvider;

pub struct MomoConfig {
    /// Base URL, e.g. https://test-payment.momo.vn
    pub endpoint: Url,
    pub partner_code: String,
    pub access_key: SecretString,
    pub secret_key: SecretString,
}

pub struct PayOsConfig {
    /// Base URL, e.g. https://api-merchant.payos.vn
    pub endpoint: Url,
    pub client_id: String,
    pub api_key: SecretString,
    pub checksum_key: SecretString,
}

pub struct SeePayConfig {
    /// Hosted checkout page the client form posts to
    pub checkout_url: Url,
    /// REST API base for order lookups and refunds
    pub api_url: Url,
    pub merchant_id: String,
    pub secret_key: SecretString,
    /// Shared secret SeePay sends back in `X-Secret-Key` on IPN calls
    pub ipn_secret: SecretString,
}

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub cors_origin: HeaderValue,
    /// Public origin of this service, used for return and IPN URLs
    pub public_base_url: Url,
    pub default_provider: PaymentProvider,
    pub gateway_timeout_secs: u64,
    pub status_poll_after_secs: i64,
    pub pending_retention_secs: i64,
    pub checkout_reuse_window_secs: i64,
    pub reconcile_interval_secs: u64,
    pub momo: Option<MomoConfig>,
    pub payos: Option<PayOsConfig>,
    pub seepay: Option<SeePayConfig>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:3001".parse().unwrap());
        let database_url: String = get_env("DATABASE_URL");
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");
        let public_base_url: Url = get_env("PUBLIC_BASE_URL");
        let default_provider: PaymentProvider =
            get_env_default("DEFAULT_PAYMENT_PROVIDER", PaymentProvider::Momo);

        let gateway_timeout_secs: u64 = get_env_default("GATEWAY_TIMEOUT_SECS", 10);
        let status_poll_after_secs: i64 = get_env_default("STATUS_POLL_AFTER_SECS", 120);
        let pending_retention_secs: i64 = get_env_default("PENDING_RETENTION_SECS", 86_400);
        let checkout_reuse_window_secs: i64 = get_env_default("CHECKOUT_REUSE_WINDOW_SECS", 900);
        let reconcile_interval_secs: u64 = get_env_default("RECONCILE_INTERVAL_SECS", 60);

        // A provider is only registered when all of its credentials are present.
        let momo = match (
            optional_env("MOMO_PARTNER_CODE"),
            optional_env("MOMO_ACCESS_KEY"),
            optional_env("MOMO_SECRET_KEY"),
        ) {
            (Some(partner_code), Some(access_key), Some(secret_key)) => Some(MomoConfig {
                endpoint: get_env_default(
                    "MOMO_ENDPOINT",
                    "https://test-payment.momo.vn".parse().unwrap(),
                ),
                partner_code,
                access_key: SecretString::new(access_key.into()),
                secret_key: SecretString::new(secret_key.into()),
            }),
            _ => None,
        };

        let payos = match (
            optional_env("PAYOS_CLIENT_ID"),
            optional_env("PAYOS_API_KEY"),
            optional_env("PAYOS_CHECKSUM_KEY"),
        ) {
            (Some(client_id), Some(api_key), Some(checksum_key)) => Some(PayOsConfig {
                endpoint: get_env_default(
                    "PAYOS_ENDPOINT",
                    "https://api-merchant.payos.vn".parse().unwrap(),
                ),
                client_id,
                api_key: SecretString::new(api_key.into()),
                checksum_key: SecretString::new(checksum_key.into()),
            }),
            _ => None,
        };

        let seepay = match (
            optional_env("SEEPAY_MERCHANT_ID"),
            optional_env("SEEPAY_SECRET_KEY"),
            optional_env("SEEPAY_IPN_SECRET"),
        ) {
            (Some(merchant_id), Some(secret_key), Some(ipn_secret)) => Some(SeePayConfig {
                checkout_url: get_env_default(
                    "SEEPAY_CHECKOUT_URL",
                    "https://pay-sandbox.sepay.vn/v1/checkout/init".parse().unwrap(),
                ),
                api_url: get_env_default(
                    "SEEPAY_API_URL",
                    "https://pgapi-sandbox.sepay.vn".parse().unwrap(),
                ),
                merchant_id,
                secret_key: SecretString::new(secret_key.into()),
                ipn_secret: SecretString::new(ipn_secret.into()),
            }),
            _ => None,
        };

        Self {
            bind_addr,
            database_url,
            cors_origin,
            public_base_url,
            default_provider,
            gateway_timeout_secs,
            status_poll_after_secs,
            pending_retention_secs,
            checkout_reuse_window_secs,
            reconcile_interval_secs,
            momo,
            payos,
            seepay,
        }
    }

    /// Return URL the gateway sends the user back to after checkout
    pub fn return_url(&self) -> String {
        self.public_url("payments/return")
    }

    /// Server-to-server notification URL for a provider
    pub fn ipn_url(&self, provider: PaymentProvider) -> String {
        self.public_url(&format!("webhooks/{}", provider.as_ref()))
    }

    fn public_url(&self, path: &str) -> String {
        let base = self.public_base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
