use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::{
    application::ports::callback_verifier::CallbackVerifier,
    domain::entities::payment_provider::PaymentProvider,
    infra::{
        config::AppConfig, gateway_signing::constant_time_eq, momo_adapter::momo_ipn_signature,
        payos_adapter::payos_data_signature,
    },
};

struct MomoKeys {
    access_key: SecretString,
    secret_key: SecretString,
}

/// Provider-specific callback authentication with shared secrets.
///
/// A provider without configured secrets rejects every callback.
pub struct HmacCallbackVerifier {
    momo: Option<MomoKeys>,
    payos_checksum_key: Option<SecretString>,
    seepay_ipn_secret: Option<SecretString>,
}

impl HmacCallbackVerifier {
    pub fn new(
        momo: Option<(SecretString, SecretString)>,
        payos_checksum_key: Option<SecretString>,
        seepay_ipn_secret: Option<SecretString>,
    ) -> Self {
        Self {
            momo: momo.map(|(access_key, secret_key)| MomoKeys {
                access_key,
                secret_key,
            }),
            payos_checksum_key,
            seepay_ipn_secret,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let copy = |s: &SecretString| SecretString::new(s.expose_secret().into());
        Self::new(
            config
                .momo
                .as_ref()
                .map(|m| (copy(&m.access_key), copy(&m.secret_key))),
            config.payos.as_ref().map(|p| copy(&p.checksum_key)),
            config.seepay.as_ref().map(|s| copy(&s.ipn_secret)),
        )
    }

    fn verify_momo(&self, raw_payload: &str) -> bool {
        let Some(keys) = &self.momo else {
            return false;
        };
        let Ok(body) = serde_json::from_str::<Map<String, Value>>(raw_payload) else {
            return false;
        };
        let Some(signature) = body.get("signature").and_then(Value::as_str) else {
            return false;
        };
        let Ok(expected) = momo_ipn_signature(
            keys.access_key.expose_secret(),
            keys.secret_key.expose_secret(),
            &body,
        ) else {
            return false;
        };
        constant_time_eq(signature, &expected)
    }

    fn verify_payos(&self, raw_payload: &str) -> bool {
        let Some(checksum_key) = &self.payos_checksum_key else {
            return false;
        };
        let Ok(body) = serde_json::from_str::<Value>(raw_payload) else {
            return false;
        };
        let (Some(data), Some(signature)) = (
            body.get("data").and_then(Value::as_object),
            body.get("signature").and_then(Value::as_str),
        ) else {
            return false;
        };
        let Ok(expected) = payos_data_signature(checksum_key.expose_secret(), data) else {
            return false;
        };
        constant_time_eq(signature, &expected)
    }

    fn verify_seepay(&self, signature: Option<&str>) -> bool {
        match (&self.seepay_ipn_secret, signature) {
            (Some(secret), Some(header)) => constant_time_eq(header.trim(), secret.expose_secret()),
            _ => false,
        }
    }
}

impl CallbackVerifier for HmacCallbackVerifier {
    fn verify(&self, provider: PaymentProvider, raw_payload: &str, signature: Option<&str>) -> bool {
        match provider {
            PaymentProvider::Momo => self.verify_momo(raw_payload),
            PaymentProvider::PayOs => self.verify_payos(raw_payload),
            PaymentProvider::SeePay => self.verify_seepay(signature),
        }
    }
}
