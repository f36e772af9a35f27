use crate::domain::entities::payment_provider::PaymentProvider;

/// Authenticates inbound provider callbacks before any field is trusted.
///
/// `signature` is the header-carried credential when the provider sends one
/// (SeePay's `X-Secret-Key`); body-signed providers pass `None`.
pub trait CallbackVerifier: Send + Sync {
    fn verify(&self, provider: PaymentProvider, raw_payload: &str, signature: Option<&str>)
    -> bool;
}
