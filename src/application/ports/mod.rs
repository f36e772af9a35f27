pub mod callback_verifier;
pub mod payment_gateway;
