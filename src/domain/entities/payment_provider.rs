use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Payment gateway a Planning purchase is routed through
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "payment_provider", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentProvider {
    Momo,
    #[serde(rename = "PAYOS")]
    #[sqlx(rename = "payos")]
    #[strum(serialize = "payos")]
    PayOs,
    #[serde(rename = "SEEPAY")]
    #[sqlx(rename = "seepay")]
    #[strum(serialize = "seepay")]
    SeePay,
}

impl PaymentProvider {
    /// Human-readable display name for the provider
    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentProvider::Momo => "MoMo",
            PaymentProvider::PayOs => "PayOS",
            PaymentProvider::SeePay => "SeePay",
        }
    }

    /// Whether the client must submit a form itself instead of following a redirect URL
    pub fn uses_client_form(&self) -> bool {
        matches!(self, PaymentProvider::SeePay)
    }

    /// Whether the provider exposes a refund API
    pub fn supports_refunds(&self) -> bool {
        !matches!(self, PaymentProvider::PayOs)
    }

    pub fn all() -> &'static [PaymentProvider] {
        &[
            PaymentProvider::Momo,
            PaymentProvider::PayOs,
            PaymentProvider::SeePay,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!(
            "momo".parse::<PaymentProvider>().unwrap(),
            PaymentProvider::Momo
        );
        assert_eq!(
            "PAYOS".parse::<PaymentProvider>().unwrap(),
            PaymentProvider::PayOs
        );
        assert_eq!(
            "SeePay".parse::<PaymentProvider>().unwrap(),
            PaymentProvider::SeePay
        );
        assert!("stripe".parse::<PaymentProvider>().is_err());
    }

    #[test]
    fn test_display_matches_as_ref() {
        for variant in PaymentProvider::all() {
            assert_eq!(format!("{}", variant), variant.as_ref());
        }
        assert_eq!(PaymentProvider::PayOs.as_ref(), "payos");
        assert_eq!(PaymentProvider::SeePay.as_ref(), "seepay");
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        assert_eq!(
            serde_json::to_string(&PaymentProvider::Momo).unwrap(),
            "\"MOMO\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentProvider::PayOs).unwrap(),
            "\"PAYOS\""
        );
        assert_eq!(
            serde_json::from_str::<PaymentProvider>("\"SEEPAY\"").unwrap(),
            PaymentProvider::SeePay
        );
    }

    #[test]
    fn test_capabilities() {
        assert!(PaymentProvider::SeePay.uses_client_form());
        assert!(!PaymentProvider::Momo.uses_client_form());
        assert!(PaymentProvider::Momo.supports_refunds());
        assert!(!PaymentProvider::PayOs.supports_refunds());
    }
}
