//! Provider result code -> canonical status mapping.
//!
//! Every table is closed: a code that is not listed fails closed to
//! `Failed` with `unmapped_code = true`, so an unrecognised code can never
//! be read as a successful (or still-open) payment.

use super::{payment_provider::PaymentProvider, transaction_status::TransactionStatus};

/// Known MoMo `resultCode`s that mean the payment did not go through.
const MOMO_FAILURE_CODES: &[i64] = &[
    10, 11, 12, 13, 20, 21, 22, 40, 41, 42, 43, 45, 47, 98, 99, 1003, 1004, 1005, 1007, 1017,
    1026, 1080, 1081, 1088, 2019, 4001, 4002, 4100,
];

/// Canonical status plus the audit flag for codes missing from the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedStatus {
    pub status: TransactionStatus,
    pub unmapped_code: bool,
}

impl MappedStatus {
    fn known(status: TransactionStatus) -> Self {
        Self {
            status,
            unmapped_code: false,
        }
    }

    fn unmapped() -> Self {
        Self {
            status: TransactionStatus::Failed,
            unmapped_code: true,
        }
    }
}

pub struct ResultCodeMapper;

impl ResultCodeMapper {
    pub fn map(provider: PaymentProvider, raw_code: &str) -> MappedStatus {
        match provider {
            PaymentProvider::Momo => Self::map_momo(raw_code),
            PaymentProvider::PayOs => Self::map_payos(raw_code),
            PaymentProvider::SeePay => Self::map_seepay(raw_code),
        }
    }

    /// MoMo reports a numeric `resultCode`
    fn map_momo(raw_code: &str) -> MappedStatus {
        let Ok(code) = raw_code.trim().parse::<i64>() else {
            return MappedStatus::unmapped();
        };

        match code {
            0 => MappedStatus::known(TransactionStatus::Success),
            // Initiated, waiting for the user to confirm in the app
            1000 => MappedStatus::known(TransactionStatus::Pending),
            7000 | 7002 | 9000 => MappedStatus::known(TransactionStatus::Processing),
            1001 | 1002 | 1006 => MappedStatus::known(TransactionStatus::Cancelled),
            c if MOMO_FAILURE_CODES.contains(&c) => MappedStatus::known(TransactionStatus::Failed),
            _ => MappedStatus::unmapped(),
        }
    }

    /// PayOS reports a string `status`
    fn map_payos(raw_code: &str) -> MappedStatus {
        match raw_code.trim().to_ascii_uppercase().as_str() {
            "PENDING" => MappedStatus::known(TransactionStatus::Pending),
            "PROCESSING" => MappedStatus::known(TransactionStatus::Processing),
            "PAID" => MappedStatus::known(TransactionStatus::Success),
            "CANCELLED" => MappedStatus::known(TransactionStatus::Cancelled),
            "EXPIRED" | "FAILED" => MappedStatus::known(TransactionStatus::Failed),
            _ => MappedStatus::unmapped(),
        }
    }

    /// SeePay reports a string `order_status`
    fn map_seepay(raw_code: &str) -> MappedStatus {
        match raw_code.trim().to_ascii_uppercase().as_str() {
            "CAPTURED" => MappedStatus::known(TransactionStatus::Success),
            "PENDING" => MappedStatus::known(TransactionStatus::Pending),
            "PROCESSING" => MappedStatus::known(TransactionStatus::Processing),
            "CANCELLED" => MappedStatus::known(TransactionStatus::Cancelled),
            "FAILED" | "EXPIRED" => MappedStatus::known(TransactionStatus::Failed),
            "REFUNDED" => MappedStatus::known(TransactionStatus::Refunded),
            _ => MappedStatus::unmapped(),
        }
    }
}
