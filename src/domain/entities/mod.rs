pub mod payment_provider;
pub mod planning;
pub mod result_code;
pub mod transaction;
pub mod transaction_status;
pub mod user_planning;
