pub mod entitlement;
pub mod gateway_registry;
pub mod ledger;
pub mod payment;
pub mod settlement;
pub mod status_poller;
