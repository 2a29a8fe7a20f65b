pub mod channels;
pub mod checkout;
pub mod redirect;
pub mod transactions;
pub mod webhooks;
