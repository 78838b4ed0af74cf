pub mod gateway_client;
pub mod receipt;
pub mod signature;
