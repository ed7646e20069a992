pub mod client;
pub mod transport;
pub mod types;
