pub mod client;
pub mod ports;
