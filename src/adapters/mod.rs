pub mod bybit_rest;

pub use bybit_rest::BybitClient;
