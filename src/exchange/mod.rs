pub mod traits;
pub mod types;

#[cfg(test)]
pub use traits::MockExchangeClient;
pub use traits::ExchangeClient;
pub use types::*;
