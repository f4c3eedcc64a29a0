pub mod order;
pub mod settings;
pub mod state;

pub use order::*;
pub use settings::*;
pub use state::*;
