pub mod config;
pub mod error;
pub mod live_params;
pub mod paths;

pub use config::*;
pub use error::*;
pub use live_params::*;
pub use paths::*;
