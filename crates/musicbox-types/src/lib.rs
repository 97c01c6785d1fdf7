mod connection;
mod params;
mod tool;

pub use connection::*;
pub use params::*;
pub use tool::*;
