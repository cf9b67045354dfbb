pub mod host;
pub mod server;

pub use host::*;
pub use server::*;
