pub mod app;
pub mod server;

pub use app::*;
pub use server::*;
