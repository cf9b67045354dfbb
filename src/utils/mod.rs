pub mod atomic_file;
pub mod logging;
pub mod process_killer;

pub use atomic_file::*;
pub use logging::*;
pub use process_killer::*;
