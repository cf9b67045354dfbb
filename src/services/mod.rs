pub mod host_info;
pub mod process_manager;
pub mod process_table;
pub mod reconciler;
pub mod registry_store;
pub mod settings_store;

pub use host_info::*;
pub use process_manager::*;
pub use process_table::*;
pub use registry_store::*;
pub use settings_store::*;
