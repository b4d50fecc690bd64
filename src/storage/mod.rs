pub mod models;
pub mod sqlite_manager;

pub use models::FlowDataRow;
pub use sqlite_manager::SqliteManager;
