pub mod get;
pub mod list;

pub use get::{GetConfigError, GetConfigQuery};
pub use list::{ConfigListItem, ListConfigsError};
