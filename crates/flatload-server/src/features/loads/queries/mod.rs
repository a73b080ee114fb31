pub mod get;
pub mod list;

pub use get::{GetLoadError, GetLoadQuery};
pub use list::{ListLoadsError, ListLoadsQuery};
