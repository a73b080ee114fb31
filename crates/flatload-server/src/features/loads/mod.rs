pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{SubmitLoadCommand, SubmitLoadError, SubmitLoadResponse};
pub use queries::{GetLoadError, GetLoadQuery, ListLoadsError, ListLoadsQuery};
pub use routes::loads_routes;
