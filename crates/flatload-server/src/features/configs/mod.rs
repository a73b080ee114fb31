pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{
    CreateConfigCommand, CreateConfigError, CreateConfigResponse, DeactivateConfigCommand,
    DeactivateConfigError,
};
pub use queries::{ConfigListItem, GetConfigError, GetConfigQuery, ListConfigsError};
pub use routes::configs_routes;
