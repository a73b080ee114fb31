pub mod create;
pub mod deactivate;

pub use create::{CreateConfigCommand, CreateConfigError, CreateConfigResponse};
pub use deactivate::{DeactivateConfigCommand, DeactivateConfigError};
