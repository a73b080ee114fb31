pub mod submit;

pub use submit::{SubmitLoadCommand, SubmitLoadError, SubmitLoadResponse};
