//! Taskflow Core - plan data model, run state, and error handling

pub mod error;
pub mod plan;
pub mod result;
pub mod state;
pub mod types;

pub use error::{Error, Result, StepError, ValidationError};
pub use plan::*;
pub use result::*;
pub use state::*;
pub use types::*;
