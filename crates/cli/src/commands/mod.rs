//! Command implementations.

mod info;
mod run;
mod upload;
mod validate;

pub use info::run_info;
pub use run::run_pipeline;
pub use upload::run_upload;
pub use validate::run_validate;
