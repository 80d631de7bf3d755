pub mod context;
pub mod error;
pub mod run;

pub use context::AppContext;
pub use error::{FreshetError, Result, SinkFailure};
pub use run::{execute, run_config, RunOptions, RunReport};
