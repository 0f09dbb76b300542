pub mod backup;
pub mod config;
pub mod error;
pub mod io;
pub mod paths;
pub mod section;
pub mod settings;
pub mod types;

pub use error::{CcfgError, Result};
