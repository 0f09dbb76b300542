pub mod backup;
pub mod config;
pub mod section;
pub mod settings;
