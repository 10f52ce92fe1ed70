pub mod config;
pub mod fields;
pub mod observability;
pub mod smartico;
pub mod types;
