pub mod clock;
pub mod config;
pub mod driver;
pub mod errors;
pub mod histogram;
pub mod report;
pub mod simulator;
pub mod types;
