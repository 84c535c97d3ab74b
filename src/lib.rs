pub mod config;
pub mod hal;
pub mod logging;
