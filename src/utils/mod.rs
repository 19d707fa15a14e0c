pub mod camera;
pub mod config;
pub mod display;
pub mod logging;
