pub mod config;
pub mod constants;
pub mod ephemeris;
pub mod fov;
pub mod ids;
pub mod io;
pub mod kernel_pool;
pub mod metakernel;
pub mod pointing;
pub mod pointing_errors;
pub mod time;
