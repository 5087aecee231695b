extern crate log;
pub mod analysis;
pub mod config;
pub mod geofile;
pub mod query;
pub mod ranking;
pub mod session;
