//! Analysis performed on the records of each configured layer.

pub mod closest;
pub mod config;
pub mod display;
pub mod distance;
pub mod proximity;
pub mod search;
pub mod summary;
pub mod units;
