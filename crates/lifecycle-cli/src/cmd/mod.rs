pub mod config;
pub mod operations;
pub mod repos;
pub mod serve;
pub mod sweep;
