pub mod admin;
pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod password;
pub mod service;
