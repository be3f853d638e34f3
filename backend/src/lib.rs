pub mod analysis;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod insights;
pub mod narrative;
pub mod routes;
pub mod storage;
