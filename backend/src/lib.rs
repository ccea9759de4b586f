pub mod config;
pub mod error;
pub mod explanation;
pub mod inference;
pub mod pipeline;
pub mod routes;
pub mod storage;
pub mod translation;
