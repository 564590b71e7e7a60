pub mod adapter;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod geocode;
pub mod logging;
pub mod pipeline;
pub mod resolve;
pub mod storage;
pub mod validate;
