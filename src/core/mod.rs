pub mod alerts;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod formatter;
pub mod http;
pub mod models;
pub mod normalize;
pub mod oauth;
pub mod pipeline;
pub mod process;
