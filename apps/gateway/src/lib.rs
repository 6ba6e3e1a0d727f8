pub mod app;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod models;
pub mod playlist;
pub mod proxy;
pub mod resolver;
pub mod routes;
pub mod upstream;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
