pub mod aggregate;
pub mod config;
pub mod feed;
pub mod file_templates;
pub mod fsops;
pub mod media_index;
pub mod migrate;
pub mod model;
pub mod paths;
pub mod publish;
pub mod render;
pub mod source;
pub mod store;
pub mod templates;

#[cfg(test)]
pub(crate) mod testutil;
