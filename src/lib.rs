pub mod api_client;
pub mod config;
pub mod expansion;
pub mod fetcher;
pub mod folder;
pub mod hierarchy;
pub mod tree;
