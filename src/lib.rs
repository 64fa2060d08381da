pub mod clipboard;
pub mod config;
pub mod db;
pub mod filter;
pub mod gateway;
pub mod history;
pub mod kv;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod settings;
