// src/lib.rs

pub mod config;
pub mod db;
pub mod http;
pub mod repositories;
pub mod services;
pub mod tasks;

pub use db::Database;
pub use relaybot_common::error::Error;
pub use http::{ModerationApi, PajbotModerationClient};
