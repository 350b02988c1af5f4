// src/repositories/postgres/mod.rs

pub mod banphrases;
pub mod commands;
pub mod filters;
pub mod logs;
pub mod transactions;
