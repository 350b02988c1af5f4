// src/repositories/mod.rs

pub mod postgres;

pub use postgres::banphrases::PostgresBanphraseRepository;
pub use postgres::commands::PostgresCommandRepository;
pub use postgres::filters::PostgresFilterRepository;
pub use postgres::logs::PostgresLogSink;
pub use postgres::transactions::{PgCommandTransaction, PgTransactionProvider};
