pub mod error;
pub mod models;
pub mod regex_literal;
pub mod traits;

pub use error::Error;
