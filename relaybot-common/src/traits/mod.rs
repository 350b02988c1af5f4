pub mod chat_traits;
pub mod repository_traits;
pub mod sink_traits;
pub mod transaction_traits;
