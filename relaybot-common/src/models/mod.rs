pub mod banphrase;
pub mod channel;
pub mod command;
pub mod filter;
pub mod id;
pub mod log;
pub mod platform;
pub mod user;

pub use banphrase::*;
pub use channel::*;
pub use command::*;
pub use filter::*;
pub use id::*;
pub use log::*;
pub use platform::*;
pub use user::*;
