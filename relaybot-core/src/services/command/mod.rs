pub mod context;
pub mod dispatcher;
pub mod language;
pub mod params;
pub mod registry;

pub use context::{CommandHandler, Context, Execution, ExternalRequestError};
pub use dispatcher::{DispatchResult, Dispatcher, Invocation, InvocationOptions};
pub use registry::{CommandRegistry, HandlerTable, RegisteredCommand};
