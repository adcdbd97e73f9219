#[macro_use]
extern crate log;

mod cache;
mod callback;
mod queue;

pub use cache::{CacheStatus, CallbackCache};
pub use callback::{PendingCallback, ResultHandler};
pub use queue::CallbackQueue;
