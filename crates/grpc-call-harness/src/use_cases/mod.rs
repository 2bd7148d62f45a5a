mod create_host;
mod drive_calls;
mod inspect;
pub mod ports;

pub use create_host::HostBuilder;
pub use drive_calls::{CallDriver, CancelHandle, ShutdownPolicy};
pub use inspect::Inspector;
