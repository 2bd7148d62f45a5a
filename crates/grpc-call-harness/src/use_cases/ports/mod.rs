mod collector;
mod invoker;
mod server;

pub use collector::Collector;
pub use invoker::Invoker;
pub use server::Server;
