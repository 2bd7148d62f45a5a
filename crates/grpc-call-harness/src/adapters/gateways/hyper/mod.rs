mod frame;
mod server;

pub use server::Hyper;
