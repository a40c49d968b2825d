//! HTTP and WebSocket surface of the chat server.

mod handler;
mod server;
mod signal;
pub mod state;

pub use handler::session::{InboundFrame, LoopExit, read_loop, write_loop};
pub use server::Server;
