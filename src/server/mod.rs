//! The TCP-facing side: listener, per-connection loop and request dispatch.

pub mod connection;
pub mod dispatcher;
pub mod listener;
pub mod options;

pub use connection::serve_connection;
pub use dispatcher::Dispatcher;
pub use listener::Server;
pub use options::{default_worker_threads, ServerOptions, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT, DEFAULT_SHUTDOWN_GRACE};
