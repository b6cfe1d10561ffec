//! Dispatch module - turning connection input into application callbacks.
//!
//! - [`MessageDispatcher`] - callbacks implemented by the application
//! - [`ConnectionHandler`] - the per-connection parse and dispatch loop
//! - [`ConnectionExecutor`] - runs connections from start to teardown
//! - [`DispatcherBuilder`] - picks protocol mode, dispatcher and options

mod builder;
mod dispatcher;
mod executor;
mod handler;

pub use builder::{DispatcherBuilder, ProtocolFactory};
pub use dispatcher::MessageDispatcher;
pub use executor::ConnectionExecutor;
pub use handler::ConnectionHandler;
