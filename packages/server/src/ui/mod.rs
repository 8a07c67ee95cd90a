//! WebSocket chat gateway implementation.

mod handler;
mod server;
mod signal;
pub mod gateway;
pub mod state;

pub use gateway::{Dependencies, Session, SessionGateway};
pub use server::{Server, SweepSettings};
pub use state::ConnectionSettings;
