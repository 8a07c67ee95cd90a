//! Hiroba: real-time chat session and room-presence gateway.
//!
//! - `domain`: connections, room presence and chunk reassembly
//! - `usecase`: presence coordination, fan-out, messaging and file transfer
//! - `infrastructure`: token verification, stores and WebSocket delivery
//! - `ui`: the Session Gateway and the axum server

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
