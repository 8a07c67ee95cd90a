//! Data Transfer Objects (DTOs) for the chat gateway.
//!
//! DTOs are organized by protocol:
//! - `websocket`: inbound event frames and outbound push frames
//! - `http`: HTTP API response DTOs
//! - `conversion`: domain entity → DTO conversions

pub mod conversion;
pub mod http;
pub mod websocket;
