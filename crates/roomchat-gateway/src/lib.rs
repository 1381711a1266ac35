//! WebSocket gateway: per-connection sessions and room fan-out.

pub mod connection;
pub mod dispatcher;
pub mod session;
pub mod state;
