//! HTTP and WebSocket surface

pub mod rest;
pub mod ws;

pub use rest::router::create_router;
