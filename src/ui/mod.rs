//! Web front end module

pub mod server;
pub mod handlers;
pub mod websocket;

pub use server::{admin_router, viewer_router, WebServer};
