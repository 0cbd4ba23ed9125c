//! Realtime gateway
//!
//! Each live connection gets a [`Channel`]. The [`Gateway`] mints codes for
//! it and, through the [`SubscriptionRegistry`], waits for the watcher to
//! report the terminal state of its session.

mod channel;
mod code;
mod registry;
mod service;

pub use channel::Channel;
pub use code::{CodeRenderer, PlainCode};
pub use registry::{Subscription, SubscriptionRegistry};
pub use service::Gateway;
