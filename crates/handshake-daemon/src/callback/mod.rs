//! Inbound credential responses
//!
//! The receiver never talks to the gateway. It writes the terminal state into
//! the session store and leaves the rest to the change watcher.

mod receiver;

pub use receiver::CallbackReceiver;
