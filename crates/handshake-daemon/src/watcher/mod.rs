//! Change watcher
//!
//! The watcher is responsible for:
//! - Polling the session store for every subscribed session id
//! - Raising exactly one terminal event per id (success or timeout)
//! - Forgetting ids once their event is raised or interest is withdrawn

mod change_watcher;

pub use change_watcher::ChangeWatcher;
