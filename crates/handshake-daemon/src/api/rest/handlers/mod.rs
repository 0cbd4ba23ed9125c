//! API request handlers

mod authentication;
mod health;
mod offers;

pub use authentication::*;
pub use health::*;
pub use offers::*;
