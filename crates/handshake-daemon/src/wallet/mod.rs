//! Credential exchange adapter
//!
//! The identity wallet is an opaque collaborator. This module narrows it to
//! the handful of calls the handshake needs and classifies its failures as
//! `InvalidCredential` or `Unavailable` without looking at the cryptography.

mod http;
mod local;
mod traits;

pub use http::HttpWalletClient;
pub use local::LocalWallet;
pub use traits::{
    AuthRequest, CredentialExchange, CredentialMetadata, VerifiedResponse, WalletResult,
};
