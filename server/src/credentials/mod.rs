//! Durable storage for messaging-network credentials
//!
//! This module provides:
//! - `CredentialStore` trait for abstracting where credentials live
//! - `FileCredentialStore` for keeping them on the local filesystem
//! - `Credentials`, the opaque payload handed over by the transport

mod local;
mod service;
mod types;

pub use local::FileCredentialStore;
pub use service::CredentialStore;
pub use types::{CredentialError, Credentials};
