//! Registry access: credentials, the v2 pull client and the caching image store

pub mod auth;
pub mod client;
pub mod puller;

pub use auth::{Auth, CredentialResolver, RegistryCredential, RequestAuth};
pub use client::{RegistryClient, RegistryClientBuilder};
pub use puller::CachingPuller;
