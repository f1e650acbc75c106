//! Core library for `Keyrack`.
//!
//! Contains the access-control and identity-resolution engine: principal
//! extraction from certificate subjects, encrypted session cookies,
//! automation client validation, the client/group/secret access graph,
//! the secret delivery and group enrollment pipelines, and the append-only
//! audit log. This crate depends on `keyrack-store` for the storage
//! collaborator traits and knows nothing about HTTP routing or transport
//! TLS mechanics — only the derived principal crosses that boundary.

pub mod acl;
pub mod audit;
pub mod audit_file;
pub mod automation;
pub mod config;
pub mod delivery;
pub mod enrollment;
pub mod error;
pub mod principal;
pub mod session;
