//! Shared domain types for SearchBridge: the adaptor contract, docid codec,
//! push records, authorization primitives, configuration, and the SAML
//! black-box interfaces.

pub mod adaptor;
pub mod authz;
pub mod config;
pub mod docid;
pub mod error;
pub mod record;
pub mod saml;

pub use error::{Error, Result};
