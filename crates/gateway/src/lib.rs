//! The SearchBridge gateway: HTTP(S) document serving, SAML authn/authz
//! endpoints, the administrator dashboard, and the schedule-driven push
//! runtime, wired over any [`sb_domain::adaptor::Adaptor`].

pub mod api;
pub mod authn;
pub mod authz;
pub mod cli;
pub mod docs;
pub mod fs_adaptor;
pub mod runtime;
pub mod server;
pub mod state;
