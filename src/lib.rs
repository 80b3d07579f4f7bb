//! Backend of the Solana Workbench: local key custody, an account registry
//! kept in step with a Solana cluster, and control of a local test validator,
//! exposed to the GUI as tagged request/response messages.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod service;
