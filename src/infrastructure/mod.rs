pub mod anchor;
pub mod cluster_client;
pub mod keystore;
pub mod logging;
pub mod registry;
pub mod shutdown;
pub mod solana_client;
pub mod validator;
