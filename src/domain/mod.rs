pub mod art;
pub mod errors;
pub mod models;
