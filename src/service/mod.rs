pub mod api;
pub mod dispatcher;
