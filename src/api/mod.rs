//! HTTP API for the Bedrock assistant

pub mod handlers;
pub mod routes;

pub use routes::create_router;
