#![warn(clippy::unwrap_used)]

pub mod auth;
pub mod crm_rest;
pub mod rest;
pub mod server;
pub mod swagger;

pub use rest::AppState;
pub use server::ApiServer;
pub use swagger::ApiDoc;
