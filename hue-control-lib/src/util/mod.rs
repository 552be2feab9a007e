pub mod auth;
pub mod connect;
pub mod discovery;
pub mod traits;
