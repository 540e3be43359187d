pub mod cache;
pub mod dispatcher;
pub mod notify;
pub mod redis_cache;
pub mod registry;
pub mod session;
pub mod store;
pub mod triggers;
