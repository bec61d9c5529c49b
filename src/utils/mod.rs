pub mod activity_hash;
pub mod logger;
