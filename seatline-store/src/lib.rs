pub mod app_config;
pub mod database;
pub mod event_repo;
pub mod hold_repo;
pub mod redis_repo;

pub use database::DbClient;
pub use event_repo::PgEventDirectory;
pub use hold_repo::PgSeatHoldRepository;
pub use redis_repo::RedisClient;
