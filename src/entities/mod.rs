pub mod api_key;
pub mod app;
pub mod file;
pub mod storage_configuration;
pub mod user;
