pub mod config;
pub mod data_client;
pub mod db_external;
pub mod memory_store;
pub mod utils;
