pub mod ai;
pub mod config;
pub mod db;
pub mod export;
pub mod interactive;
pub mod models;
pub mod routes;
pub mod store;
