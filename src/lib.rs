pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod scheduling;
pub mod schema;
pub mod state;
pub mod utils;
