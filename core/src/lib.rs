pub mod auth;
pub mod db;
pub mod models;
pub mod progress;
pub mod service;
