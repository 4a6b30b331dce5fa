pub mod config;
pub mod db;
pub mod models;
pub mod rating;
pub mod report;
pub mod stats;
pub mod validate;
