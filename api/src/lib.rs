//! Shortlink API
//!
//! - [`routes`]: the echo HTTP surface
//! - [`services::tx`]: runs units of work inside database transactions
//! - [`services::db`]: connection pools for SQLite and Postgres
//! - [`domain::short_urls`] / [`services::short_urls`]: short URL storage built on the runner

pub mod config;
pub mod constants;
pub mod domain;
pub mod routes;
pub mod services;
