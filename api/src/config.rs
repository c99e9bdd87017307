//! Command line and environment configuration

use std::fmt;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS, DEFAULT_PORT,
};
use crate::services::db::PoolConfig;

#[derive(Parser, Debug)]
#[command(name = "shortlink-api")]
#[command(about = "Echo handler and database transaction runner for the shortlink service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub server: ServerArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Connect to DATABASE_URL, run a read-only transaction and exit
    Check,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ServerArgs {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Args, Clone)]
pub struct DatabaseArgs {
    /// Base connection URL (sqlite:, postgres: or postgresql:)
    #[arg(long = "database-url", env = "DATABASE_URL")]
    pub url: Option<String>,

    /// Authentication token, used as the password for Postgres
    #[arg(long = "database-token", env = "DATABASE_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    #[arg(
        long = "db-max-connections",
        env = "DATABASE_MAX_CONNECTIONS",
        default_value_t = DEFAULT_MAX_CONNECTIONS
    )]
    pub max_connections: u32,

    #[arg(
        long = "db-min-connections",
        env = "DATABASE_MIN_CONNECTIONS",
        default_value_t = DEFAULT_MIN_CONNECTIONS
    )]
    pub min_connections: u32,

    /// Close idle connections after this long (e.g. 5m, 90s)
    #[arg(
        long = "db-idle-timeout",
        env = "DATABASE_IDLE_TIMEOUT",
        default_value = "5m",
        value_parser = humantime::parse_duration
    )]
    pub idle_timeout: Duration,

    /// Give up waiting for a pooled connection after this long
    #[arg(
        long = "db-acquire-timeout",
        env = "DATABASE_ACQUIRE_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub acquire_timeout: Duration,
}

impl DatabaseArgs {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            idle_timeout: self.idle_timeout,
            acquire_timeout: self.acquire_timeout,
        }
    }
}

// Hand-written so the token never reaches logs
impl fmt::Debug for DatabaseArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseArgs")
            .field("url", &self.url.as_ref().map(|_| "<set>"))
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("idle_timeout", &self.idle_timeout)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}
