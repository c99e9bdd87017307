//! Application constants

use std::time::Duration;

/// Default cap on open database connections
pub const DEFAULT_MAX_CONNECTIONS: u32 = 25;

/// Default number of connections kept open while idle
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;

/// Idle connections are closed after this long (5 minutes)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How long to wait for a pooled connection before giving up
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Length of generated short URL aliases
pub const ALIAS_LENGTH: usize = 6;

/// Default page size for paginated short URL queries
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Maximum page size for paginated short URL queries
pub const MAX_PAGE_SIZE: u32 = 100;

/// Path fragment that selects the search echo
pub const SEARCH_PATH: &str = "/search";

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 3000;
