pub mod db;
pub mod short_urls;
pub mod tx;
