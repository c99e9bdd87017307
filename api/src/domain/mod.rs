pub mod short_urls;
