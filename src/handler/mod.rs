pub mod cache_refresher;
