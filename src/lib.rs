pub mod app;
pub mod feed;
pub mod filter;
pub mod ingest;
pub mod model;
pub mod query;
pub mod record;
pub mod sort;
pub mod transfer;
pub mod tree;
pub mod util;
