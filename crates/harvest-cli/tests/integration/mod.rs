mod common;
mod extract_tests;
mod listing_tests;
mod shard_tests;
