pub mod classifier;
pub mod dedup;
pub mod detection;
pub mod handlers;
pub mod prompts;
pub mod repository;
pub mod resolution;
pub mod review;
