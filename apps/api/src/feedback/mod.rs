pub mod handlers;
pub mod import;
pub mod repository;
pub mod validation;
