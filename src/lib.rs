pub mod app;
pub mod favorites;
pub mod models;
pub mod query;
pub mod store;
pub mod view;
