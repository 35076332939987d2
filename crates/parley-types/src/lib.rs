pub mod api;
pub mod events;
pub mod flow;
pub mod models;
