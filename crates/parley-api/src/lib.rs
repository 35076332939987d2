pub mod analytics;
pub mod auth;
pub mod automations;
pub mod billing;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod router;
pub mod state;
pub mod templates;
pub mod webhooks;
