pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers the binary needs to build the web server router.
pub use middleware::require_auth;
pub use rest::{
    health_handler, list_notifications_handler, message_history_handler,
    notifications_read_handler, task_reminder_handler, unread_count_handler,
};
pub use ws_handler::ws_handler;
