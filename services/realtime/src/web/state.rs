//! services/realtime/src/web/state.rs
//!
//! Defines the application's shared state: the in-memory coordinators and
//! the persistence ports they call out to. Coordinator state is owned here
//! and injected, never module-level, so tests can build isolated instances.

use crate::config::Config;
use mentorhub_core::ports::{AuthService, ContactService, MessageStore, NotificationStore};
use mentorhub_core::{
    CallCoordinator, ChatRouter, ConnectionRegistry, GroupCallCoordinator, NotificationDispatcher,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub chat: Arc<ChatRouter>,
    pub calls: Arc<CallCoordinator>,
    pub group_calls: Arc<GroupCallCoordinator>,
    pub notifier: Arc<NotificationDispatcher>,
    pub messages: Arc<dyn MessageStore>,
    pub auth: Arc<dyn AuthService>,
}

impl AppState {
    /// Wires the coordinators over the supplied ports.
    pub fn new(
        config: Arc<Config>,
        contacts: Arc<dyn ContactService>,
        messages: Arc<dyn MessageStore>,
        notifications: Arc<dyn NotificationStore>,
        auth: Arc<dyn AuthService>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Arc::new(NotificationDispatcher::new(
            registry.clone(),
            notifications,
        ));
        let chat = Arc::new(ChatRouter::new(
            registry.clone(),
            contacts,
            messages.clone(),
            notifier.clone(),
        ));
        let calls = Arc::new(CallCoordinator::new(
            registry.clone(),
            notifier.clone(),
            config.ring_timeout,
        ));
        let group_calls = Arc::new(GroupCallCoordinator::new(registry.clone()));

        Self {
            config,
            registry,
            chat,
            calls,
            group_calls,
            notifier,
            messages,
            auth,
        }
    }
}
