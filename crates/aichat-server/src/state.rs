use aichat::chat::ChatService;
use std::sync::Arc;

/// Shared application state, built once at startup and held for the process lifetime
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self {
            chat: Arc::new(chat),
        }
    }
}
