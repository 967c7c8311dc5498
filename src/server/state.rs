use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::connection_manager::ConnectionRegistry;
use crate::lifecycle::LifecycleController;
use crate::router::MessageRouter;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ConnectionRegistry>,
    pub lifecycle: Arc<LifecycleController>,
    pub router: Arc<MessageRouter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let lifecycle = Arc::new(LifecycleController::new(registry.clone(), &settings.websocket));
        let router = Arc::new(MessageRouter::new(
            lifecycle.clone(),
            settings.websocket.routing_mode,
        ));

        Self {
            settings: Arc::new(settings),
            registry,
            lifecycle,
            router,
            start_time: Instant::now(),
        }
    }
}
