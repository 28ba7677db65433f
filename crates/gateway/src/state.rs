use std::{sync::Arc, time::Instant};

use sandbar_jobs::JobRegistry;

/// Shared state behind every handler.
pub struct GatewayState {
    pub registry: JobRegistry,
    pub version: &'static str,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(registry: JobRegistry) -> Arc<Self> {
        Arc::new(Self {
            registry,
            version: env!("CARGO_PKG_VERSION"),
            started_at: Instant::now(),
        })
    }
}
