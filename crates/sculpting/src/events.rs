//! Notifications for downstream re-evaluation.

/// Events emitted by a sculpt session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SculptEvent {
    /// Geometry changed and must be re-evaluated
    GeometryChanged,
    TopologyEnabled,
    TopologyDisabled,
    /// Physics caches that depended on vertex indices were dropped
    PointCachesReset,
}

/// Listener registry
#[derive(Default)]
pub struct EventBus {
    #[allow(clippy::type_complexity)]
    listeners: Vec<Box<dyn Fn(&SculptEvent) + Send + Sync>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listener_count", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners are called in registration order.
    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(&SculptEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&self, event: SculptEvent) {
        tracing::trace!("emit {:?}", event);
        for listener in &self.listeners {
            listener(&event);
        }
    }
}
