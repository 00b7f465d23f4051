//! Event routing table.
//!
//! Maps wire tags to handlers. Several handlers may share a tag; they run one
//! after another in registration order and the first error stops the chain.
//! Tags with no registration are ignored.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rtvoice_core::{EventHandler, HandlerError, ServerEvent};

/// Tag-keyed [`EventHandler`] fan-out.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<&'static str, Vec<Arc<dyn EventHandler>>>,
}

impl Dispatcher {
    /// Empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route events tagged `event_type` to `handler`.
    pub fn on(&mut self, event_type: &'static str, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.routes.entry(event_type).or_default().push(handler);
        self
    }

    /// Route every tag in `event_types` to the same handler.
    pub fn on_all(&mut self, event_types: &[&'static str], handler: &Arc<dyn EventHandler>) -> &mut Self {
        for event_type in event_types {
            let _ = self.on(event_type, Arc::clone(handler));
        }
        self
    }

    /// Number of handlers registered for `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.routes.get(event_type).map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventHandler for Dispatcher {
    async fn handle(&self, event: &ServerEvent) -> Result<(), HandlerError> {
        let Some(handlers) = self.routes.get(event.event_type()) else {
            return Ok(());
        };
        for handler in handlers {
            handler.handle(event).await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
