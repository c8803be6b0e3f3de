//! Per-chain error handler registry.
//!
//! Every node of a chain gets an entry keyed by its [`NodeId`]. An entry
//! records the node's explicit error handler, if any, and its current
//! successor. When a node fails, the registry follows successor links
//! from that node until it finds an explicit handler.

use crate::task::{ResultHandler, TaskResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Chain-local node identifier, assigned in construction order
pub type NodeId = usize;

#[derive(Default)]
struct RouteEntry {
    successor: Option<NodeId>,
    handler: Option<ResultHandler>,
}

#[derive(Default)]
pub(crate) struct ErrorRoutes {
    entries: Mutex<Vec<RouteEntry>>,
    unhandled: AtomicUsize,
}

impl ErrorRoutes {
    /// Add a node, linking it as the successor of `parent`
    pub(crate) fn register_node(&self, parent: Option<NodeId>) -> NodeId {
        let mut entries = self.entries.lock();
        let id = entries.len();
        entries.push(RouteEntry::default());
        if let Some(entry) = parent.and_then(|parent| entries.get_mut(parent)) {
            entry.successor = Some(id);
        }
        id
    }

    pub(crate) fn set_handler(&self, id: NodeId, handler: ResultHandler) {
        if let Some(entry) = self.entries.lock().get_mut(id) {
            entry.handler = Some(handler);
        }
    }

    pub(crate) fn has_handler(&self, id: NodeId) -> bool {
        self.entries
            .lock()
            .get(id)
            .is_some_and(|entry| entry.handler.is_some())
    }

    /// Nearest explicit handler at or after `id`
    pub(crate) fn resolve(&self, id: NodeId) -> Option<ResultHandler> {
        let entries = self.entries.lock();
        let mut current = Some(id);
        while let Some(node) = current {
            let entry = entries.get(node)?;
            if let Some(handler) = &entry.handler {
                return Some(Arc::clone(handler));
            }
            // Successors are always registered after their parent.
            current = entry.successor.filter(|next| *next > node);
        }
        None
    }

    /// Deliver a failure raised on node `id`
    pub(crate) fn dispatch(&self, id: NodeId, result: TaskResult) {
        match self.resolve(id) {
            Some(handler) => handler(result),
            None => {
                let total = self.unhandled.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    "Unhandled error on chain node {} (code {}), {} dropped so far",
                    id, result.code, total
                );
            }
        }
    }

    /// Error handler bound to node `id`, installed on that node's executor
    pub(crate) fn router(self: &Arc<Self>, id: NodeId) -> ResultHandler {
        let routes = Arc::clone(self);
        Arc::new(move |result: TaskResult| routes.dispatch(id, result))
    }

    pub(crate) fn unhandled(&self) -> usize {
        self.unhandled.load(Ordering::SeqCst)
    }
}
