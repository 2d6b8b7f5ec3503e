//! Renderable handle lifetime
//!
//! The registry is the display surface's table of live handles. The retention
//! queue keeps at most two of them alive: the one on screen and the one
//! replacing it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

use crate::models::{HandleId, RenderableHandle};

/// Handles kept alive by the streamer at any instant
pub const RETAINED_HANDLES: usize = 2;

/// Shared table of live renderable handles
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    live: Arc<Mutex<HashMap<HandleId, RenderableHandle>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new handle over `bytes`
    pub fn create(&self, file_id: u64, mime_type: &str, bytes: Vec<u8>) -> RenderableHandle {
        let handle = RenderableHandle::new(file_id, mime_type, bytes);
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id(), handle.clone());
        handle
    }

    /// Revoke a handle; its bytes become unreachable through every clone
    pub fn revoke(&self, handle: &RenderableHandle) {
        handle.revoke();
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id());
        trace!(handle = %handle.id(), "revoked handle");
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn live_ids(&self) -> Vec<HandleId> {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn is_live(&self, id: HandleId) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }
}

/// Bounded FIFO of emitted handles
#[derive(Debug)]
pub struct RetentionQueue {
    registry: HandleRegistry,
    queue: VecDeque<RenderableHandle>,
    capacity: usize,
}

impl RetentionQueue {
    pub fn new(registry: HandleRegistry) -> Self {
        Self::with_capacity(registry, RETAINED_HANDLES)
    }

    pub fn with_capacity(registry: HandleRegistry, capacity: usize) -> Self {
        Self {
            registry,
            queue: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
        }
    }

    /// Make room for one more handle, revoking the oldest ones first
    pub fn make_room(&mut self) {
        while self.queue.len() >= self.capacity {
            if let Some(oldest) = self.queue.pop_front() {
                self.registry.revoke(&oldest);
            }
        }
    }

    /// Track a handle that is about to be emitted
    pub fn push(&mut self, handle: RenderableHandle) {
        self.make_room();
        self.queue.push_back(handle);
    }

    /// Revoke a handle that was minted but will never be emitted
    pub fn discard(&self, handle: &RenderableHandle) {
        self.registry.revoke(handle);
    }

    /// Revoke everything still retained
    pub fn clear(&mut self) {
        for handle in self.queue.drain(..) {
            self.registry.revoke(&handle);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn ids(&self) -> Vec<HandleId> {
        self.queue.iter().map(RenderableHandle::id).collect()
    }
}
