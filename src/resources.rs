use std::collections::HashMap;
use std::fmt;

/// Handle for a GPU-side allocation (mesh buffers or a texture).
///
/// The renderer keys its buffer caches by this id; the stage owns the
/// bookkeeping of which ids are alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    MeshBuffers,
    Texture,
}

/// Tracks live GPU allocations and the ids waiting to be destroyed.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    next: u64,
    live: HashMap<ResourceId, ResourceKind>,
    pending_release: Vec<ResourceId>,
    released_total: u64,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, kind: ResourceKind) -> ResourceId {
        self.next += 1;
        let id = ResourceId(self.next);
        self.live.insert(id, kind);
        id
    }

    /// Marks `id` as released. Returns `false` if it was not live, so a
    /// second release of the same id never reaches the renderer twice.
    pub fn release(&mut self, id: ResourceId) -> bool {
        if self.live.remove(&id).is_none() {
            return false;
        }
        self.pending_release.push(id);
        self.released_total += 1;
        true
    }

    /// Takes the ids released since the last call.
    pub fn drain_released(&mut self) -> Vec<ResourceId> {
        std::mem::take(&mut self.pending_release)
    }

    pub fn is_live(&self, id: ResourceId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_of(&self, kind: ResourceKind) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }

    pub fn released_total(&self) -> u64 {
        self.released_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_reported_once() {
        let mut ledger = ResourceLedger::new();
        let mesh = ledger.allocate(ResourceKind::MeshBuffers);
        let texture = ledger.allocate(ResourceKind::Texture);
        assert_eq!(ledger.live_count(), 2);
        assert_eq!(ledger.live_of(ResourceKind::Texture), 1);

        assert!(ledger.release(mesh));
        assert!(!ledger.release(mesh));
        assert_eq!(ledger.drain_released(), vec![mesh]);
        assert!(ledger.drain_released().is_empty());
        assert!(ledger.is_live(texture));
        assert_eq!(ledger.released_total(), 1);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut ledger = ResourceLedger::new();
        let first = ledger.allocate(ResourceKind::MeshBuffers);
        ledger.release(first);
        let second = ledger.allocate(ResourceKind::MeshBuffers);
        assert_ne!(first, second);
    }
}
