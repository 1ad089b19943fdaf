//! Bounded id space for networked / persisted entities.

use serde::{Deserialize, Serialize};

use crate::components::NetId;
use crate::error::SimError;

/// Hands out `u16` ids in `1..=limit`, reusing freed ids lowest-first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdAllocator {
    limit: u16,
    next: u32,
    free: Vec<u16>,
}

impl IdAllocator {
    pub fn new(limit: u16) -> Self {
        Self {
            limit,
            next: 1,
            free: Vec::new(),
        }
    }

    pub fn allocate(&mut self) -> Result<NetId, SimError> {
        if let Some(id) = self.free.pop() {
            return Ok(NetId(id));
        }
        if self.next > self.limit as u32 {
            return Err(SimError::IdSpaceExhausted { limit: self.limit });
        }
        let id = self.next as u16;
        self.next += 1;
        Ok(NetId(id))
    }

    pub fn release(&mut self, id: NetId) {
        if id.0 == 0 || id.0 as u32 >= self.next || self.free.contains(&id.0) {
            log::warn!("ignoring release of unallocated id {}", id.0);
            return;
        }
        self.free.push(id.0);
        // Lowest ids at the end so `pop` reuses them first
        self.free.sort_unstable_by(|a, b| b.cmp(a));
    }

    pub fn in_use(&self) -> usize {
        (self.next - 1) as usize - self.free.len()
    }
}
