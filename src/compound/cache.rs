//! Identity cache and type-binding table

use super::repo::RepoType;
use super::CompoundCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Native address -> live wrapper, without keeping wrappers alive
#[derive(Default)]
pub struct IdentityCache {
    entries: HashMap<usize, Weak<CompoundCell>>,
}

impl IdentityCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Live wrapper for `address`; dead entries are pruned on the way
    pub fn lookup(&mut self, address: usize) -> Option<Rc<CompoundCell>> {
        let cell = self.entries.get(&address)?.upgrade();
        if cell.is_none() {
            self.entries.remove(&address);
        }
        cell
    }

    pub fn insert(&mut self, address: usize, cell: &Rc<CompoundCell>) {
        self.entries.insert(address, Rc::downgrade(cell));
    }

    /// Drop the entry for `address` if it still refers to `cell`
    pub fn prune(&mut self, address: usize, cell: *const CompoundCell) {
        if self.entries.get(&address).map_or(false, |weak| weak.as_ptr() == cell) {
            self.entries.remove(&address);
        }
    }

    /// Number of entries whose wrapper is still alive
    pub fn len(&self) -> usize {
        self.entries.values().filter(|weak| weak.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Slots anchoring the repo type of every live wrapper
#[derive(Default)]
pub struct BindingTable {
    slots: Vec<Option<Rc<RepoType>>>,
    free: Vec<usize>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, repo: Rc<RepoType>) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(repo);
                index
            }
            None => {
                self.slots.push(Some(repo));
                self.slots.len() - 1
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<Rc<RepoType>> {
        self.slots.get(index).and_then(Clone::clone)
    }

    /// Free a slot, handing back what it anchored
    pub fn release(&mut self, index: usize) -> Option<Rc<RepoType>> {
        let repo = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        Some(repo)
    }

    /// Number of occupied slots
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
