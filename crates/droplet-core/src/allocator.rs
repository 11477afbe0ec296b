//! Storage-cell allocation for the engine's selected store.

use crate::chip::Location;
use crate::id::StoreId;

/// The selected store has no free cell left.
///
/// Recoverable: the caller may release fluids and retry the mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("store {store:?} is full (all {capacity} cells occupied)")]
pub struct StorageExhausted {
    pub store: StoreId,
    pub capacity: u32,
}

/// Tracks free/occupied cells in the single store the engine uses.
///
/// Cells are handed out lowest-index-first; `free` returns a cell to the
/// pool. The table size is fixed from the store capacity at engine setup.
#[derive(Debug, Clone)]
pub struct CellAllocator {
    store: StoreId,
    free: Vec<bool>,
    peak: u32,
}

impl CellAllocator {
    pub fn new(store: StoreId, capacity: u32) -> Self {
        Self {
            store,
            free: vec![true; capacity as usize],
            peak: 0,
        }
    }

    /// Return the first free cell, marking it occupied.
    pub fn allocate(&mut self) -> Result<Location, StorageExhausted> {
        match self.free.iter().position(|&f| f) {
            Some(i) => {
                self.free[i] = false;
                self.peak = self.peak.max(self.occupied());
                Ok(Location {
                    store: self.store,
                    cell: i as u32,
                })
            }
            None => Err(StorageExhausted {
                store: self.store,
                capacity: self.capacity(),
            }),
        }
    }

    /// Return a cell to the free pool.
    ///
    /// Freeing an already-free cell is a caller error; the table stays
    /// consistent either way. Locations from another store are ignored.
    pub fn free(&mut self, location: Location) {
        debug_assert_eq!(location.store, self.store);
        if location.store != self.store {
            return;
        }
        if let Some(cell) = self.free.get_mut(location.cell as usize) {
            *cell = true;
        }
    }

    pub fn capacity(&self) -> u32 {
        self.free.len() as u32
    }

    /// Number of currently free cells.
    pub fn free_cells(&self) -> u32 {
        self.free.iter().filter(|&&f| f).count() as u32
    }

    /// Number of currently occupied cells.
    pub fn occupied(&self) -> u32 {
        self.capacity() - self.free_cells()
    }

    /// High-water mark of simultaneously occupied cells.
    pub fn peak_occupied(&self) -> u32 {
        self.peak
    }
}
