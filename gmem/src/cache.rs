// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gmem_layout::{DeviceCaps, LayoutKey, TileGrid, TileOrder};

use crate::{DebugFlags, Error, Result};

/// Number of layouts kept when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 20;

/// Options for constructing a [`LayoutCache`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CacheOptions {
    /// Maximum number of cached layouts, at least one.
    pub capacity: usize,
    pub debug: DebugFlags,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            debug: DebugFlags::none(),
        }
    }
}

/// Lookup counters of a [`LayoutCache`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// A bounded, least-recently-used map from [`LayoutKey`] to [`TileGrid`].
///
/// One cache is shared by every rendering context of a device. Grids are handed out
/// as `Arc`s: evicting a grid only drops the cache's reference, so renderers still
/// holding it are unaffected.
#[derive(Debug)]
pub struct LayoutCache {
    caps: DeviceCaps,
    options: CacheOptions,
    state: Mutex<CacheState>,
}

// Shared between the rendering contexts of a device.
static_assertions::assert_impl_all!(LayoutCache: Send, Sync);

#[derive(Debug, Default)]
struct CacheState {
    map: HashMap<LayoutKey, CacheEntry>,
    serial: u64,
    stats: CacheStats,
}

#[derive(Debug)]
struct CacheEntry {
    grid: Arc<TileGrid>,
    /// Serial of the last lookup; the smallest serial is the least recently used.
    serial: u64,
}

impl CacheState {
    fn touch(&mut self, key: &LayoutKey) -> Option<Arc<TileGrid>> {
        let entry = self.map.get_mut(key)?;
        self.serial += 1;
        entry.serial = self.serial;
        Some(entry.grid.clone())
    }

    fn evict_lru(&mut self) {
        let Some(key) = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.serial)
            .map(|(key, _)| *key)
        else {
            return;
        };
        self.map.remove(&key);
        self.stats.evictions += 1;
        log::debug!("gmem: evicted {}x{} layout", key.width, key.height);
    }
}

impl LayoutCache {
    pub fn new(caps: DeviceCaps, options: CacheOptions) -> Self {
        Self {
            caps,
            options: CacheOptions {
                capacity: options.capacity.max(1),
                ..options
            },
            state: Mutex::default(),
        }
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn debug(&self) -> DebugFlags {
        self.options.debug
    }

    pub fn capacity(&self) -> usize {
        self.options.capacity
    }

    /// Returns the grid for `key`, building and inserting it on a miss.
    ///
    /// The grid is built without holding the lock. If another caller inserted the same
    /// key in the meantime, its grid is returned and ours is dropped. On failure the
    /// cache is left unchanged.
    pub fn get_or_create(&self, key: &LayoutKey) -> Result<Arc<TileGrid>> {
        {
            let mut state = self.lock();
            if let Some(grid) = state.touch(key) {
                state.stats.hits += 1;
                log::debug!("gmem: layout cache hit for {}x{}", key.width, key.height);
                return Ok(grid);
            }
            state.stats.misses += 1;
        }
        log::debug!("gmem: layout cache miss for {}x{}", key.width, key.height);

        let order = if self.options.debug.contains(DebugFlags::NO_SERPENTINE) {
            TileOrder::RowMajor
        } else {
            TileOrder::Serpentine
        };
        let grid = Arc::new(TileGrid::with_order(*key, &self.caps, order)?);

        let mut state = self.lock();
        if let Some(existing) = state.touch(key) {
            return Ok(existing);
        }
        state.map.try_reserve(1).map_err(Error::CacheAllocation)?;
        if state.map.len() >= self.options.capacity {
            state.evict_lru();
        }
        state.serial += 1;
        let serial = state.serial;
        state.map.insert(
            *key,
            CacheEntry {
                grid: grid.clone(),
                serial,
            },
        );
        drop(state);

        log::info!(
            "gmem: new layout for {}x{}: {}x{} bins of {}x{}, {} pipes",
            key.width,
            key.height,
            grid.bins_x(),
            grid.bins_y(),
            grid.bin_width(),
            grid.bin_height(),
            grid.used_pipes()
        );
        if self.options.debug.contains(DebugFlags::DUMP_LAYOUTS) {
            log::info!("{grid}");
        }
        Ok(grid)
    }

    /// Gives back a grid obtained from [`LayoutCache::get_or_create`].
    ///
    /// Returns whether this was the last reference, in which case the grid has already
    /// left the cache and is freed now.
    pub fn release(&self, grid: Arc<TileGrid>) -> bool {
        Arc::into_inner(grid).is_some()
    }

    /// Bins per pipe for `key`, for pre-sizing per-pipe buffers.
    ///
    /// Goes through the cache, so the layout is cached and marked as recently used.
    pub fn estimate_pipe_capacity(&self, key: &LayoutKey) -> Result<(u32, u32)> {
        let grid = self.get_or_create(key)?;
        let capacity = grid.max_tiles_per_pipe();
        self.release(grid);
        Ok(capacity)
    }

    /// Whether `key` is cached. Doesn't count as a use.
    pub fn contains(&self, key: &LayoutKey) -> bool {
        self.lock().map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Cached keys and grids, most recently used first.
    pub fn entries(&self) -> Vec<(LayoutKey, Arc<TileGrid>)> {
        let state = self.lock();
        let mut entries: Vec<_> = state
            .map
            .iter()
            .map(|(key, entry)| (entry.serial, *key, entry.grid.clone()))
            .collect();
        drop(state);
        entries.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        entries
            .into_iter()
            .map(|(_, key, grid)| (key, grid))
            .collect()
    }

    /// Cache state is never left half-updated, so a panic elsewhere doesn't poison it.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
