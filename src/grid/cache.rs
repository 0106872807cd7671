use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;
use anyhow::{anyhow, Result};
use tracing::debug;

use crate::grid::{Grid, GridSource};

/// Load-once store of grids keyed by source location. Repeated requests share one
/// immutable in-memory copy. Entries are never evicted.
#[derive(Debug, Default)]
pub struct GridCache {
    grids: Mutex<AHashMap<String, Arc<Grid>>>,
}

impl GridCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached grid for `source.location`, loading it on first request.
    pub fn get_or_load(&self, source: &GridSource) -> Result<Arc<Grid>> {
        self.get_or_insert_with(&source.location, || source.load())
    }

    /// Return the grid cached under `key`, or build it with `load` and cache it.
    /// A failed load caches nothing. `load` runs without the lock held, so lookups of
    /// other keys are not blocked; when two callers race on one key the first insert wins
    /// and both get that grid.
    pub fn get_or_insert_with(&self, key: &str, load: impl FnOnce() -> Result<Grid>) -> Result<Arc<Grid>> {
        if let Some(grid) = self.lock()?.get(key) {
            debug!(key, "grid cache hit");
            return Ok(Arc::clone(grid));
        }

        let grid = Arc::new(load()?);
        let mut grids = self.lock()?;
        Ok(Arc::clone(grids.entry(key.to_string()).or_insert(grid)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, AHashMap<String, Arc<Grid>>>> {
        self.grids.lock().map_err(|_| anyhow!("grid cache lock poisoned"))
    }

    /// Whether a grid is cached under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.grids.lock().is_ok_and(|grids| grids.contains_key(key))
    }

    /// Number of cached grids.
    pub fn len(&self) -> usize {
        self.grids.lock().map_or(0, |grids| grids.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::bail;
    use geo::{MultiPolygon, polygon};
    use polars::df;

    use super::*;
    use crate::layer::Layer;

    fn tiny_grid() -> Result<Grid> {
        let shapes = vec![MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]])];
        Grid::new(Layer::new(shapes, df!("V" => [1.0])?, Some(2056))?, None)
    }

    #[test]
    fn loads_once_and_shares() {
        let cache = GridCache::new();
        let loads = Cell::new(0);
        let load = || { loads.set(loads.get() + 1); tiny_grid() };

        let a = cache.get_or_insert_with("grid.shp", load).unwrap();
        let b = cache.get_or_insert_with("grid.shp", load).unwrap();

        assert_eq!(loads.get(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.contains("grid.shp"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = GridCache::new();
        assert!(cache.get_or_insert_with("bad", || bail!("unreadable")).is_err());
        assert!(!cache.contains("bad"));
        assert!(cache.get_or_insert_with("bad", tiny_grid).is_ok());
    }

    #[test]
    fn other_keys_stay_readable_during_a_load() {
        let cache = GridCache::new();
        let first = cache.get_or_insert_with("a", tiny_grid).unwrap();
        let seen = cache.get_or_insert_with("b", || {
            let a = cache.get_or_insert_with("a", || bail!("already cached"))?;
            assert!(Arc::ptr_eq(&a, &first));
            tiny_grid()
        });
        assert!(seen.is_ok());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn first_insert_wins_for_a_key() {
        let cache = GridCache::new();
        let mut inner = None;
        let outer = cache.get_or_insert_with("a", || {
            inner = Some(cache.get_or_insert_with("a", tiny_grid)?);
            tiny_grid()
        }).unwrap();
        assert!(Arc::ptr_eq(&outer, &inner.unwrap()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_keys_are_distinct_entries() {
        let cache = GridCache::new();
        let a = cache.get_or_insert_with("a", tiny_grid).unwrap();
        let b = cache.get_or_insert_with("b", tiny_grid).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }
}
