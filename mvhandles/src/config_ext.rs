//! Extension pour intégrer la capacité du cache de handles dans mvconfig

use crate::{HandleCache, DEFAULT_CAPACITY};
use anyhow::Result;
use mvconfig::Config;

pub trait HandlesConfigExt {
    /// Nombre maximal de handles vivants
    fn get_handle_capacity(&self) -> usize;

    fn set_handle_capacity(&self, capacity: usize) -> Result<()>;

    fn create_handle_cache(&self) -> HandleCache;
}

impl HandlesConfigExt for Config {
    fn get_handle_capacity(&self) -> usize {
        self.get_usize(&["handles", "capacity"], DEFAULT_CAPACITY)
    }

    fn set_handle_capacity(&self, capacity: usize) -> Result<()> {
        self.set_usize(&["handles", "capacity"], capacity)
    }

    fn create_handle_cache(&self) -> HandleCache {
        HandleCache::new(self.get_handle_capacity())
    }
}
