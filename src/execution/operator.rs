//! Region-valued operators.
//!
//! An [`Operator`] is a pure function from a (data source, region) pair to a
//! [`Block`]. Operators are constructed once and reused across many regions;
//! [`CachedOperator`] adds memoization through an explicit [`OperatorCache`].
//!
//! [`OperatorCache`]: crate::execution::cache::OperatorCache

use crate::core::block::Block;
use crate::core::error::EngineResult;
use crate::core::geometry::Region;
use crate::core::source::DataSource;
use crate::execution::cache::{CacheKey, SharedCache};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of an operator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub Uuid);

impl OperatorId {
    /// Generate a new unique identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperatorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A pure function from region to block.
pub trait Operator: Send + Sync {
    /// Compute the result for `region` of `source`.
    fn compute(&self, source: &dyn DataSource, region: &Region) -> EngineResult<Block>;
}

impl<O: Operator + ?Sized> Operator for &O {
    fn compute(&self, source: &dyn DataSource, region: &Region) -> EngineResult<Block> {
        (**self).compute(source, region)
    }
}

/// Fetches raw data unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Retriever;

impl Operator for Retriever {
    fn compute(&self, source: &dyn DataSource, region: &Region) -> EngineResult<Block> {
        Ok(source.retrieve(region)?)
    }
}

/// Wraps an operator with memoization.
///
/// Each wrapper gets its own [`OperatorId`], so two wrappers around equal
/// operators do not share entries even when they share a cache. Clones keep
/// the id and therefore share entries.
pub struct CachedOperator<O> {
    id: OperatorId,
    inner: O,
    cache: SharedCache,
}

impl<O: Operator> CachedOperator<O> {
    /// Wrap `inner`, storing results in `cache`.
    pub fn new(inner: O, cache: SharedCache) -> Self {
        Self {
            id: OperatorId::new(),
            inner,
            cache,
        }
    }

    /// Identity used in cache keys.
    pub fn id(&self) -> OperatorId {
        self.id
    }

    /// The wrapped operator.
    pub fn inner(&self) -> &O {
        &self.inner
    }

    /// The cache results are stored in.
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Memoize `compute` under this operator's key for `region` of `source`.
    ///
    /// `compute` must produce what [`Operator::compute`] would, e.g. the same
    /// computation with some of its inputs read through other caches.
    pub fn get_or_compute_with<F>(&self, source: &dyn DataSource, region: &Region, compute: F) -> EngineResult<Block>
    where
        F: FnOnce(&O) -> EngineResult<Block>,
    {
        let key = CacheKey::new(self.id, source.id(), *region);
        self.cache.get_or_compute(key, || compute(&self.inner))
    }
}

impl<O: Clone> Clone for CachedOperator<O> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: self.inner.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<O: Operator> Operator for CachedOperator<O> {
    fn compute(&self, source: &dyn DataSource, region: &Region) -> EngineResult<Block> {
        self.get_or_compute_with(source, region, |inner| inner.compute(source, region))
    }
}

impl<O> fmt::Debug for CachedOperator<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedOperator").field("id", &self.id).finish()
    }
}
