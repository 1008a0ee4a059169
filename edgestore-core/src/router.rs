//! The bucket registry.
//!
//! A router is built once at startup and then only read. Building validates
//! every bucket declaration so mistakes surface before the first request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::bucket::{Bucket, DefinitionError};

pub struct EdgeStoreRouter<C> {
    buckets: Arc<BTreeMap<String, Bucket<C>>>,
}

impl<C> Clone for EdgeStoreRouter<C> {
    fn clone(&self) -> Self {
        Self {
            buckets: Arc::clone(&self.buckets),
        }
    }
}

impl<C> fmt::Debug for EdgeStoreRouter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.buckets.iter()).finish()
    }
}

impl<C> EdgeStoreRouter<C> {
    pub fn builder() -> RouterBuilder<C> {
        RouterBuilder::new()
    }

    pub fn bucket(&self, name: &str) -> Option<&Bucket<C>> {
        self.buckets.get(name)
    }

    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Function-free routing table, handed to the provider on `init`.
    pub fn to_json(&self) -> Value {
        let buckets: Map<String, Value> = self
            .buckets
            .iter()
            .map(|(name, bucket)| (name.clone(), bucket.to_json()))
            .collect();
        json!({ "buckets": buckets })
    }
}

pub struct RouterBuilder<C> {
    buckets: Vec<(String, Bucket<C>)>,
}

impl<C> Default for RouterBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RouterBuilder<C> {
    pub fn new() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }

    pub fn bucket(mut self, name: impl Into<String>, bucket: Bucket<C>) -> Self {
        self.buckets.push((name.into(), bucket));
        self
    }

    pub fn build(self) -> Result<EdgeStoreRouter<C>, DefinitionError> {
        let mut map = BTreeMap::new();
        for (name, bucket) in self.buckets {
            if name.trim().is_empty() {
                return Err(DefinitionError::EmptyBucketName);
            }
            bucket.validate(&name)?;
            if map.contains_key(&name) {
                return Err(DefinitionError::DuplicateBucket(name));
            }
            map.insert(name, bucket);
        }
        Ok(EdgeStoreRouter {
            buckets: Arc::new(map),
        })
    }
}
