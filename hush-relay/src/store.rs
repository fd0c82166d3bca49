//! Blind object store for one-shot encrypted file transfer.
//!
//! Objects are opaque byte payloads addressed by an unguessable
//! [`ObjectHandle`]. Each object can be taken exactly once: `take` is a
//! compare-and-remove on a sharded map, so among concurrent callers racing on
//! the same handle exactly one receives the payload. Objects older than the
//! retention window are unreachable even before the sweep reclaims them.
//!
//! `take` reports [`StoreError::NotFound`] for unknown, consumed and expired
//! handles alike.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hush_types::ObjectHandle;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Capacity and retention limits for a [`BlindStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// How long an object stays retrievable.
    pub retention: Duration,
    /// Maximum size of a single payload.
    pub max_object_size: usize,
    /// Maximum number of resident objects.
    pub max_objects: usize,
    /// Maximum total resident payload bytes.
    pub max_total_bytes: usize,
}

impl From<&StoreConfig> for StoreLimits {
    fn from(config: &StoreConfig) -> Self {
        Self {
            retention: config.retention(),
            max_object_size: config.max_object_size,
            max_objects: config.max_objects,
            max_total_bytes: config.max_total_bytes,
        }
    }
}

#[derive(Debug)]
struct BlindObject {
    payload: Vec<u8>,
    created_at: Instant,
}

impl BlindObject {
    fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= retention
    }
}

/// In-memory single-read object store.
#[derive(Debug)]
pub struct BlindStore {
    objects: DashMap<ObjectHandle, BlindObject>,
    limits: StoreLimits,
    resident_objects: AtomicUsize,
    resident_bytes: AtomicUsize,
}

impl BlindStore {
    /// Create an empty store.
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            objects: DashMap::new(),
            limits,
            resident_objects: AtomicUsize::new(0),
            resident_bytes: AtomicUsize::new(0),
        }
    }

    /// The limits this store enforces.
    pub fn limits(&self) -> &StoreLimits {
        &self.limits
    }

    /// Store a payload and return the handle that retrieves it.
    pub fn put(&self, payload: Vec<u8>) -> StoreResult<ObjectHandle> {
        let size = payload.len();
        if size > self.limits.max_object_size {
            return Err(StoreError::TooLarge {
                size,
                limit: self.limits.max_object_size,
            });
        }

        self.reserve(size)?;

        let object = BlindObject {
            payload,
            created_at: Instant::now(),
        };

        // A collision on 128 random bits does not happen in practice, but
        // overwriting someone else's object must never happen at all.
        let handle = loop {
            let handle = match ObjectHandle::generate() {
                Ok(handle) => handle,
                Err(e) => {
                    self.release(size);
                    return Err(e.into());
                }
            };
            if let Entry::Vacant(slot) = self.objects.entry(handle) {
                slot.insert(object);
                break handle;
            }
        };

        tracing::debug!("Stored blind object {:?} ({} bytes)", handle, size);
        Ok(handle)
    }

    /// Remove and return a payload.
    pub fn take(&self, handle: &ObjectHandle) -> StoreResult<Vec<u8>> {
        let (_, object) = self.objects.remove(handle).ok_or(StoreError::NotFound)?;
        self.release(object.payload.len());

        if object.is_expired(Instant::now(), self.limits.retention) {
            tracing::debug!("Blind object {:?} expired before retrieval", handle);
            return Err(StoreError::NotFound);
        }

        Ok(object.payload)
    }

    /// Drop every expired object. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let retention = self.limits.retention;
        let mut removed = 0;
        let mut freed = 0;

        self.objects.retain(|_, object| {
            if object.is_expired(now, retention) {
                removed += 1;
                freed += object.payload.len();
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.resident_objects.fetch_sub(removed, Ordering::AcqRel);
            self.resident_bytes.fetch_sub(freed, Ordering::AcqRel);
        }
        removed
    }

    /// Number of resident objects, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.resident_objects.load(Ordering::Acquire)
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total resident payload bytes.
    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes.load(Ordering::Acquire)
    }

    fn reserve(&self, size: usize) -> StoreResult<()> {
        let max_objects = self.limits.max_objects;
        let max_bytes = self.limits.max_total_bytes;

        self.resident_objects
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max_objects).then_some(n + 1)
            })
            .map_err(|n| StoreError::CapacityExceeded {
                resident: n,
                bytes: self.resident_bytes(),
            })?;

        if let Err(bytes) =
            self.resident_bytes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| {
                    b.checked_add(size).filter(|total| *total <= max_bytes)
                })
        {
            let resident = self.resident_objects.fetch_sub(1, Ordering::AcqRel) - 1;
            return Err(StoreError::CapacityExceeded { resident, bytes });
        }

        Ok(())
    }

    fn release(&self, size: usize) {
        self.resident_objects.fetch_sub(1, Ordering::AcqRel);
        self.resident_bytes.fetch_sub(size, Ordering::AcqRel);
    }
}
