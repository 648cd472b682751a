//! Snapshot registry: lifecycle states, refcounts and promotion.

use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::snapshot::{RegistryError, SnapshotHandle, SnapshotId, SnapshotInfo, SnapshotState};
use crate::store::ModelStore;

#[derive(Debug)]
struct SnapshotEntry {
    generation: u64,
    state: SnapshotState,
    refcount: usize,
    created_at: SystemTime,
    sealed: bool,
    errors: Vec<String>,
}

impl SnapshotEntry {
    fn info(&self, id: SnapshotId) -> SnapshotInfo {
        SnapshotInfo {
            id,
            generation: self.generation,
            state: self.state,
            refcount: self.refcount,
            created_at: self.created_at,
            sealed: self.sealed,
            errors: self.errors.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<SnapshotId, SnapshotEntry>,
    active: Option<SnapshotId>,
}

pub(crate) struct RegistryInner {
    state: Mutex<RegistryState>,
    pub(crate) store: Arc<ModelStore>,
    active: ArcSwapOption<SnapshotId>,
    next_generation: AtomicU64,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a reference to a snapshot a live handle already pins.
    pub(crate) fn retain(&self, id: SnapshotId) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(&id) {
            entry.refcount += 1;
        }
    }

    /// Drop one reference; frees records once a retiring snapshot drains.
    pub(crate) fn release(&self, id: SnapshotId) {
        let retired = {
            let mut state = self.lock();
            let Some(entry) = state.entries.get_mut(&id) else {
                tracing::error!(snapshot = %id, "Release of unknown snapshot");
                return;
            };
            if entry.refcount == 0 {
                tracing::error!(snapshot = %id, state = %entry.state, "Release with zero refcount ignored");
                return;
            }
            entry.refcount -= 1;
            if entry.refcount == 0 && entry.state == SnapshotState::Retiring {
                entry.state = SnapshotState::Retired;
                true
            } else {
                false
            }
        };

        if retired {
            let freed = self.store.discard(id);
            tracing::info!(snapshot = %id, records_freed = freed, "Snapshot retired");
        }
    }
}

/// Outcome of a successful promotion.
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub promoted: SnapshotId,
    /// Snapshot that was active before, now RETIRING or already RETIRED.
    pub superseded: Option<SnapshotId>,
    /// True when this was the first snapshot ever promoted.
    pub first: bool,
}

/// Outcome of a garbage collection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcReport {
    pub discarded_staging: Vec<SnapshotId>,
    pub pruned_retired: usize,
}

/// Tracks every snapshot's lifecycle and owns its records.
#[derive(Clone)]
pub struct SnapshotRegistry {
    inner: Arc<RegistryInner>,
}

impl SnapshotRegistry {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::default()),
                store,
                active: ArcSwapOption::empty(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// The store holding every snapshot's records.
    pub fn store(&self) -> &Arc<ModelStore> {
        &self.inner.store
    }

    /// Allocate a fresh identifier and register it as STAGING.
    pub fn new_snapshot(&self) -> SnapshotId {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut state = self.inner.lock();
        let mut id = SnapshotId::generate();
        while state.entries.contains_key(&id) {
            id = SnapshotId::generate();
        }
        state.entries.insert(
            id,
            SnapshotEntry {
                generation,
                state: SnapshotState::Staging,
                refcount: 0,
                created_at: SystemTime::now(),
                sealed: false,
                errors: Vec::new(),
            },
        );
        tracing::debug!(snapshot = %id, generation, "Snapshot staging");
        id
    }

    /// Record a staging failure; the snapshot can no longer be promoted.
    pub fn record_error(&self, id: SnapshotId, error: impl ToString) -> Result<(), RegistryError> {
        let mut state = self.inner.lock();
        let entry = staging_entry(&mut state, id)?;
        entry.errors.push(error.to_string());
        Ok(())
    }

    /// Mark staging as complete. No further records may be attached.
    pub fn seal(&self, id: SnapshotId) -> Result<(), RegistryError> {
        let mut state = self.inner.lock();
        let entry = staging_entry(&mut state, id)?;
        entry.sealed = true;
        Ok(())
    }

    /// Make `id` the active snapshot.
    ///
    /// The previous active snapshot moves to RETIRING in the same critical
    /// section. On any error nothing changes.
    pub fn promote(&self, id: SnapshotId) -> Result<Promotion, RegistryError> {
        let (promotion, retired_now) = {
            let mut state = self.inner.lock();

            let candidate = state.entries.get(&id).ok_or(RegistryError::Unknown(id))?;
            if candidate.state != SnapshotState::Staging {
                return Err(RegistryError::NotStaging {
                    id,
                    state: candidate.state,
                });
            }
            if !candidate.sealed {
                return Err(RegistryError::StagingIncomplete(id));
            }
            if let Some(first) = candidate.errors.first() {
                return Err(RegistryError::Unpromotable {
                    id,
                    count: candidate.errors.len(),
                    first: first.clone(),
                });
            }
            let candidate_generation = candidate.generation;

            let previous = state.active;
            if let Some(active_id) = previous {
                let active_generation = state
                    .entries
                    .get(&active_id)
                    .map(|e| e.generation)
                    .unwrap_or(0);
                if active_generation > candidate_generation {
                    return Err(RegistryError::Superseded {
                        id,
                        active: active_id,
                    });
                }
            }

            let mut retired_now = false;
            if let Some(active_id) = previous {
                if let Some(old) = state.entries.get_mut(&active_id) {
                    old.state = SnapshotState::Retiring;
                    // the active slot's own reference is released here
                    if old.refcount == 0 {
                        old.state = SnapshotState::Retired;
                        retired_now = true;
                    }
                }
            }
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.state = SnapshotState::Active;
            }
            state.active = Some(id);
            self.inner.active.store(Some(Arc::new(id)));

            (
                Promotion {
                    promoted: id,
                    superseded: previous,
                    first: previous.is_none(),
                },
                retired_now,
            )
        };

        if let (true, Some(old)) = (retired_now, promotion.superseded) {
            let freed = self.inner.store.discard(old);
            tracing::info!(snapshot = %old, records_freed = freed, "Snapshot retired");
        }
        Ok(promotion)
    }

    /// Pin the active snapshot for reading.
    ///
    /// Returns `None` until the first promotion.
    pub fn acquire_active(&self) -> Option<SnapshotHandle> {
        let mut state = self.inner.lock();
        let id = state.active?;
        let entry = state.entries.get_mut(&id)?;
        entry.refcount += 1;
        drop(state);
        Some(SnapshotHandle::new(self.inner.clone(), id))
    }

    /// Return a handle. Equivalent to dropping it.
    pub fn release(&self, handle: SnapshotHandle) {
        drop(handle);
    }

    /// Throw away a snapshot that never became active.
    pub fn discard(&self, id: SnapshotId) -> Result<usize, RegistryError> {
        {
            let mut state = self.inner.lock();
            let Some(entry) = state.entries.get(&id) else {
                drop(state);
                // records may still have been staged under an id the registry forgot
                let freed = self.inner.store.discard(id);
                if freed > 0 {
                    tracing::warn!(snapshot = %id, freed, "Freed records of unknown snapshot");
                }
                return Err(RegistryError::Unknown(id));
            };
            match entry.state {
                SnapshotState::Staging => {
                    state.entries.remove(&id);
                }
                SnapshotState::Active => return Err(RegistryError::ActiveSnapshot(id)),
                other => return Err(RegistryError::NotStaging { id, state: other }),
            }
        }
        Ok(self.inner.store.discard(id))
    }

    /// Discard sealed STAGING snapshots that were never promoted and forget
    /// RETIRED ones. Unsealed snapshots still belong to a cycle in progress.
    pub fn collect_garbage(&self) -> GcReport {
        let mut report = GcReport::default();
        {
            let mut state = self.inner.lock();
            state.entries.retain(|id, entry| match entry.state {
                SnapshotState::Staging if entry.sealed => {
                    report.discarded_staging.push(*id);
                    false
                }
                SnapshotState::Retired => {
                    report.pruned_retired += 1;
                    false
                }
                _ => true,
            });
        }
        for id in &report.discarded_staging {
            let freed = self.inner.store.discard(*id);
            tracing::info!(snapshot = %id, records_freed = freed, "Stale staging snapshot discarded");
        }
        report
    }

    /// Lock-free view of the active snapshot id.
    pub fn active_id(&self) -> Option<SnapshotId> {
        self.inner.active.load().as_deref().copied()
    }

    /// Whether any snapshot has been promoted yet.
    pub fn has_active(&self) -> bool {
        self.inner.active.load().is_some()
    }

    pub fn info(&self, id: SnapshotId) -> Option<SnapshotInfo> {
        let state = self.inner.lock();
        state.entries.get(&id).map(|e| e.info(id))
    }

    /// Every tracked snapshot, oldest first.
    pub fn snapshots(&self) -> Vec<SnapshotInfo> {
        let mut infos: Vec<_> = {
            let state = self.inner.lock();
            state.entries.iter().map(|(id, e)| e.info(*id)).collect()
        };
        infos.sort_by_key(|i| i.generation);
        infos
    }
}

fn staging_entry(
    state: &mut RegistryState,
    id: SnapshotId,
) -> Result<&mut SnapshotEntry, RegistryError> {
    let entry = state.entries.get_mut(&id).ok_or(RegistryError::Unknown(id))?;
    if entry.state != SnapshotState::Staging {
        return Err(RegistryError::NotStaging {
            id,
            state: entry.state,
        });
    }
    Ok(entry)
}
