//! Watch-later membership.
//!
//! [`WatchLaterStore`] is the local, synchronous membership state that every
//! rendering surface reads. [`WatchLaterSync`] keeps it converged with the
//! server: optimistic change, server round trip, then a refetch whose
//! hydration replaces local state.
//!
//! Every mutation, every settled server write and every hydration draws a
//! number from one monotonically increasing sequence. A hydration is applied
//! only if no newer hydration was already applied. A key with a pending
//! mutation keeps its optimistic state unless that mutation's write settled
//! before the hydration was requested: until then the server list cannot be
//! trusted to reflect it.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    client::{http::WatchLaterBackend, retry::RetryPolicy},
    error::FetchError,
    models::{MediaKey, MediaKind, WatchLaterEntry},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    Remove,
}

/// Issued for an applied optimistic mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationTicket {
    pub key: MediaKey,
    pub kind: MutationKind,
    seq: u64,
}

/// Latest optimistic mutation of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingMutation {
    ticket: MutationTicket,
    /// Sequence number drawn when the server write returned
    settled: Option<u64>,
}

impl PendingMutation {
    fn new(ticket: MutationTicket) -> Self {
        Self {
            ticket,
            settled: None,
        }
    }

    /// A list requested after the write settled is authoritative for the key
    fn covered_by(&self, hydration: u64) -> bool {
        matches!(self.settled, Some(settled) if settled < hydration)
    }
}

/// Issued when a server list request starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationTicket {
    seq: u64,
}

#[derive(Debug, Default)]
pub struct WatchLaterStore {
    lookup: HashSet<MediaKey>,
    items: Vec<MediaKey>,
    status: SyncStatus,
    last_seq: u64,
    applied_hydration: u64,
    /// Latest mutation per key not yet covered by an applied hydration
    pending: HashMap<MediaKey, PendingMutation>,
}

impl WatchLaterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }

    /// O(1) membership check; never fetches
    pub fn has(&self, id: u64, kind: MediaKind) -> bool {
        self.contains(&MediaKey::new(id, kind))
    }

    pub fn contains(&self, key: &MediaKey) -> bool {
        self.lookup.contains(key)
    }

    /// Members in list order
    pub fn items(&self) -> &[MediaKey] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn has_pending(&self, key: &MediaKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Whether the server write for `key`'s latest mutation is still running
    pub fn is_in_flight(&self, key: &MediaKey) -> bool {
        self.pending
            .get(key)
            .is_some_and(|pending| pending.settled.is_none())
    }

    fn insert(&mut self, key: MediaKey) -> bool {
        let inserted = self.lookup.insert(key);
        if inserted {
            self.items.push(key);
        }
        inserted
    }

    fn delete(&mut self, key: &MediaKey) -> bool {
        let removed = self.lookup.remove(key);
        if removed {
            self.items.retain(|item| item != key);
        }
        removed
    }

    /// Optimistically adds `key`. Returns `None` when it is already a member.
    pub fn add(&mut self, key: MediaKey) -> Option<MutationTicket> {
        if !self.insert(key) {
            return None;
        }

        let ticket = MutationTicket {
            key,
            kind: MutationKind::Add,
            seq: self.next_seq(),
        };
        self.pending.insert(key, PendingMutation::new(ticket));
        Some(ticket)
    }

    /// Optimistically removes `key`. Returns `None` when it is not a member.
    pub fn remove(&mut self, key: MediaKey) -> Option<MutationTicket> {
        if !self.delete(&key) {
            return None;
        }

        let ticket = MutationTicket {
            key,
            kind: MutationKind::Remove,
            seq: self.next_seq(),
        };
        self.pending.insert(key, PendingMutation::new(ticket));
        Some(ticket)
    }

    /// Undoes an optimistic mutation, provided it is still the latest one for
    /// its key and no hydration has superseded it
    pub fn revert(&mut self, ticket: MutationTicket) -> bool {
        if self.pending.get(&ticket.key).map(|pending| pending.ticket) != Some(ticket) {
            return false;
        }
        self.pending.remove(&ticket.key);

        match ticket.kind {
            MutationKind::Add => self.delete(&ticket.key),
            MutationKind::Remove => self.insert(ticket.key),
        }
    }

    /// Records that the server write for `ticket` returned, successfully or
    /// not. Ignored when a newer mutation of the key replaced it.
    pub fn mark_settled(&mut self, ticket: MutationTicket) {
        let seq = self.next_seq();
        if let Some(pending) = self.pending.get_mut(&ticket.key) {
            if pending.ticket == ticket {
                pending.settled.get_or_insert(seq);
            }
        }
    }

    pub fn begin_hydration(&mut self) -> HydrationTicket {
        if self.status != SyncStatus::Loaded {
            self.status = SyncStatus::Loading;
        }
        HydrationTicket {
            seq: self.next_seq(),
        }
    }

    /// Replaces membership with the server list.
    ///
    /// Returns `false` without touching state when a newer hydration was
    /// already applied.
    pub fn hydrate(&mut self, ticket: HydrationTicket, list: &[WatchLaterEntry]) -> bool {
        if ticket.seq < self.applied_hydration {
            tracing::debug!(
                hydration = ticket.seq,
                applied = self.applied_hydration,
                "Rejecting out-of-date watch-later hydration"
            );
            return false;
        }
        self.applied_hydration = ticket.seq;

        let previous = std::mem::take(&mut self.lookup);
        self.items.clear();
        for entry in list {
            self.insert(entry.key());
        }

        self.pending.retain(|_, pending| !pending.covered_by(ticket.seq));
        let kept: Vec<MediaKey> = self.pending.keys().copied().collect();
        for key in &kept {
            if previous.contains(key) {
                self.insert(*key);
            } else {
                self.delete(key);
            }
        }

        if !kept.is_empty() {
            tracing::debug!(kept = kept.len(), "Kept optimistic watch-later changes");
        }

        self.status = SyncStatus::Loaded;
        true
    }

    /// Hydrates with a list that reflects every change made so far
    pub fn hydrate_from_list(&mut self, list: &[WatchLaterEntry]) {
        let settled = self.next_seq();
        for pending in self.pending.values_mut() {
            pending.settled.get_or_insert(settled);
        }
        let ticket = self.begin_hydration();
        self.hydrate(ticket, list);
    }

    /// Records a failed list request. Loaded membership is kept.
    pub fn fail_hydration(&mut self, ticket: HydrationTicket) {
        if ticket.seq >= self.applied_hydration {
            self.status = SyncStatus::Error;
        }
    }
}

/// Keeps a shared [`WatchLaterStore`] in sync with the server.
///
/// List refreshes retry transient failures; writes are attempted once. A
/// failed write is reported to the caller and is not reverted locally: the
/// refetch that follows every write brings the store back to server truth.
#[derive(Clone)]
pub struct WatchLaterSync {
    backend: Arc<dyn WatchLaterBackend>,
    store: Arc<RwLock<WatchLaterStore>>,
    retry: RetryPolicy,
    mutation_retry: RetryPolicy,
}

impl WatchLaterSync {
    pub fn new(backend: Arc<dyn WatchLaterBackend>) -> Self {
        Self {
            backend,
            store: Arc::new(RwLock::new(WatchLaterStore::new())),
            retry: RetryPolicy::standard(),
            mutation_retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shared handle to the store, for rendering surfaces
    pub fn store(&self) -> Arc<RwLock<WatchLaterStore>> {
        self.store.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, WatchLaterStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WatchLaterStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has(&self, key: MediaKey) -> bool {
        self.read().contains(&key)
    }

    pub fn items(&self) -> Vec<MediaKey> {
        self.read().items().to_vec()
    }

    pub fn status(&self) -> SyncStatus {
        self.read().status()
    }

    /// Fetches the server list and hydrates the store with it
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let ticket = self.write().begin_hydration();

        match self.retry.run(|| self.backend.list()).await {
            Ok(list) => {
                self.write().hydrate(ticket, &list);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Watch-later refresh failed");
                self.write().fail_hydration(ticket);
                Err(e)
            }
        }
    }

    /// Adds `key`. Returns `Ok(false)` without a server call when it is
    /// already a member.
    pub async fn add(&self, key: MediaKey) -> Result<bool, FetchError> {
        let ticket = self.write().add(key);
        match ticket {
            Some(ticket) => self.settle(ticket).await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Removes `key`. Returns `Ok(false)` without a server call when it is
    /// not a member.
    pub async fn remove(&self, key: MediaKey) -> Result<bool, FetchError> {
        let ticket = self.write().remove(key);
        match ticket {
            Some(ticket) => self.settle(ticket).await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Flips membership of `key` and returns the new (optimistic) membership
    pub async fn toggle(&self, key: MediaKey) -> Result<bool, FetchError> {
        let ticket = {
            let mut store = self.write();
            if store.contains(&key) {
                store.remove(key)
            } else {
                store.add(key)
            }
        };

        match ticket {
            Some(ticket) => {
                self.settle(ticket).await?;
                Ok(ticket.kind == MutationKind::Add)
            }
            None => Ok(self.has(key)),
        }
    }

    async fn settle(&self, ticket: MutationTicket) -> Result<(), FetchError> {
        let key = ticket.key;
        let result = self
            .mutation_retry
            .run(|| match ticket.kind {
                MutationKind::Add => self.backend.add(key),
                MutationKind::Remove => self.backend.remove(key),
            })
            .await;
        self.write().mark_settled(ticket);

        if let Err(e) = &result {
            tracing::warn!(
                media = %key,
                action = ?ticket.kind,
                error = %e,
                "Watch-later update failed"
            );
        }

        let refreshed = self.refresh().await;
        result?;
        refreshed
    }
}
