//! The observation store: sole owner of every observation in a session.
//!
//! State is an insertion-ordered map keyed by observation id. Every mutating
//! operation rewrites the whole document through the configured
//! [`StateStore`] before returning; a store built with
//! [`ObservationStore::in_memory`] skips persistence entirely.
//!
//! Mutations take `&mut self`, so a single store cannot be written from two
//! places at once. Reads hand out clones, never references into the map.

use std::sync::Arc;

use indexmap::IndexMap;
use observers_state::{StateStore, StorageError};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::DEFAULT_STATE_KEY;
use crate::domain::{NewObservation, Observation, ObservationError, Result, Status};
use crate::metrics::METRICS;
use crate::obs;
use crate::query::{count_by_severity, count_by_status, ListQuery, ListResult};

/// Persisted layout: `{"observations": {<id>: <observation>}}`.
#[derive(Serialize)]
struct StateDocumentRef<'a> {
    observations: &'a IndexMap<String, Observation>,
}

#[derive(Deserialize)]
struct StateDocument {
    #[serde(default)]
    observations: IndexMap<String, serde_json::Value>,
}

/// Observations created by one batch call, with per-batch tallies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchCreated {
    pub observations: Vec<Observation>,
    pub count: usize,
    pub by_severity: std::collections::BTreeMap<String, usize>,
    pub by_status: std::collections::BTreeMap<String, usize>,
}

pub struct ObservationStore {
    observations: IndexMap<String, Observation>,
    backend: Option<Arc<dyn StateStore>>,
    state_key: String,
    revision: u64,
}

impl ObservationStore {
    /// Empty store with no persistence.
    pub fn in_memory() -> Self {
        Self {
            observations: IndexMap::new(),
            backend: None,
            state_key: DEFAULT_STATE_KEY.to_string(),
            revision: 0,
        }
    }

    /// Load the document under `state_key` from `backend`.
    ///
    /// A missing or blank blob yields an empty store. A blob that does not
    /// parse, or any entry that does not decode, fails the load.
    pub async fn load(
        backend: Arc<dyn StateStore>,
        state_key: impl Into<String>,
    ) -> Result<Self> {
        let state_key = state_key.into();
        let observations = match backend.get(&state_key).await? {
            Some(blob) => decode_document(&state_key, &blob)?,
            None => IndexMap::new(),
        };
        obs::emit_state_loaded(&state_key, observations.len());

        Ok(Self {
            observations,
            backend: Some(backend),
            state_key,
            revision: 0,
        })
    }

    /// Load from `backend` when one is supplied, otherwise start in memory.
    pub async fn mount(
        backend: Option<Arc<dyn StateStore>>,
        state_key: impl Into<String>,
    ) -> Result<Self> {
        match backend {
            Some(backend) => Self::load(backend, state_key).await,
            None => Ok(Self::in_memory()),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_some()
    }

    /// Bumped on every in-memory change, whether or not the flush after it
    /// succeeded. Compare two readings to tell if a call touched the store.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Validate and insert one observation.
    #[instrument(skip(self, input), fields(state_key = %self.state_key))]
    pub async fn create(&mut self, input: NewObservation) -> Result<Observation> {
        let observation = Observation::create(input)?;
        self.insert(observation.clone());
        self.persist().await?;
        Ok(observation)
    }

    /// Create observations in order, flushing once.
    ///
    /// Not atomic: when element `i` fails, elements before it stay inserted
    /// (and are flushed) and the error names `observations[i]`.
    pub async fn create_batch(&mut self, batch: Vec<NewObservation>) -> Result<BatchCreated> {
        self.create_batch_from(batch.into_iter().map(Ok).collect()).await
    }

    /// Like [`create_batch`](Self::create_batch), for entries that were
    /// decoded one by one. An `Err` entry stops the batch exactly like an
    /// entry that fails validation.
    ///
    /// The element error is always the one returned. If flushing the
    /// inserted prefix fails as well, that failure is logged and counted,
    /// and the prefix stays in memory until the next successful flush.
    #[instrument(skip(self, entries), fields(state_key = %self.state_key, size = entries.len()))]
    pub async fn create_batch_from(
        &mut self,
        entries: Vec<Result<NewObservation>>,
    ) -> Result<BatchCreated> {
        let mut created = Vec::with_capacity(entries.len());

        for (index, entry) in entries.into_iter().enumerate() {
            match entry.and_then(Observation::create) {
                Ok(observation) => {
                    self.insert(observation.clone());
                    created.push(observation);
                }
                Err(e) => {
                    let flushed = created.is_empty() || self.persist().await.is_ok();
                    obs::emit_batch_aborted(&self.state_key, index, created.len(), flushed);
                    return Err(e.within(&format!("observations[{index}]")));
                }
            }
        }

        self.persist().await?;

        Ok(BatchCreated {
            count: created.len(),
            by_severity: count_by_severity(&created),
            by_status: count_by_status(&created),
            observations: created,
        })
    }

    /// Filtered, sorted, limited snapshot. `total` is the full store size.
    pub fn list(&self, query: &ListQuery) -> Result<ListResult> {
        query.run(self.observations.values(), self.observations.len())
    }

    pub fn get(&self, id: &str) -> Result<Observation> {
        self.observations.get(id).cloned().ok_or_else(|| not_found(id))
    }

    #[instrument(skip(self), fields(state_key = %self.state_key))]
    pub async fn acknowledge(&mut self, id: &str) -> Result<Observation> {
        let observation = self.observations.get_mut(id).ok_or_else(|| not_found(id))?;
        observation.acknowledge();
        let updated = observation.clone();
        self.revision += 1;

        obs::emit_observation_acknowledged(id);
        METRICS.inc_transitions();
        self.persist().await?;
        Ok(updated)
    }

    #[instrument(skip(self, note), fields(state_key = %self.state_key))]
    pub async fn resolve(&mut self, id: &str, note: Option<String>) -> Result<Observation> {
        let observation = self.observations.get_mut(id).ok_or_else(|| not_found(id))?;
        let has_note = note.is_some();
        observation.resolve(note);
        let updated = observation.clone();
        self.revision += 1;

        obs::emit_observation_resolved(id, has_note);
        METRICS.inc_transitions();
        self.persist().await?;
        Ok(updated)
    }

    /// Permanently drop every resolved observation. Returns how many went.
    #[instrument(skip(self), fields(state_key = %self.state_key))]
    pub async fn clear_resolved(&mut self) -> Result<usize> {
        let before = self.observations.len();
        self.observations.retain(|_, o| o.status() != Status::Resolved);
        let removed = before - self.observations.len();
        if removed > 0 {
            self.revision += 1;
        }

        obs::emit_resolved_cleared(removed, self.observations.len());
        METRICS.add_cleared(removed as u64);
        self.persist().await?;
        Ok(removed)
    }

    /// Serialize the full state document.
    pub fn to_document(&self) -> Result<String> {
        Ok(serde_json::to_string(&StateDocumentRef {
            observations: &self.observations,
        })?)
    }

    /// Write the current document to the backend. No-op without one.
    pub async fn flush(&self) -> Result<()> {
        self.persist().await
    }

    fn insert(&mut self, observation: Observation) {
        obs::emit_observation_created(
            observation.id(),
            observation.observer(),
            observation.severity().as_str(),
        );
        METRICS.inc_created();
        self.observations
            .insert(observation.id().to_string(), observation);
        self.revision += 1;
    }

    async fn persist(&self) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        let document = self.to_document()?;
        if let Err(e) = backend.set(&self.state_key, document).await {
            obs::emit_persist_failed(&self.state_key, &e);
            METRICS.inc_persist_failures();
            return Err(e.into());
        }
        Ok(())
    }
}

fn not_found(id: &str) -> ObservationError {
    ObservationError::NotFound { id: id.to_string() }
}

fn malformed(key: &str, reason: String) -> ObservationError {
    StorageError::Malformed {
        key: key.to_string(),
        reason,
    }
    .into()
}

fn decode_document(key: &str, blob: &str) -> Result<IndexMap<String, Observation>> {
    if blob.trim().is_empty() {
        return Ok(IndexMap::new());
    }

    let document: StateDocument =
        serde_json::from_str(blob).map_err(|e| malformed(key, e.to_string()))?;

    let mut observations = IndexMap::with_capacity(document.observations.len());
    for (id, value) in document.observations {
        let observation = Observation::from_dict(value)
            .map_err(|e| malformed(key, format!("entry {id}: {e}")))?;
        if observation.id() != id {
            return Err(malformed(
                key,
                format!("entry {id} carries id {}", observation.id()),
            ));
        }
        observations.insert(id, observation);
    }
    Ok(observations)
}
