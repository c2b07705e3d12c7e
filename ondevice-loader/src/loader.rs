//! # Loading orchestrator
//!
//! Resolves a model identifier to a loaded service: registry lookup, candidate
//! discovery, policy ordering and sequential adapter attempts with fallback.
//!
//! Concurrent `load` calls for one identifier share a single in-flight load.
//! The loaded-model table and the in-flight table sit behind one mutex, so the
//! "cached? in flight? register" sequence is atomic as a whole. The mutex is
//! never held across a registry lookup, an adapter call or a service cleanup,
//! which keeps loads of different models independent.
//!
//! Each load runs in its own task and runs to completion even if every caller
//! stops awaiting it; waiters that went away simply miss the result.
//!
//! With a memory budget, an attempt reserves its estimate under the state
//! mutex before the adapter is invoked. The reservation is held until the
//! model is published or the attempt fails, so concurrent loads of different
//! models cannot overshoot the budget together.
//!
//! Shutdown releases waiters immediately. An adapter call already running is
//! left to finish, no further attempts are made, and a service it returns is
//! cleaned up rather than published.

use crate::adapter::Adapter;
use crate::directory::AdapterDirectory;
use crate::error::{AdapterError, LoadError};
use crate::policy::{self, SelectionPolicy};
use crate::registry::ModelRegistry;
use crate::types::{LoadPlan, LoadedModel, LoaderConfig, ModelDescriptor, PlannedAttempt};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

pub type LoadResult = Result<Arc<LoadedModel>, LoadError>;

/// A load in progress and everyone waiting for its outcome
struct InFlightLoad {
    load_id: Ulid,
    started_at: Instant,
    waiters: Vec<oneshot::Sender<LoadResult>>,
}

#[derive(Default)]
struct LoaderState {
    loaded: HashMap<String, Arc<LoadedModel>>,
    in_flight: HashMap<String, InFlightLoad>,
    /// Memory estimates of attempts that passed the budget check and are not
    /// published yet, keyed by model id
    reserved: HashMap<String, u64>,
}

impl LoaderState {
    fn loaded_bytes(&self) -> u64 {
        self.loaded
            .values()
            .map(|model| model.estimated_memory_bytes)
            .fold(0, u64::saturating_add)
    }

    fn committed_bytes(&self) -> u64 {
        self.reserved
            .values()
            .fold(self.loaded_bytes(), |total, bytes| total.saturating_add(*bytes))
    }
}

pub struct LoadingOrchestrator {
    registry: Arc<dyn ModelRegistry>,
    directory: Arc<AdapterDirectory>,
    policy: Arc<dyn SelectionPolicy>,
    config: LoaderConfig,
    state: Mutex<LoaderState>,
    shutdown_token: CancellationToken,
}

impl std::fmt::Debug for LoadingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingOrchestrator")
            .field("policy", &self.policy.name())
            .field("config", &self.config)
            .field("shut_down", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl LoadingOrchestrator {
    /// Create an orchestrator using the policy named in the configuration
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        directory: Arc<AdapterDirectory>,
        config: LoaderConfig,
    ) -> Result<Self, LoadError> {
        config.validate_budget()?;
        let policy = policy::from_config(&config.policy)?;
        Ok(Self::with_policy(registry, directory, policy, config))
    }

    /// Create an orchestrator with an explicit policy; `config.policy` is
    /// ignored.
    pub fn with_policy(
        registry: Arc<dyn ModelRegistry>,
        directory: Arc<AdapterDirectory>,
        policy: Arc<dyn SelectionPolicy>,
        config: LoaderConfig,
    ) -> Self {
        info!(
            "Loading orchestrator created with '{}' policy (memory budget: {:?})",
            policy.name(),
            config.memory_budget_bytes
        );
        Self {
            registry,
            directory,
            policy,
            config,
            state: Mutex::new(LoaderState::default()),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn directory(&self) -> &Arc<AdapterDirectory> {
        &self.directory
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load a model, reusing a loaded instance or an in-flight load for the
    /// same identifier. All callers sharing a load see the same outcome.
    pub async fn load(self: &Arc<Self>, model_id: &str) -> LoadResult {
        if self.shutdown_token.is_cancelled() {
            return Err(LoadError::OrchestratorUnavailable(
                "orchestrator has been shut down".to_string(),
            ));
        }

        let receiver = {
            let mut state = self.state.lock().await;

            if let Some(model) = state.loaded.get(model_id) {
                debug!("Model '{}' already loaded by '{}'", model_id, model.backend);
                return Ok(model.clone());
            }

            let (sender, receiver) = oneshot::channel();
            match state.in_flight.get_mut(model_id) {
                Some(in_flight) => {
                    in_flight.waiters.push(sender);
                    debug!(
                        "Joining in-flight load {} for '{}' ({} waiter(s), running {:?})",
                        in_flight.load_id,
                        model_id,
                        in_flight.waiters.len(),
                        in_flight.started_at.elapsed()
                    );
                }
                None => {
                    let load_id = Ulid::new();
                    state.in_flight.insert(
                        model_id.to_string(),
                        InFlightLoad {
                            load_id,
                            started_at: Instant::now(),
                            waiters: vec![sender],
                        },
                    );
                    debug!("Starting load {} for '{}'", load_id, model_id);
                    self.spawn_load(model_id.to_string());
                }
            }
            receiver
        };

        receiver.await.unwrap_or_else(|_| {
            Err(LoadError::OrchestratorUnavailable(format!(
                "load task for '{}' ended without reporting a result",
                model_id
            )))
        })
    }

    fn spawn_load(self: &Arc<Self>, model_id: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut resolver = {
                let this = Arc::clone(&this);
                let model_id = model_id.clone();
                tokio::spawn(async move { this.resolve(&model_id).await })
            };

            let joined = tokio::select! {
                biased;
                _ = this.shutdown_token.cancelled() => None,
                joined = &mut resolver => Some(joined),
            };

            let outcome = match joined {
                Some(Ok(result)) => result,
                Some(Err(err)) => {
                    error!("Load task for '{}' failed: {}", model_id, err);
                    let reason = if err.is_panic() { "panicked" } else { "was cancelled" };
                    Err(LoadError::OrchestratorUnavailable(format!(
                        "load task for '{}' {}",
                        model_id, reason
                    )))
                }
                None => {
                    this.release_after_shutdown(model_id.clone(), resolver);
                    Err(LoadError::OrchestratorUnavailable(format!(
                        "orchestrator shut down while loading '{}'",
                        model_id
                    )))
                }
            };
            this.complete_load(&model_id, outcome).await;
        });
    }

    /// Wait out an adapter call that was running at shutdown and clean up
    /// whatever service it produced.
    fn release_after_shutdown(
        self: &Arc<Self>,
        model_id: String,
        resolver: tokio::task::JoinHandle<LoadResult>,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let resolved = resolver.await;
            this.release_reservation(&model_id).await;
            if let Ok(Ok(model)) = resolved {
                debug!(
                    "Releasing '{}' from '{}', loaded after shutdown",
                    model_id, model.backend
                );
                model.service.cleanup().await;
            }
        });
    }

    /// Remove the in-flight entry, publish a success, then deliver the
    /// outcome to every waiter.
    async fn complete_load(&self, model_id: &str, outcome: LoadResult) {
        let (waiters, outcome, orphaned) = {
            let mut state = self.state.lock().await;
            state.reserved.remove(model_id);
            let waiters = state
                .in_flight
                .remove(model_id)
                .map(|in_flight| in_flight.waiters)
                .unwrap_or_default();

            match outcome {
                Ok(model) if self.shutdown_token.is_cancelled() => {
                    let err = LoadError::OrchestratorUnavailable(format!(
                        "orchestrator shut down while loading '{}'",
                        model_id
                    ));
                    (waiters, Err(err), Some(model))
                }
                Ok(model) => {
                    state.loaded.insert(model_id.to_string(), model.clone());
                    (waiters, Ok(model), None)
                }
                Err(err) => (waiters, Err(err), None),
            }
        };

        if let Some(model) = orphaned {
            model.service.cleanup().await;
        }

        match &outcome {
            Ok(model) => info!(
                "Model '{}' ready on '{}', delivering to {} waiter(s)",
                model_id,
                model.backend,
                waiters.len()
            ),
            Err(err) => warn!(
                "Load of '{}' failed, delivering error to {} waiter(s): {}",
                model_id,
                waiters.len(),
                err
            ),
        }

        let mut dropped = 0;
        for waiter in waiters {
            if waiter.send(outcome.clone()).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(
                "{} waiter(s) for '{}' stopped waiting before the load finished",
                dropped, model_id
            );
        }
    }

    async fn resolve(&self, model_id: &str) -> LoadResult {
        let (descriptor, ordered) = self.attempt_order(model_id).await?;

        // Another completion may have published this model while metadata
        // was being resolved
        if let Some(model) = self.state.lock().await.loaded.get(model_id) {
            debug!("Model '{}' was loaded while resolving metadata", model_id);
            return Ok(model.clone());
        }

        self.try_adapters(descriptor, ordered).await
    }

    /// Describe the attempts a load would make, without invoking any adapter
    pub async fn plan(&self, model_id: &str) -> Result<LoadPlan, LoadError> {
        let (descriptor, ordered) = self.attempt_order(model_id).await?;
        let attempts = ordered
            .iter()
            .map(|adapter| PlannedAttempt {
                backend: adapter.id().clone(),
                estimated_memory_bytes: adapter.estimate_memory_usage(&descriptor),
            })
            .collect();

        Ok(LoadPlan {
            model: descriptor,
            policy: self.policy.name().to_string(),
            attempts,
        })
    }

    /// Registry lookup, download check, candidate discovery and policy order
    async fn attempt_order(
        &self,
        model_id: &str,
    ) -> Result<(ModelDescriptor, Vec<Arc<dyn Adapter>>), LoadError> {
        let descriptor = self
            .registry
            .lookup(model_id)
            .await
            .map_err(LoadError::from)?
            .ok_or_else(|| LoadError::ModelNotFound(model_id.to_string()))?;

        if descriptor.local_path.is_none() {
            return Err(LoadError::ModelNotDownloaded(model_id.to_string()));
        }

        let modality = descriptor.modality;
        let candidates = self.directory.find_candidates(&descriptor, modality).await;
        if candidates.is_empty() {
            warn!(
                "No adapter can serve '{}' ({}, {})",
                model_id, modality, descriptor.format
            );
            return Err(LoadError::NoAdapterAvailable {
                model_id: model_id.to_string(),
                modality,
                requested_backend: descriptor.preferred_backend.clone(),
            });
        }

        let ordered = self.policy.order(candidates, &descriptor);
        debug!(
            "Attempt order for '{}' ({} policy): {:?}",
            model_id,
            self.policy.name(),
            ordered.iter().map(|a| a.id().as_str()).collect::<Vec<_>>()
        );

        Ok((descriptor, ordered))
    }

    async fn try_adapters(
        &self,
        descriptor: ModelDescriptor,
        ordered: Vec<Arc<dyn Adapter>>,
    ) -> LoadResult {
        let modality = descriptor.modality;
        let total = ordered.len();
        let mut attempts = 0;
        let mut last_error = None;

        for adapter in ordered {
            if self.shutdown_token.is_cancelled() {
                return Err(LoadError::OrchestratorUnavailable(format!(
                    "orchestrator shut down while loading '{}'",
                    descriptor.id
                )));
            }

            attempts += 1;
            let backend = adapter.id().clone();
            let estimated_memory_bytes = adapter.estimate_memory_usage(&descriptor);

            if let Err(err) = self.reserve(&descriptor.id, estimated_memory_bytes).await {
                warn!(
                    "Skipping '{}' for '{}' (attempt {}/{}): {}",
                    backend, descriptor.id, attempts, total, err
                );
                last_error = Some(err);
                continue;
            }

            info!(
                "Loading '{}' with '{}' (attempt {}/{})",
                descriptor.id, backend, attempts, total
            );
            let start_time = Instant::now();

            match adapter.load_model(&descriptor, modality).await {
                Ok(service) if service.modality() != modality => {
                    error!(
                        "Adapter '{}' returned a {} service for '{}', expected {}",
                        backend,
                        service.modality(),
                        descriptor.id,
                        modality
                    );
                    let actual = service.modality();
                    service.cleanup().await;
                    self.release_reservation(&descriptor.id).await;
                    return Err(LoadError::InvalidServiceType {
                        backend,
                        expected: modality,
                        actual,
                    });
                }
                Ok(service) => {
                    let load_time = start_time.elapsed();
                    info!(
                        "Loaded '{}' with '{}' in {:?} (estimated {} bytes)",
                        descriptor.id, backend, load_time, estimated_memory_bytes
                    );
                    return Ok(Arc::new(LoadedModel {
                        instance_id: Ulid::new(),
                        descriptor,
                        backend,
                        estimated_memory_bytes,
                        attempts,
                        load_time,
                        service,
                    }));
                }
                Err(err) => {
                    warn!(
                        "Adapter '{}' failed to load '{}' (attempt {}/{}): {}",
                        backend, descriptor.id, attempts, total, err
                    );
                    self.release_reservation(&descriptor.id).await;
                    last_error = Some(err);
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| {
            AdapterError::Unsupported(format!("no adapter attempted '{}'", descriptor.id))
        });
        Err(LoadError::AllAdaptersFailed {
            model_id: descriptor.id,
            attempts,
            last_error,
        })
    }

    /// Check the budget and reserve `estimated_memory_bytes` for `model_id`
    /// in one step. Without a budget nothing is reserved.
    async fn reserve(
        &self,
        model_id: &str,
        estimated_memory_bytes: u64,
    ) -> Result<(), AdapterError> {
        let Some(budget_bytes) = self.config.memory_budget_bytes else {
            return Ok(());
        };

        let mut state = self.state.lock().await;
        let required_bytes = state
            .committed_bytes()
            .saturating_add(estimated_memory_bytes);
        if required_bytes > budget_bytes {
            return Err(AdapterError::InsufficientMemory {
                required_bytes,
                budget_bytes,
            });
        }
        state
            .reserved
            .insert(model_id.to_string(), estimated_memory_bytes);
        Ok(())
    }

    async fn release_reservation(&self, model_id: &str) {
        self.state.lock().await.reserved.remove(model_id);
    }

    /// Unload a model, returning whether it was loaded. Loads in flight for
    /// the same identifier are not cancelled.
    pub async fn unload(&self, model_id: &str) -> bool {
        let model = self.state.lock().await.loaded.remove(model_id);

        match model {
            Some(model) => {
                model.service.cleanup().await;
                info!("Unloaded '{}' from '{}'", model_id, model.backend);
                true
            }
            None => {
                debug!("Unload of '{}' ignored, model not loaded", model_id);
                false
            }
        }
    }

    /// Unload every loaded model, returning how many were released
    pub async fn unload_all(&self) -> usize {
        let models: Vec<Arc<LoadedModel>> = {
            let mut state = self.state.lock().await;
            state.loaded.drain().map(|(_, model)| model).collect()
        };

        join_all(models.iter().map(|model| model.service.cleanup())).await;
        if !models.is_empty() {
            info!("Unloaded {} model(s)", models.len());
        }
        models.len()
    }

    /// Tear the orchestrator down: pending and future loads fail with
    /// `OrchestratorUnavailable` and every loaded model is released.
    pub async fn shutdown(&self) {
        info!("Shutting down loading orchestrator");
        self.shutdown_token.cancel();
        self.unload_all().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub async fn is_loaded(&self, model_id: &str) -> bool {
        self.state.lock().await.loaded.contains_key(model_id)
    }

    pub async fn get_loaded(&self, model_id: &str) -> Option<Arc<LoadedModel>> {
        self.state.lock().await.loaded.get(model_id).cloned()
    }

    /// Loaded models sorted by identifier
    pub async fn all_loaded(&self) -> Vec<Arc<LoadedModel>> {
        let mut models: Vec<Arc<LoadedModel>> =
            self.state.lock().await.loaded.values().cloned().collect();
        models.sort_by(|a, b| a.id().cmp(b.id()));
        models
    }

    pub async fn is_loading(&self, model_id: &str) -> bool {
        self.state.lock().await.in_flight.contains_key(model_id)
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Sum of the memory estimates of all loaded models
    pub async fn memory_in_use(&self) -> u64 {
        self.state.lock().await.loaded_bytes()
    }
}
