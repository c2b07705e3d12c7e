use crate::types::{
    ComponentError, ComponentEvent, ComponentKind, ComponentParams, ComponentState,
    ComponentStatus, TrackerConfig,
};
use ondevice_loader::{LoadedModel, LoadingOrchestrator};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

struct ComponentEntry {
    status: ComponentStatus,
    /// Bumped by every initialize; a result is applied only if it still
    /// matches.
    generation: u64,
    model: Option<Arc<LoadedModel>>,
}

impl ComponentEntry {
    fn new(kind: ComponentKind) -> Self {
        Self {
            status: ComponentStatus::not_initialized(kind),
            generation: 0,
            model: None,
        }
    }
}

/// Tracks the lifecycle of each component kind and drives model loads
/// through the orchestrator.
pub struct ComponentTracker {
    orchestrator: Arc<LoadingOrchestrator>,
    components: Arc<RwLock<HashMap<ComponentKind, ComponentEntry>>>,
    events: broadcast::Sender<ComponentEvent>,
}

impl ComponentTracker {
    pub fn new(
        orchestrator: Arc<LoadingOrchestrator>,
        config: TrackerConfig,
    ) -> Result<Self, ComponentError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            orchestrator,
            components: Arc::new(RwLock::new(HashMap::new())),
            events,
        })
    }

    pub fn orchestrator(&self) -> &Arc<LoadingOrchestrator> {
        &self.orchestrator
    }

    /// Receive every lifecycle transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ComponentEvent> {
        self.events.subscribe()
    }

    /// Move `entry` to `to`, replacing error and model id in the same step
    fn apply(
        &self,
        entry: &mut ComponentEntry,
        to: ComponentState,
        error: Option<ComponentError>,
        model_id: Option<String>,
    ) {
        let from = entry.status.state;
        let now = SystemTime::now();
        entry.status.state = to;
        entry.status.error = error;
        entry.status.model_id = model_id.clone();
        entry.status.updated_at = now;

        info!("Component '{}': {} -> {}", entry.status.kind, from, to);

        // No subscribers is fine
        let _ = self.events.send(ComponentEvent {
            kind: entry.status.kind,
            from,
            to,
            model_id,
            at: now,
        });
    }

    /// Bind `kind` to the model in `params`, loading it if needed.
    ///
    /// On success the component is `Ready` and any previously bound model is
    /// unloaded. On failure it is `Failed` with the error recorded. Calling
    /// again after a failure is always allowed.
    pub async fn initialize(
        &self,
        kind: ComponentKind,
        params: ComponentParams,
    ) -> Result<Arc<LoadedModel>, ComponentError> {
        params.validate()?;

        let generation = {
            let mut components = self.components.write().await;
            let entry = components
                .entry(kind)
                .or_insert_with(|| ComponentEntry::new(kind));

            let from = entry.status.state;
            if !from.can_transition_to(ComponentState::Initializing) {
                warn!("Rejecting initialize of '{}' while {}", kind, from);
                return Err(ComponentError::InvalidTransition {
                    kind,
                    from,
                    to: ComponentState::Initializing,
                });
            }

            entry.generation += 1;
            self.apply(
                entry,
                ComponentState::Initializing,
                None,
                Some(params.model_id.clone()),
            );
            entry.generation
        };

        let expected = kind.modality();
        let outcome = self
            .orchestrator
            .load(&params.model_id)
            .await
            .map_err(ComponentError::from)
            .and_then(|model| {
                if model.modality() == expected {
                    Ok(model)
                } else {
                    Err(ComponentError::ModalityMismatch {
                        kind,
                        model_id: params.model_id.clone(),
                        expected,
                        actual: model.modality(),
                    })
                }
            });

        let (result, retired) = {
            let mut components = self.components.write().await;
            let Some(entry) = components.get_mut(&kind) else {
                return Err(ComponentError::Superseded(kind));
            };

            if entry.generation != generation {
                debug!(
                    "Discarding result of superseded initialize of '{}' ({})",
                    kind, params.model_id
                );
                drop(components);

                if let Ok(model) = outcome {
                    self.release(model).await;
                }
                return Err(ComponentError::Superseded(kind));
            }

            match outcome {
                Ok(model) => {
                    let previous = entry.model.replace(model.clone());
                    self.apply(
                        entry,
                        ComponentState::Ready,
                        None,
                        Some(params.model_id.clone()),
                    );
                    let retired = previous.filter(|prev| prev.id() != model.id());
                    (Ok(model), retired)
                }
                Err(err) => {
                    warn!("Component '{}' failed to initialize: {}", kind, err);
                    let previous = entry.model.take();
                    self.apply(
                        entry,
                        ComponentState::Failed,
                        Some(err.clone()),
                        Some(params.model_id.clone()),
                    );
                    let retired = previous.filter(|prev| prev.id() != params.model_id);
                    (Err(err), retired)
                }
            }
        };

        if let Some(model) = retired {
            debug!("Releasing '{}' previously bound to '{}'", model.id(), kind);
            self.release(model).await;
        }

        result
    }

    /// Unload `model` unless some component is bound to it or initializing
    /// with it.
    ///
    /// The check and the unload happen under the write lock, so an
    /// `initialize` of the same model either completes before the check and
    /// keeps the model, or starts after the unload and loads it afresh.
    async fn release(&self, model: Arc<LoadedModel>) {
        let components = self.components.write().await;
        let referenced = components.values().any(|entry| {
            entry
                .model
                .as_ref()
                .is_some_and(|bound| bound.id() == model.id())
                || (entry.status.state == ComponentState::Initializing
                    && entry.status.model_id.as_deref() == Some(model.id()))
        });

        if referenced {
            debug!("Keeping '{}', still referenced by a component", model.id());
            return;
        }
        self.orchestrator.unload(model.id()).await;
    }

    /// Release a component. `Ready` goes through `Cleaning` and unloads the
    /// bound model; `Failed` resets straight to `NotInitialized`.
    pub async fn cleanup(&self, kind: ComponentKind) -> Result<(), ComponentError> {
        let (model, cleaning) = {
            let mut components = self.components.write().await;
            let Some(entry) = components.get_mut(&kind) else {
                return Ok(());
            };

            match entry.status.state {
                ComponentState::NotInitialized => return Ok(()),
                ComponentState::Failed => {
                    let model = entry.model.take();
                    self.apply(entry, ComponentState::NotInitialized, None, None);
                    (model, false)
                }
                ComponentState::Ready => {
                    let model_id = entry.status.model_id.clone();
                    self.apply(entry, ComponentState::Cleaning, None, model_id);
                    (entry.model.take(), true)
                }
                from => {
                    return Err(ComponentError::InvalidTransition {
                        kind,
                        from,
                        to: ComponentState::Cleaning,
                    })
                }
            }
        };

        if let Some(model) = model {
            self.release(model).await;
        }

        if cleaning {
            let mut components = self.components.write().await;
            if let Some(entry) = components.get_mut(&kind) {
                self.apply(entry, ComponentState::NotInitialized, None, None);
            }
        }
        Ok(())
    }

    pub async fn status(&self, kind: ComponentKind) -> ComponentStatus {
        let components = self.components.read().await;
        components
            .get(&kind)
            .map(|entry| entry.status.clone())
            .unwrap_or_else(|| ComponentStatus::not_initialized(kind))
    }

    /// Statuses of every component that has been touched, sorted by kind
    pub async fn statuses(&self) -> Vec<ComponentStatus> {
        let components = self.components.read().await;
        let mut statuses: Vec<ComponentStatus> =
            components.values().map(|entry| entry.status.clone()).collect();
        statuses.sort_by_key(|status| status.kind);
        statuses
    }

    pub async fn is_ready(&self, kind: ComponentKind) -> bool {
        self.status(kind).await.is_ready()
    }

    /// True when every listed component is ready; vacuously true for none
    pub async fn are_all_ready(&self, kinds: &[ComponentKind]) -> bool {
        let components = self.components.read().await;
        kinds.iter().all(|kind| {
            components
                .get(kind)
                .is_some_and(|entry| entry.status.is_ready())
        })
    }

    /// Model currently bound to a ready component
    pub async fn bound_model(&self, kind: ComponentKind) -> Option<Arc<LoadedModel>> {
        let components = self.components.read().await;
        components.get(&kind).and_then(|entry| entry.model.clone())
    }
}
