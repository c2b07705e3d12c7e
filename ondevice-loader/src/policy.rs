//! # Selection policies
//!
//! A policy turns the directory's candidate list into attempt order: the first
//! adapter is the primary, the rest are fallbacks. Every policy only reorders,
//! it never drops or duplicates a candidate.

use crate::adapter::Adapter;
use crate::error::LoadError;
use crate::types::{BackendId, ModelDescriptor, PolicyConfig};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

pub trait SelectionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn order(
        &self,
        candidates: Vec<Arc<dyn Adapter>>,
        model: &ModelDescriptor,
    ) -> Vec<Arc<dyn Adapter>>;
}

/// Move the first adapter with `id` from `remaining` to the end of `ordered`
fn promote(
    remaining: &mut Vec<Arc<dyn Adapter>>,
    ordered: &mut Vec<Arc<dyn Adapter>>,
    id: &BackendId,
) {
    if let Some(index) = remaining.iter().position(|adapter| adapter.id() == id) {
        ordered.push(remaining.remove(index));
    }
}

/// Preferred backend first, then compatible backends in catalog order, then
/// everything else in directory order.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataPolicy;

impl SelectionPolicy for MetadataPolicy {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn order(
        &self,
        candidates: Vec<Arc<dyn Adapter>>,
        model: &ModelDescriptor,
    ) -> Vec<Arc<dyn Adapter>> {
        let mut remaining = candidates;
        let mut ordered = Vec::with_capacity(remaining.len());

        if let Some(preferred) = &model.preferred_backend {
            promote(&mut remaining, &mut ordered, preferred);
        }
        for compatible in &model.compatible_backends {
            promote(&mut remaining, &mut ordered, compatible);
        }

        ordered.extend(remaining);
        ordered
    }
}

/// Backends picked by matching the model identifier, e.g. `whisper` to a
/// speech backend. Unmatched candidates follow in metadata order.
#[derive(Debug, Clone)]
pub struct PatternPolicy {
    rules: Vec<(Regex, BackendId)>,
}

impl PatternPolicy {
    /// Build from `(pattern, backend)` pairs; patterns are case-insensitive
    pub fn new<I, P>(rules: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = (P, BackendId)>,
        P: AsRef<str>,
    {
        let rules = rules
            .into_iter()
            .map(|(pattern, backend)| {
                RegexBuilder::new(pattern.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map(|regex| (regex, backend))
                    .map_err(|e| {
                        LoadError::InvalidConfig(format!(
                            "Invalid pattern '{}': {}",
                            pattern.as_ref(),
                            e
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    /// Backends whose pattern matches the model id, in rule order
    pub fn matching_backends<'a>(
        &'a self,
        model_id: &'a str,
    ) -> impl Iterator<Item = &'a BackendId> {
        self.rules
            .iter()
            .filter(move |(regex, _)| regex.is_match(model_id))
            .map(|(_, backend)| backend)
    }
}

impl SelectionPolicy for PatternPolicy {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn order(
        &self,
        candidates: Vec<Arc<dyn Adapter>>,
        model: &ModelDescriptor,
    ) -> Vec<Arc<dyn Adapter>> {
        let mut remaining = candidates;
        let mut ordered = Vec::with_capacity(remaining.len());

        for backend in self.matching_backends(&model.id) {
            promote(&mut remaining, &mut ordered, backend);
        }

        ordered.extend(MetadataPolicy.order(remaining, model));
        ordered
    }
}

/// Always tries one named backend first, ignoring model metadata
#[derive(Debug, Clone)]
pub struct ForcedPolicy {
    backend: BackendId,
}

impl ForcedPolicy {
    pub fn new(backend: impl Into<BackendId>) -> Self {
        Self {
            backend: backend.into(),
        }
    }
}

impl SelectionPolicy for ForcedPolicy {
    fn name(&self) -> &'static str {
        "forced"
    }

    fn order(
        &self,
        candidates: Vec<Arc<dyn Adapter>>,
        _model: &ModelDescriptor,
    ) -> Vec<Arc<dyn Adapter>> {
        let mut remaining = candidates;
        let mut ordered = Vec::with_capacity(remaining.len());

        promote(&mut remaining, &mut ordered, &self.backend);
        ordered.extend(remaining);
        ordered
    }
}

/// Build the policy described by a configuration
pub fn from_config(config: &PolicyConfig) -> Result<Arc<dyn SelectionPolicy>, LoadError> {
    config.validate_backends()?;

    let policy: Arc<dyn SelectionPolicy> = match config {
        PolicyConfig::Metadata => Arc::new(MetadataPolicy),
        PolicyConfig::Pattern { rules } => Arc::new(PatternPolicy::new(
            rules
                .iter()
                .map(|rule| (rule.pattern.as_str(), rule.backend.clone())),
        )?),
        PolicyConfig::Forced { backend } => Arc::new(ForcedPolicy::new(backend.clone())),
    };
    Ok(policy)
}
