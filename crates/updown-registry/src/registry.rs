//! The registry facade: strategy composition and lifecycle.
//!
//! Strategy lookups are lock-free reads against an immutable snapshot
//! map; every mutation builds the new instance, persists it through
//! the [`StrategyStore`], and only then swaps the snapshot. Partial
//! state is never persisted or published.

use crate::catalog::Catalog;
use crate::component::{ComponentMetadata, ComponentModel, ComponentVersion, EvalContext, Evaluator};
use crate::error::{RegistryError, RegistryResult};
use crate::merge::deep_merge;
use crate::pipeline::{run_pipeline, StrategyDecision};
use crate::version::parse_version_id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use updown_core::{ComponentSlots, ComponentType, ErrorCode, StrategyInstance};
use uuid::Uuid;

/// Durable backing for strategy instances.
#[async_trait]
pub trait StrategyStore: Send + Sync {
    async fn upsert(&self, instance: &StrategyInstance) -> RegistryResult<()>;
    async fn load_all(&self) -> RegistryResult<Vec<StrategyInstance>>;
}

/// One step of a lineage walk.
#[derive(Debug, Clone, PartialEq)]
pub struct LineageEntry {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub depth: usize,
}

/// Per-slot diff result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDiff {
    pub matches: bool,
    /// Populated only when the slots differ.
    pub a: Option<String>,
    pub b: Option<String>,
}

/// Top-level config key diff.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigDiff {
    pub added: BTreeMap<String, Value>,
    pub removed: BTreeMap<String, Value>,
    pub changed: BTreeMap<String, (Value, Value)>,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Result of `diff_strategies`.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDiff {
    pub components: BTreeMap<ComponentType, SlotDiff>,
    pub config: ConfigDiff,
    pub same_base: bool,
}

/// Result of `batch_upgrade_component`.
#[derive(Debug, Clone)]
pub struct BatchUpgradeReport {
    pub total: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub upgraded: Vec<Uuid>,
    pub failures: Vec<(Uuid, String)>,
}

/// Options for `batch_upgrade_component`.
#[derive(Debug, Clone)]
pub struct BatchUpgradeOptions {
    pub active_only: bool,
    /// Restrict to these strategies when set.
    pub strategy_ids: Option<Vec<Uuid>>,
}

impl Default for BatchUpgradeOptions {
    fn default() -> Self {
        Self {
            active_only: true,
            strategy_ids: None,
        }
    }
}

/// Fork modifications: any subset of slots plus a config overlay.
#[derive(Debug, Clone, Default)]
pub struct ForkSpec {
    pub components: HashMap<ComponentType, String>,
    pub config: Option<Value>,
}

type StrategyMap = HashMap<Uuid, Arc<StrategyInstance>>;

/// The component catalog plus the live strategy instances.
pub struct Registry {
    catalog: Catalog,
    strategies: RwLock<Arc<StrategyMap>>,
    store: Option<Arc<dyn StrategyStore>>,
}

impl Registry {
    pub fn new(store: Option<Arc<dyn StrategyStore>>) -> Self {
        Self {
            catalog: Catalog::new(),
            strategies: RwLock::new(Arc::new(HashMap::new())),
            store,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Load persisted strategies into the snapshot at init.
    pub async fn load_from_store(&self) -> RegistryResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let instances = store.load_all().await?;
        let count = instances.len();
        let mut map: StrategyMap = HashMap::with_capacity(count);
        for instance in instances {
            map.insert(instance.id, Arc::new(instance));
        }
        *self.strategies.write() = Arc::new(map);
        info!(count, "Strategies loaded from store");
        Ok(count)
    }

    /// Explicitly register a new component version.
    pub fn create_component_version(
        &self,
        metadata: ComponentMetadata,
        model: Arc<dyn ComponentModel>,
    ) -> RegistryResult<String> {
        let evaluator = Evaluator::for_type(metadata.ctype, model);
        let component = ComponentVersion::publish(metadata, evaluator)?;
        self.catalog.register(component)
    }

    /// Lock-free strategy lookup against the current snapshot.
    pub fn get_strategy(&self, id: Uuid) -> Option<Arc<StrategyInstance>> {
        self.strategies.read().get(&id).cloned()
    }

    /// All strategies in the current snapshot.
    pub fn list_strategies(&self, active_only: bool) -> Vec<Arc<StrategyInstance>> {
        let snapshot = self.strategies.read().clone();
        let mut out: Vec<Arc<StrategyInstance>> = snapshot
            .values()
            .filter(|s| !active_only || s.active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    /// Find an active strategy by name.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<StrategyInstance>> {
        self.strategies
            .read()
            .values()
            .find(|s| s.name == name && s.active)
            .cloned()
    }

    fn require(&self, id: Uuid) -> RegistryResult<Arc<StrategyInstance>> {
        self.get_strategy(id).ok_or_else(|| {
            RegistryError::new(
                ErrorCode::StrategyNotFound,
                format!("strategy {id} not found"),
            )
            .with_context(json!({ "strategy_id": id.to_string() }))
        })
    }

    /// Persist (when a store is attached), then swap the snapshot.
    async fn commit(&self, instance: StrategyInstance) -> RegistryResult<()> {
        if let Some(store) = &self.store {
            store.upsert(&instance).await?;
        }
        let mut guard = self.strategies.write();
        let mut next = (**guard).clone();
        next.insert(instance.id, Arc::new(instance));
        *guard = Arc::new(next);
        Ok(())
    }

    /// Resolve each slot's component, verifying existence and type.
    fn resolve_components(
        &self,
        slots: &ComponentSlots,
    ) -> RegistryResult<Vec<(ComponentType, Arc<ComponentVersion>)>> {
        let snapshot = self.catalog.snapshot();
        let mut resolved = Vec::with_capacity(4);
        for (ctype, version_id) in slots.iter() {
            let component = snapshot.get(version_id).cloned().ok_or_else(|| {
                RegistryError::new(
                    ErrorCode::ComponentNotFound,
                    format!("{ctype} slot references unknown component '{version_id}'"),
                )
                .with_context(json!({ "slot": ctype.to_string(), "version_id": version_id }))
            })?;
            if component.metadata.ctype != ctype {
                return Err(RegistryError::new(
                    ErrorCode::ComponentTypeMismatch,
                    format!(
                        "{ctype} slot references '{version_id}' of type {}",
                        component.metadata.ctype
                    ),
                )
                .with_context(json!({ "slot": ctype.to_string(), "version_id": version_id })));
            }
            resolved.push((ctype, component));
        }
        Ok(resolved)
    }

    /// Validate a config against every resolved component.
    ///
    /// Reports the first offending slot with its error list.
    fn validate_config(
        &self,
        resolved: &[(ComponentType, Arc<ComponentVersion>)],
        config: &Value,
    ) -> RegistryResult<()> {
        for (ctype, component) in resolved {
            let validation = component.evaluator.model().validate_config(config);
            if !validation.valid {
                return Err(RegistryError::new(
                    ErrorCode::ConfigValidationFailed,
                    format!(
                        "config rejected by {ctype} component '{}'",
                        component.version_id
                    ),
                )
                .with_context(json!({
                    "slot": ctype.to_string(),
                    "version_id": component.version_id,
                    "errors": validation.errors,
                })));
            }
        }
        Ok(())
    }

    /// Compose a new strategy. All four slots must resolve and the
    /// config must pass every component's validation.
    pub async fn create_strategy(
        &self,
        name: impl Into<String>,
        components: ComponentSlots,
        config: Value,
    ) -> RegistryResult<Uuid> {
        let resolved = self.resolve_components(&components)?;
        self.validate_config(&resolved, &config)?;

        let instance = StrategyInstance::new(name.into(), components, config);
        let id = instance.id;
        self.commit(instance).await?;
        info!(strategy_id = %id, "Strategy created");
        Ok(id)
    }

    /// Run the evaluation pipeline for a strategy.
    pub fn execute_strategy(
        &self,
        strategy_id: Uuid,
        ctx: &EvalContext,
    ) -> RegistryResult<StrategyDecision> {
        let strategy = self.require(strategy_id)?;
        if !strategy.active {
            return Err(RegistryError::new(
                ErrorCode::StrategyInactive,
                format!("strategy {strategy_id} is inactive"),
            ));
        }
        let resolved = self.resolve_components(&strategy.components)?;
        run_pipeline(&resolved, ctx, &strategy.config)
    }

    /// Fork a strategy: components default to the parent's with any
    /// provided slot overriding; config is the deep merge of parent
    /// and provided config.
    pub async fn fork_strategy(
        &self,
        parent_id: Uuid,
        name: impl Into<String>,
        spec: ForkSpec,
    ) -> RegistryResult<Uuid> {
        let parent = self.get_strategy(parent_id).ok_or_else(|| {
            RegistryError::new(
                ErrorCode::ForkParentNotFound,
                format!("fork parent {parent_id} not found"),
            )
        })?;
        if !parent.active {
            return Err(RegistryError::new(
                ErrorCode::ForkParentInactive,
                format!("fork parent {parent_id} is inactive"),
            ));
        }

        let mut components = parent.components.clone();
        for (ctype, version_id) in &spec.components {
            components.set(*ctype, version_id.clone());
        }

        let config = match &spec.config {
            Some(overlay) => deep_merge(&parent.config, overlay),
            None => parent.config.clone(),
        };

        let resolved = self.resolve_components(&components)?;
        self.validate_config(&resolved, &config)?;

        let mut instance = StrategyInstance::new(name.into(), components, config);
        instance.base_strategy_id = Some(parent.id);
        let id = instance.id;
        self.commit(instance).await?;
        info!(strategy_id = %id, parent_id = %parent_id, "Strategy forked");
        Ok(id)
    }

    /// Walk `base_strategy_id` upward. Cycles terminate the walk
    /// without erroring; a missing ancestor ends it silently.
    pub fn get_strategy_lineage(&self, id: Uuid) -> RegistryResult<Vec<LineageEntry>> {
        let start = self.require(id)?;
        let snapshot = self.strategies.read().clone();

        let mut lineage = Vec::new();
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut cursor = Some(start);
        let mut depth = 0usize;

        while let Some(strategy) = cursor {
            if !visited.insert(strategy.id) {
                warn!(strategy_id = %strategy.id, "Lineage cycle detected, terminating walk");
                break;
            }
            lineage.push(LineageEntry {
                id: strategy.id,
                name: strategy.name.clone(),
                created_at: strategy.created_at,
                depth,
            });
            depth += 1;
            cursor = strategy
                .base_strategy_id
                .and_then(|parent| snapshot.get(&parent).cloned());
        }

        Ok(lineage)
    }

    /// Direct children of a strategy.
    pub fn get_strategy_forks(
        &self,
        parent_id: Uuid,
        active_only: bool,
    ) -> Vec<Arc<StrategyInstance>> {
        let snapshot = self.strategies.read().clone();
        let mut forks: Vec<Arc<StrategyInstance>> = snapshot
            .values()
            .filter(|s| s.base_strategy_id == Some(parent_id))
            .filter(|s| !active_only || s.active)
            .cloned()
            .collect();
        forks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        forks
    }

    /// Root ancestor of a strategy, following lineage with a cycle
    /// guard.
    fn root_ancestor(&self, id: Uuid) -> Uuid {
        let snapshot = self.strategies.read().clone();
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut current = id;
        while visited.insert(current) {
            match snapshot.get(&current).and_then(|s| s.base_strategy_id) {
                Some(parent) if snapshot.contains_key(&parent) => current = parent,
                _ => break,
            }
        }
        current
    }

    /// Structural diff between two strategies.
    pub fn diff_strategies(&self, a_id: Uuid, b_id: Uuid) -> RegistryResult<StrategyDiff> {
        let a = self.require(a_id)?;
        let b = self.require(b_id)?;

        let mut components = BTreeMap::new();
        for ctype in ComponentType::ALL {
            let slot_a = a.components.get(ctype);
            let slot_b = b.components.get(ctype);
            components.insert(
                ctype,
                if slot_a == slot_b {
                    SlotDiff {
                        matches: true,
                        a: None,
                        b: None,
                    }
                } else {
                    SlotDiff {
                        matches: false,
                        a: Some(slot_a.to_string()),
                        b: Some(slot_b.to_string()),
                    }
                },
            );
        }

        let config = diff_configs(&a.config, &b.config);
        let same_base = self.root_ancestor(a_id) == self.root_ancestor(b_id);

        Ok(StrategyDiff {
            components,
            config,
            same_base,
        })
    }

    fn validate_upgrade(
        &self,
        strategy: &StrategyInstance,
        slot: ComponentType,
        new_version_id: &str,
    ) -> RegistryResult<()> {
        if !strategy.active {
            return Err(RegistryError::new(
                ErrorCode::StrategyInactive,
                format!("strategy {} is inactive", strategy.id),
            ));
        }
        let component = self.catalog.get(new_version_id).ok_or_else(|| {
            RegistryError::new(
                ErrorCode::ComponentNotFound,
                format!("component '{new_version_id}' not found"),
            )
        })?;
        if component.metadata.ctype != slot {
            return Err(RegistryError::new(
                ErrorCode::ComponentTypeMismatch,
                format!(
                    "component '{new_version_id}' has type {}, expected {slot}",
                    component.metadata.ctype
                ),
            ));
        }
        let validation = component
            .evaluator
            .model()
            .validate_config(&strategy.config);
        if !validation.valid {
            return Err(RegistryError::new(
                ErrorCode::UpgradeValidationFailed,
                format!(
                    "strategy {} config is incompatible with '{new_version_id}'",
                    strategy.id
                ),
            )
            .with_context(json!({
                "strategy_id": strategy.id.to_string(),
                "slot": slot.to_string(),
                "errors": validation.errors,
            })));
        }
        Ok(())
    }

    /// Validate an upgrade without persisting anything.
    pub fn preview_component_upgrade(
        &self,
        strategy_id: Uuid,
        slot: ComponentType,
        new_version_id: &str,
    ) -> RegistryResult<()> {
        let strategy = self.require(strategy_id)?;
        self.validate_upgrade(&strategy, slot, new_version_id)
    }

    /// Rewrite one component slot atomically. Returns the previous
    /// version id.
    pub async fn upgrade_strategy_component(
        &self,
        strategy_id: Uuid,
        slot: ComponentType,
        new_version_id: &str,
    ) -> RegistryResult<String> {
        let strategy = self.require(strategy_id)?;
        self.validate_upgrade(&strategy, slot, new_version_id)?;

        let previous = strategy.components.get(slot).to_string();
        let mut updated = (*strategy).clone();
        updated.components.set(slot, new_version_id.to_string());
        self.commit(updated).await?;
        info!(
            strategy_id = %strategy_id,
            slot = %slot,
            from = %previous,
            to = %new_version_id,
            "Component upgraded"
        );
        Ok(previous)
    }

    /// Upgrade every strategy using `old_id` to `new_id`.
    ///
    /// The slot is derived from the prefix of `old_id`. Each strategy
    /// upgrades independently: a failure on one does not roll back the
    /// others.
    pub async fn batch_upgrade_component(
        &self,
        old_id: &str,
        new_id: &str,
        options: BatchUpgradeOptions,
    ) -> RegistryResult<BatchUpgradeReport> {
        let parsed = parse_version_id(old_id).ok_or_else(|| {
            RegistryError::new(
                ErrorCode::ComponentNotFound,
                format!("'{old_id}' is not a valid version id"),
            )
        })?;
        let slot = parsed.ctype;

        let candidates: Vec<Arc<StrategyInstance>> = self
            .list_strategies(options.active_only)
            .into_iter()
            .filter(|s| s.components.get(slot) == old_id)
            .filter(|s| match &options.strategy_ids {
                Some(ids) => ids.contains(&s.id),
                None => true,
            })
            .collect();

        let mut report = BatchUpgradeReport {
            total: candidates.len(),
            success_count: 0,
            fail_count: 0,
            upgraded: Vec::new(),
            failures: Vec::new(),
        };

        for strategy in candidates {
            match self
                .upgrade_strategy_component(strategy.id, slot, new_id)
                .await
            {
                Ok(_) => {
                    report.success_count += 1;
                    report.upgraded.push(strategy.id);
                }
                Err(e) => {
                    report.fail_count += 1;
                    report.failures.push((strategy.id, e.to_string()));
                }
            }
        }

        debug!(
            old_id,
            new_id,
            total = report.total,
            success = report.success_count,
            failed = report.fail_count,
            "Batch upgrade finished"
        );
        Ok(report)
    }

    /// Replace or merge a strategy's config. The result must validate
    /// against all four components before anything changes.
    pub async fn update_strategy_config(
        &self,
        strategy_id: Uuid,
        new_config: Value,
        merge: bool,
    ) -> RegistryResult<()> {
        let strategy = self.require(strategy_id)?;
        if !strategy.active {
            return Err(RegistryError::new(
                ErrorCode::StrategyInactive,
                format!("strategy {strategy_id} is inactive"),
            ));
        }

        let candidate = if merge {
            deep_merge(&strategy.config, &new_config)
        } else {
            new_config
        };

        let resolved = self.resolve_components(&strategy.components)?;
        self.validate_config(&resolved, &candidate)?;

        let mut updated = (*strategy).clone();
        updated.config = candidate;
        self.commit(updated).await?;
        Ok(())
    }

    /// Soft-delete a strategy.
    pub async fn deactivate_strategy(&self, strategy_id: Uuid) -> RegistryResult<()> {
        let strategy = self.require(strategy_id)?;
        if !strategy.active {
            return Ok(());
        }
        let mut updated = (*strategy).clone();
        updated.active = false;
        self.commit(updated).await?;
        info!(strategy_id = %strategy_id, "Strategy deactivated");
        Ok(())
    }

    /// Test/recovery hook: insert an instance into the snapshot
    /// without persisting. Used to rebuild state for cycle and orphan
    /// scenarios.
    pub fn insert_unchecked(&self, instance: StrategyInstance) {
        let mut guard = self.strategies.write();
        let mut next = (**guard).clone();
        next.insert(instance.id, Arc::new(instance));
        *guard = Arc::new(next);
    }
}

/// Top-level key diff between two configs.
fn diff_configs(a: &Value, b: &Value) -> ConfigDiff {
    let empty = serde_json::Map::new();
    let a_map = a.as_object().unwrap_or(&empty);
    let b_map = b.as_object().unwrap_or(&empty);

    let mut diff = ConfigDiff::default();
    for (key, b_val) in b_map {
        match a_map.get(key) {
            None => {
                diff.added.insert(key.clone(), b_val.clone());
            }
            Some(a_val) if a_val != b_val => {
                diff.changed
                    .insert(key.clone(), (a_val.clone(), b_val.clone()));
            }
            Some(_) => {}
        }
    }
    for (key, a_val) in a_map {
        if !b_map.contains_key(key) {
            diff.removed.insert(key.clone(), a_val.clone());
        }
    }
    diff
}
