//! Index lifecycle orchestration.
//!
//! [`IndexLifecycle::reconcile`] brings the alias of one resource type to a
//! concrete index whose live mapping equals the projection of the current
//! schema:
//!
//! - no alias yet: create the index and point the alias at it
//! - alias with an equal mapping: nothing to do
//! - alias with a drifted mapping: try an additive mapping update, and when
//!   that does not converge, build a fresh index, reindex into it and swap
//!   the alias over
//!
//! Every decision is taken on state read from the cluster right before it is
//! needed. Nothing is cached between passes, so a failed pass can simply be
//! re-run once its cause is fixed.

mod events;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info};

use crate::error::{BootstrapError, Step};
use crate::gateway::{
    AliasAction, ClusterGateway, GatewayError, IndexPolicy, LiveMappings, ReindexSummary,
};
use crate::mapping::{compare, project, MappingComparison, MappingNode};
use crate::resource::{normalized_name, LogicalResource};
use crate::schema::SchemaDescriptor;
use crate::scripts::ScriptRepository;

pub use events::{EventKind, EventSink, LifecycleEvent, RecordingSink, TracingSink};

/// Budgets of the long running cluster operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub clone: Duration,
    pub freeze: Duration,
    pub unfreeze: Duration,
    pub reindex: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            clone: Duration::from_secs(10 * 60),
            freeze: Duration::from_secs(2 * 60),
            unfreeze: Duration::from_secs(60),
            reindex: Duration::from_secs(10 * 60),
        }
    }
}

/// Terminal state of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Index created and alias added
    Created,
    /// Live mapping already matched
    UpToDate,
    /// Additive mapping update converged
    MappingUpdated,
    /// Fresh index built, reindexed and swapped in
    Reindexed {
        previous_indices: Vec<String>,
        summary: ReindexSummary,
    },
    /// A swap left behind by an earlier pass was finished
    SwapCompleted { removed: Vec<String> },
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Created => write!(f, "created"),
            ReconcileOutcome::UpToDate => write!(f, "up to date"),
            ReconcileOutcome::MappingUpdated => write!(f, "mapping updated"),
            ReconcileOutcome::Reindexed {
                previous_indices,
                summary,
            } => write!(
                f,
                "reindexed {} documents from {:?}",
                summary.total, previous_indices
            ),
            ReconcileOutcome::SwapCompleted { removed } => {
                write!(f, "alias swap completed, removed {:?}", removed)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub alias: String,
    pub index: String,
    pub outcome: ReconcileOutcome,
}

/// State of one reconciliation pass. Built fresh for every pass.
struct Pass {
    resource: LogicalResource,
    index: String,
    mapping: MappingNode,
}

impl Pass {
    fn new(schema: &SchemaDescriptor) -> Self {
        let mapping = project(schema);
        let resource = LogicalResource::new(schema, &mapping);
        Self {
            index: resource.index_name(),
            resource,
            mapping,
        }
    }

    fn alias(&self) -> &str {
        &self.resource.alias
    }

    fn fail(&self, step: Step) -> impl FnOnce(GatewayError) -> BootstrapError + '_ {
        move |source| BootstrapError::Gateway {
            alias: self.resource.alias.clone(),
            index: self.index.clone(),
            step,
            source,
        }
    }

    fn event(&self, kind: EventKind) -> LifecycleEvent {
        LifecycleEvent::new(kind)
            .with("alias", &self.resource.alias)
            .with("index", &self.index)
    }

    /// Compare the projection against the live mapping of our index, or of
    /// whatever the alias points at when our index is not behind it.
    fn compare_live(&self, live: &LiveMappings) -> MappingComparison {
        let empty = MappingNode::default();
        let current = live
            .get(&self.index)
            .or_else(|| live.values().next())
            .unwrap_or(&empty);
        compare(current, &self.mapping)
    }
}

/// Drives reconciliation passes against a cluster.
pub struct IndexLifecycle<G, S> {
    gateway: G,
    scripts: S,
    sink: Arc<dyn EventSink>,
    policy: IndexPolicy,
    timeouts: OperationTimeouts,
}

impl<G, S> IndexLifecycle<G, S>
where
    G: ClusterGateway,
    S: ScriptRepository,
{
    /// Read cluster health once to fix the shard/replica policy.
    pub async fn connect(gateway: G, scripts: S) -> Result<Self, BootstrapError> {
        let health = gateway
            .cluster_health()
            .await
            .map_err(BootstrapError::ClusterHealth)?;
        let policy = IndexPolicy::from_health(&health);

        info!(
            "Cluster '{}' is {} with {} data nodes, creating indices with {} shards and {} replicas",
            health.cluster_name,
            health.status,
            health.number_of_data_nodes,
            policy.shards,
            policy.replicas
        );

        Ok(Self {
            gateway,
            scripts,
            sink: Arc::new(TracingSink),
            policy,
            timeouts: OperationTimeouts::default(),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn policy(&self) -> IndexPolicy {
        self.policy
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Reconcile every schema. Passes run concurrently and each one runs to
    /// its own end; the first failure is returned after all have finished.
    ///
    /// Schemas sharing an alias are refused before any pass starts.
    pub async fn bootstrap(
        &self,
        schemas: &[SchemaDescriptor],
    ) -> Result<Vec<ReconcileReport>, BootstrapError> {
        check_distinct_aliases(schemas)?;

        let results = join_all(schemas.iter().map(|schema| self.reconcile(schema))).await;

        let mut reports = Vec::with_capacity(results.len());
        let mut first_error = None;

        for result in results {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Bootstrap pass failed: {}", e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    /// Run one reconciliation pass for a schema.
    pub async fn reconcile(
        &self,
        schema: &SchemaDescriptor,
    ) -> Result<ReconcileReport, BootstrapError> {
        let pass = Pass::new(schema);
        self.sink.emit(
            pass.event(EventKind::PassStarted)
                .with("type", &pass.resource.type_name),
        );

        match self.drive(&pass).await {
            Ok(outcome) => {
                self.sink
                    .emit(pass.event(EventKind::PassCompleted).with("outcome", &outcome));
                Ok(ReconcileReport {
                    alias: pass.resource.alias.clone(),
                    index: pass.index.clone(),
                    outcome,
                })
            }
            Err(e) => {
                let step = e.step().map(|s| s.as_str()).unwrap_or("unknown");
                self.sink.emit(
                    pass.event(EventKind::PassFailed)
                        .with("step", step)
                        .with("error", &e),
                );
                Err(e)
            }
        }
    }

    async fn drive(&self, pass: &Pass) -> Result<ReconcileOutcome, BootstrapError> {
        let alias_exists = self
            .gateway
            .alias_exists(pass.alias())
            .await
            .map_err(pass.fail(Step::CheckAlias))?;

        if !alias_exists {
            return self.create(pass).await;
        }

        let live = self.live_mappings(pass).await?;
        let comparison = pass.compare_live(&live);

        if comparison.is_equal() {
            self.sink.emit(pass.event(EventKind::MappingsMatch));

            let leftovers: Vec<String> = live
                .keys()
                .filter(|name| **name != pass.index)
                .cloned()
                .collect();
            if live.contains_key(&pass.index) && !leftovers.is_empty() {
                return self.complete_swap(pass, leftovers).await;
            }
            return Ok(ReconcileOutcome::UpToDate);
        }

        self.emit_drift(pass, &comparison);

        if self.additive_update(pass).await? {
            return Ok(ReconcileOutcome::MappingUpdated);
        }

        self.full_reindex(pass).await
    }

    async fn create(&self, pass: &Pass) -> Result<ReconcileOutcome, BootstrapError> {
        self.gateway
            .create_index(&pass.index, &pass.mapping, self.policy)
            .await
            .map_err(pass.fail(Step::CreateIndex))?;
        self.sink.emit(pass.event(EventKind::IndexCreated));

        self.gateway
            .update_aliases(&[AliasAction::add(&pass.index, pass.alias())])
            .await
            .map_err(pass.fail(Step::AddAlias))?;
        self.sink
            .emit(pass.event(EventKind::AliasUpdated).with("action", "add"));

        Ok(ReconcileOutcome::Created)
    }

    async fn live_mappings(&self, pass: &Pass) -> Result<LiveMappings, BootstrapError> {
        self.gateway
            .get_mapping(pass.alias())
            .await
            .map_err(pass.fail(Step::ReadMapping))
    }

    fn emit_drift(&self, pass: &Pass, comparison: &MappingComparison) {
        let paths: Vec<String> = comparison
            .differences
            .iter()
            .map(ToString::to_string)
            .collect();
        self.sink.emit(
            pass.event(EventKind::MappingDrift)
                .with("differences", paths.join("; ")),
        );
    }

    /// The one locally recovered step: a rejected or non-converging update
    /// falls through to a full reindex.
    async fn additive_update(&self, pass: &Pass) -> Result<bool, BootstrapError> {
        if let Err(e) = self
            .gateway
            .put_mapping_additive(pass.alias(), &pass.mapping)
            .await
        {
            self.sink
                .emit(pass.event(EventKind::AdditiveUpdateFailed).with("error", e));
            return Ok(false);
        }

        let live = self.live_mappings(pass).await?;
        let comparison = pass.compare_live(&live);
        if comparison.is_equal() {
            self.sink.emit(pass.event(EventKind::MappingUpdated));
            Ok(true)
        } else {
            self.emit_drift(pass, &comparison);
            Ok(false)
        }
    }

    async fn full_reindex(&self, pass: &Pass) -> Result<ReconcileOutcome, BootstrapError> {
        let script = self
            .scripts
            .resolve(&pass.resource.script_key())
            .map_err(|source| BootstrapError::Script {
                alias: pass.resource.alias.clone(),
                index: pass.index.clone(),
                source,
            })?;

        let stale = self
            .gateway
            .index_exists(&pass.index)
            .await
            .map_err(pass.fail(Step::CheckStaleIndex))?;
        if stale {
            self.move_stale_aside(pass).await?;
        }

        self.gateway
            .create_index(&pass.index, &pass.mapping, self.policy)
            .await
            .map_err(pass.fail(Step::CreateIndex))?;
        self.sink.emit(pass.event(EventKind::IndexCreated));

        let summary = self
            .gateway
            .reindex(
                pass.alias(),
                &pass.index,
                script.as_deref(),
                self.timeouts.reindex,
            )
            .await
            .map_err(pass.fail(Step::Reindex))?;
        self.sink.emit(
            pass.event(EventKind::ReindexCompleted)
                .with("total", summary.total)
                .with("took_ms", summary.took)
                .with("scripted", script.is_some()),
        );

        let previous_indices = self.swap_alias(pass).await?;
        self.verify(pass).await?;

        Ok(ReconcileOutcome::Reindexed {
            previous_indices,
            summary,
        })
    }

    /// Free the index name held by a leftover index while keeping its
    /// documents readable through the alias via a temporary clone.
    ///
    /// Resumes from whatever an earlier failed pass left behind: a stale
    /// index the alias no longer serves is dropped outright, and a clone the
    /// alias already serves is reused.
    async fn move_stale_aside(&self, pass: &Pass) -> Result<(), BootstrapError> {
        let temp_index = pass.resource.temp_index_name();
        let fail = |step: Step| {
            let temp_index = temp_index.clone();
            move |source| BootstrapError::PrepareReindex {
                alias: pass.resource.alias.clone(),
                index: pass.index.clone(),
                temp_index,
                step,
                source,
            }
        };

        let members = self
            .gateway
            .get_indices_for_alias(pass.alias())
            .await
            .map_err(fail(Step::ReadAliasMembers))?;

        if !members.contains(&pass.index) {
            self.gateway
                .delete_index(&pass.index)
                .await
                .map_err(fail(Step::DeleteStale))?;
            self.sink.emit(pass.event(EventKind::StaleIndexDropped));
            return Ok(());
        }

        if !members.contains(&temp_index) {
            self.gateway
                .freeze_index(&pass.index, self.timeouts.freeze)
                .await
                .map_err(fail(Step::FreezeStale))?;

            if let Err((step, source)) = self.clone_stale(pass, &temp_index).await {
                if let Err(e) = self
                    .gateway
                    .unfreeze_index(&pass.index, self.timeouts.unfreeze)
                    .await
                {
                    self.sink
                        .emit(pass.event(EventKind::UnfreezeFailed).with("error", e));
                }
                return Err(fail(step)(source));
            }

            self.gateway
                .update_aliases(&[AliasAction::add(&temp_index, pass.alias())])
                .await
                .map_err(fail(Step::PointAliasAtTemp))?;
        }

        self.gateway
            .update_aliases(&[AliasAction::remove(
                vec![pass.index.clone()],
                pass.alias(),
            )])
            .await
            .map_err(fail(Step::UnpointAliasFromStale))?;

        self.gateway
            .delete_index(&pass.index)
            .await
            .map_err(fail(Step::DeleteStale))?;

        self.sink.emit(
            pass.event(EventKind::StaleIndexMovedAside)
                .with("temp_index", &temp_index),
        );
        Ok(())
    }

    /// Clone the frozen stale index into `temp_index`, first dropping an
    /// unaliased clone an earlier reindex left under that name.
    async fn clone_stale(
        &self,
        pass: &Pass,
        temp_index: &str,
    ) -> Result<(), (Step, GatewayError)> {
        let leftover = self
            .gateway
            .index_exists(temp_index)
            .await
            .map_err(|e| (Step::DropLeftoverTemp, e))?;
        if leftover {
            self.gateway
                .delete_index(temp_index)
                .await
                .map_err(|e| (Step::DropLeftoverTemp, e))?;
            self.sink.emit(
                pass.event(EventKind::LeftoverTempDropped)
                    .with("temp_index", temp_index),
            );
        }

        self.gateway
            .clone_index(&pass.index, temp_index, self.timeouts.clone)
            .await
            .map_err(|e| (Step::CloneStale, e))
    }

    /// Add the new index to the alias, then drop the previous ones. Two
    /// separate calls: when only the first lands, the alias serves both until
    /// the next pass finishes the swap.
    async fn swap_alias(&self, pass: &Pass) -> Result<Vec<String>, BootstrapError> {
        let previous: Vec<String> = self
            .gateway
            .get_indices_for_alias(pass.alias())
            .await
            .map_err(pass.fail(Step::ReadAliasMembers))?
            .into_iter()
            .filter(|name| *name != pass.index)
            .collect();

        self.gateway
            .update_aliases(&[AliasAction::add(&pass.index, pass.alias())])
            .await
            .map_err(pass.fail(Step::SwapAdd))?;
        self.sink
            .emit(pass.event(EventKind::AliasUpdated).with("action", "add"));

        if !previous.is_empty() {
            if let Err(source) = self
                .gateway
                .update_aliases(&[AliasAction::remove(previous.clone(), pass.alias())])
                .await
            {
                self.sink.emit(
                    pass.event(EventKind::AliasSwapIncomplete)
                        .with("stale", previous.join(",")),
                );
                return Err(BootstrapError::AliasSwapIncomplete {
                    alias: pass.resource.alias.clone(),
                    index: pass.index.clone(),
                    stale_indices: previous,
                    source,
                });
            }
        }

        self.sink.emit(
            pass.event(EventKind::AliasSwapped)
                .with("previous", previous.join(",")),
        );
        Ok(previous)
    }

    async fn complete_swap(
        &self,
        pass: &Pass,
        leftovers: Vec<String>,
    ) -> Result<ReconcileOutcome, BootstrapError> {
        self.gateway
            .update_aliases(&[AliasAction::remove(leftovers.clone(), pass.alias())])
            .await
            .map_err(|source| BootstrapError::AliasSwapIncomplete {
                alias: pass.resource.alias.clone(),
                index: pass.index.clone(),
                stale_indices: leftovers.clone(),
                source,
            })?;
        self.sink.emit(
            pass.event(EventKind::AliasRepaired)
                .with("removed", leftovers.join(",")),
        );

        self.verify(pass).await?;
        Ok(ReconcileOutcome::SwapCompleted { removed: leftovers })
    }

    async fn verify(&self, pass: &Pass) -> Result<(), BootstrapError> {
        let live = self.live_mappings(pass).await?;
        let comparison = pass.compare_live(&live);

        if comparison.is_equal() {
            Ok(())
        } else {
            Err(BootstrapError::MappingsDiverged {
                alias: pass.resource.alias.clone(),
                index: pass.index.clone(),
                differences: comparison.differences,
            })
        }
    }
}

/// Every pass owns its alias and index names exclusively.
fn check_distinct_aliases(schemas: &[SchemaDescriptor]) -> Result<(), BootstrapError> {
    let mut by_alias: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for schema in schemas {
        by_alias
            .entry(normalized_name(schema.simple_name()))
            .or_default()
            .push(schema.name.clone());
    }

    match by_alias.into_iter().find(|(_, names)| names.len() > 1) {
        Some((alias, type_names)) => Err(BootstrapError::DuplicateAlias { alias, type_names }),
        None => Ok(()),
    }
}
