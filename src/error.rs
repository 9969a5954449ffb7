//! Fatal reconciliation errors.

use std::fmt;

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::mapping::MappingDifference;
use crate::scripts::ScriptError;

/// Step of a reconciliation pass, carried by errors and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    CheckAlias,
    CreateIndex,
    AddAlias,
    ReadMapping,
    CheckStaleIndex,
    FreezeStale,
    DropLeftoverTemp,
    CloneStale,
    PointAliasAtTemp,
    UnpointAliasFromStale,
    DeleteStale,
    ResolveScript,
    Reindex,
    ReadAliasMembers,
    SwapAdd,
    SwapRemove,
    Verify,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::CheckAlias => "check_alias",
            Step::CreateIndex => "create_index",
            Step::AddAlias => "add_alias",
            Step::ReadMapping => "read_mapping",
            Step::CheckStaleIndex => "check_stale_index",
            Step::FreezeStale => "freeze_stale",
            Step::DropLeftoverTemp => "drop_leftover_temp",
            Step::CloneStale => "clone_stale",
            Step::PointAliasAtTemp => "point_alias_at_temp",
            Step::UnpointAliasFromStale => "unpoint_alias_from_stale",
            Step::DeleteStale => "delete_stale",
            Step::ResolveScript => "resolve_script",
            Step::Reindex => "reindex",
            Step::ReadAliasMembers => "read_alias_members",
            Step::SwapAdd => "swap_add",
            Step::SwapRemove => "swap_remove",
            Step::Verify => "verify",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reconciliation pass that could not reach a consistent end state.
///
/// None of these are retried. The pass is safe to re-run once the cause is
/// understood, since every decision is re-derived from the cluster.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("cluster health unavailable: {0}")]
    ClusterHealth(#[source] GatewayError),

    #[error("alias '{alias}' would be shared by {type_names:?}")]
    DuplicateAlias {
        alias: String,
        type_names: Vec<String>,
    },

    #[error("{step} failed for alias '{alias}' (index '{index}'): {source}")]
    Gateway {
        alias: String,
        index: String,
        step: Step,
        #[source]
        source: GatewayError,
    },

    #[error(
        "could not move stale index '{index}' aside into '{temp_index}' for alias '{alias}' \
         at {step}: {source}"
    )]
    PrepareReindex {
        alias: String,
        index: String,
        temp_index: String,
        step: Step,
        #[source]
        source: GatewayError,
    },

    #[error(
        "alias '{alias}' now points at '{index}' but still also at {stale_indices:?}: {source}"
    )]
    AliasSwapIncomplete {
        alias: String,
        index: String,
        stale_indices: Vec<String>,
        #[source]
        source: GatewayError,
    },

    #[error("mappings behind alias '{alias}' (index '{index}') still differ after reindex: {}", format_differences(.differences))]
    MappingsDiverged {
        alias: String,
        index: String,
        differences: Vec<MappingDifference>,
    },

    #[error("transform script for alias '{alias}' (index '{index}'): {source}")]
    Script {
        alias: String,
        index: String,
        #[source]
        source: ScriptError,
    },
}

impl BootstrapError {
    pub fn step(&self) -> Option<Step> {
        match self {
            BootstrapError::Gateway { step, .. } | BootstrapError::PrepareReindex { step, .. } => {
                Some(*step)
            }
            BootstrapError::AliasSwapIncomplete { .. } => Some(Step::SwapRemove),
            BootstrapError::MappingsDiverged { .. } => Some(Step::Verify),
            BootstrapError::Script { .. } => Some(Step::ResolveScript),
            BootstrapError::ClusterHealth(_) | BootstrapError::DuplicateAlias { .. } => None,
        }
    }
}

fn format_differences(differences: &[MappingDifference]) -> String {
    differences
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
