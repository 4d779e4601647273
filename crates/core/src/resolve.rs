// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency resolution
//!
//! Turns a flat step list into ordered stages of parallel groups. Stage
//! order is explicit input, so a dependency that does not point into a
//! strictly earlier stage is rejected outright; no general cycle search is
//! needed.
//!
//! The output is deterministic: stages ascend by index, groups keep the
//! order of their first member in the input, and members keep input order.
//! Resume relies on this to find the same stage boundaries twice.

use crate::definition::{ParallelGroupSpec, StepSpec, SyncPolicy};
use crate::error::ResolutionError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Steps that run together under one sync policy
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedGroup {
    pub id: String,
    pub name: String,
    pub policy: SyncPolicy,
    pub timeout: Option<Duration>,
    pub steps: Vec<StepSpec>,
    /// True for the singleton group wrapping an ungrouped step
    pub implicit: bool,
}

impl PlannedGroup {
    fn singleton(step: &StepSpec) -> Self {
        Self {
            id: step.id.clone(),
            name: step.name.clone(),
            policy: SyncPolicy::WaitAll,
            timeout: None,
            steps: vec![step.clone()],
            implicit: true,
        }
    }

    fn declared(spec: &ParallelGroupSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            policy: spec.sync_policy,
            timeout: spec.timeout,
            steps: Vec::new(),
            implicit: false,
        }
    }
}

/// One sequential layer of the execution plan
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// The stage key shared by every step in it
    pub index: u32,
    pub groups: Vec<PlannedGroup>,
}

impl Stage {
    /// All steps in this stage, in plan order
    pub fn steps(&self) -> impl Iterator<Item = &StepSpec> {
        self.groups.iter().flat_map(|g| g.steps.iter())
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps().map(|s| s.id.as_str()).collect()
    }
}

/// Resolve steps and declared groups into ordered stages
pub fn resolve(
    steps: &[StepSpec],
    groups: &[ParallelGroupSpec],
) -> Result<Vec<Stage>, ResolutionError> {
    let declared: HashMap<&str, &ParallelGroupSpec> =
        groups.iter().map(|g| (g.id.as_str(), g)).collect();

    let mut stage_of: HashMap<&str, u32> = HashMap::new();
    for step in steps {
        if stage_of.insert(step.id.as_str(), step.stage).is_some() {
            return Err(ResolutionError::DuplicateStep {
                step: step.id.clone(),
            });
        }
    }

    // Every group reference resolves, and each group lives in exactly one stage
    let mut group_stage: HashMap<&str, u32> = HashMap::new();
    for step in steps {
        let Some(group_id) = step.parallel_group.as_deref() else {
            continue;
        };
        if !declared.contains_key(group_id) {
            return Err(ResolutionError::UnknownGroup {
                step: step.id.clone(),
                group: group_id.to_string(),
            });
        }
        match group_stage.get(group_id) {
            Some(&first) if first != step.stage => {
                return Err(ResolutionError::GroupSpansStages {
                    group: group_id.to_string(),
                    first: first.min(step.stage),
                    second: first.max(step.stage),
                });
            }
            Some(_) => {}
            None => {
                group_stage.insert(group_id, step.stage);
            }
        }
    }

    // Dependencies must point strictly backwards
    for step in steps {
        for dependency in &step.depends_on {
            let Some(&dep_stage) = stage_of.get(dependency.as_str()) else {
                return Err(ResolutionError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dependency.clone(),
                });
            };
            if dep_stage >= step.stage {
                return Err(ResolutionError::CyclicOrBackwardDependency {
                    step: step.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let mut stages: BTreeMap<u32, Vec<PlannedGroup>> = BTreeMap::new();
    let mut seen_groups: HashSet<&str> = HashSet::new();
    for step in steps {
        let planned = stages.entry(step.stage).or_default();
        match step.parallel_group.as_deref() {
            None => planned.push(PlannedGroup::singleton(step)),
            Some(group_id) => {
                if seen_groups.insert(group_id) {
                    if let Some(spec) = declared.get(group_id) {
                        planned.push(PlannedGroup::declared(spec));
                    }
                }
                if let Some(group) = planned.iter_mut().find(|g| !g.implicit && g.id == group_id) {
                    group.steps.push(step.clone());
                }
            }
        }
    }

    Ok(stages
        .into_iter()
        .map(|(index, groups)| Stage { index, groups })
        .collect())
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
