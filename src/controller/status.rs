//! Status management utilities.
//!
//! [`StatusTracker`] is the worker's in-memory view of a cluster's status.
//! Conditions live in a small [`ConditionSet`] whose setters apply the
//! clear-on-entry rules: entering Ready clears Scaling and Upgrading, and
//! entering Scaling or Upgrading clears Ready.

use std::fmt;

use crate::crd::{ClusterPhase, Condition, ConditionType, ZookeeperClusterStatus};

/// Direction of a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDirection {
    Up,
    Down,
}

impl fmt::Display for ScalingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingDirection::Up => write!(f, "up"),
            ScalingDirection::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingCondition {
    pub direction: ScalingDirection,
    pub from_size: usize,
    pub to_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradingCondition {
    pub from_version: String,
    pub to_version: String,
}

/// Active conditions of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet {
    ready: bool,
    scaling: Option<ScalingCondition>,
    upgrading: Option<UpgradingCondition>,
}

impl ConditionSet {
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn scaling(&self) -> Option<&ScalingCondition> {
        self.scaling.as_ref()
    }

    pub fn upgrading(&self) -> Option<&UpgradingCondition> {
        self.upgrading.as_ref()
    }

    fn set_scaling(&mut self, direction: ScalingDirection, from_size: usize, to_size: usize) {
        self.ready = false;
        self.scaling = Some(ScalingCondition {
            direction,
            from_size,
            to_size,
        });
    }

    fn set_upgrading(&mut self, from_version: String, to_version: String) {
        self.ready = false;
        self.upgrading = Some(UpgradingCondition {
            from_version,
            to_version,
        });
    }

    fn set_ready(&mut self) {
        self.ready = true;
        self.scaling = None;
        self.upgrading = None;
    }
}

/// Worker-owned status of one cluster.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    phase: ClusterPhase,
    reason: Option<String>,
    size: usize,
    members: Vec<String>,
    current_version: Option<String>,
    target_version: Option<String>,
    observed_generation: Option<i64>,
    conditions: ConditionSet,
    /// Last rendered conditions, for stable transition times.
    rendered: Vec<Condition>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the tracker from a persisted status.
    pub fn from_status(status: &ZookeeperClusterStatus) -> Self {
        let mut conditions = ConditionSet {
            ready: is_condition_true(&status.conditions, ConditionType::Ready),
            ..Default::default()
        };
        if is_condition_true(&status.conditions, ConditionType::Scaling) {
            conditions.scaling = status
                .conditions
                .iter()
                .find(|c| c.r#type == ConditionType::Scaling.to_string())
                .and_then(|c| parse_scaling_message(&c.message));
        }
        if is_condition_true(&status.conditions, ConditionType::Upgrading) {
            conditions.upgrading = Some(UpgradingCondition {
                from_version: status.current_version.clone().unwrap_or_default(),
                to_version: status.target_version.clone().unwrap_or_default(),
            });
        }

        Self {
            phase: status.phase,
            reason: status.reason.clone(),
            size: usize::try_from(status.size).unwrap_or(0),
            members: status.members.clone(),
            current_version: status.current_version.clone(),
            target_version: status.target_version.clone(),
            observed_generation: status.observed_generation,
            conditions,
            rendered: status.conditions.clone(),
        }
    }

    pub fn phase(&self) -> ClusterPhase {
        self.phase
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn current_version(&self) -> Option<&str> {
        self.current_version.as_deref()
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    pub fn set_phase(&mut self, phase: ClusterPhase) {
        self.phase = phase;
        if phase != ClusterPhase::Failed {
            self.reason = None;
        }
    }

    /// Mark the cluster failed with a reason.
    pub fn set_failed(&mut self, reason: impl Into<String>) {
        self.phase = ClusterPhase::Failed;
        self.reason = Some(reason.into());
    }

    pub fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    pub fn set_members(&mut self, members: Vec<String>) {
        self.members = members;
    }

    pub fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.observed_generation = generation;
    }

    /// Record the version the ensemble runs.
    pub fn set_version(&mut self, version: &str) {
        self.current_version = Some(version.to_string());
    }

    pub fn set_scaling_up(&mut self, from: usize, to: usize) {
        self.conditions.set_scaling(ScalingDirection::Up, from, to);
    }

    pub fn set_scaling_down(&mut self, from: usize, to: usize) {
        self.conditions.set_scaling(ScalingDirection::Down, from, to);
    }

    pub fn clear_scaling(&mut self) {
        self.conditions.scaling = None;
    }

    /// Start upgrading from the current version to `version`.
    pub fn upgrade_version_to(&mut self, version: &str) {
        self.target_version = Some(version.to_string());
        let from = self.current_version.clone().unwrap_or_default();
        self.conditions.set_upgrading(from, version.to_string());
    }

    pub fn clear_upgrading(&mut self) {
        self.target_version = None;
        self.conditions.upgrading = None;
    }

    pub fn set_ready(&mut self) {
        self.target_version = None;
        self.conditions.set_ready();
    }

    /// Render the status subresource.
    ///
    /// A condition keeps its transition time while its status is unchanged.
    pub fn to_status(&mut self) -> ZookeeperClusterStatus {
        let scaling_message = self.conditions.scaling.as_ref().map(describe_scaling);
        let upgrading_message = self.conditions.upgrading.as_ref().map(|u| {
            format!(
                "Upgrading from {} to {}",
                u.from_version, u.to_version
            )
        });

        let desired = [
            (
                ConditionType::Ready,
                self.conditions.ready,
                if self.conditions.ready {
                    ("Converged", "Membership, configuration and version match the desired state".to_string())
                } else {
                    ("Reconciling", "Ensemble is converging toward the desired state".to_string())
                },
            ),
            (
                ConditionType::Scaling,
                scaling_message.is_some(),
                match scaling_message {
                    Some(message) => ("Resizing", message),
                    None => ("Idle", "No resize in progress".to_string()),
                },
            ),
            (
                ConditionType::Upgrading,
                upgrading_message.is_some(),
                match upgrading_message {
                    Some(message) => ("Upgrading", message),
                    None => ("Idle", "No upgrade in progress".to_string()),
                },
            ),
        ];

        let conditions: Vec<Condition> = desired
            .into_iter()
            .map(|(condition_type, status, (reason, message))| {
                let status_str = if status { "True" } else { "False" };
                match self
                    .rendered
                    .iter()
                    .find(|c| c.r#type == condition_type.to_string())
                {
                    Some(previous) if previous.status == status_str => Condition::at(
                        condition_type,
                        status,
                        reason,
                        &message,
                        previous.last_transition_time.clone(),
                    ),
                    _ => Condition::new(condition_type, status, reason, &message),
                }
            })
            .collect();
        self.rendered = conditions.clone();

        ZookeeperClusterStatus {
            phase: self.phase,
            reason: self.reason.clone(),
            size: i32::try_from(self.size).unwrap_or(i32::MAX),
            members: self.members.clone(),
            current_version: self.current_version.clone(),
            target_version: self.target_version.clone(),
            observed_generation: self.observed_generation,
            conditions,
        }
    }
}

fn describe_scaling(scaling: &ScalingCondition) -> String {
    format!(
        "Scaling {} from {} to {} members",
        scaling.direction, scaling.from_size, scaling.to_size
    )
}

/// Inverse of [`describe_scaling`].
fn parse_scaling_message(message: &str) -> Option<ScalingCondition> {
    let mut words = message.strip_prefix("Scaling ")?.split_whitespace();
    let direction = match words.next()? {
        "up" => ScalingDirection::Up,
        "down" => ScalingDirection::Down,
        _ => return None,
    };
    let (Some("from"), Some(from), Some("to"), Some(to)) =
        (words.next(), words.next(), words.next(), words.next())
    else {
        return None;
    };
    Some(ScalingCondition {
        direction,
        from_size: from.parse().ok()?,
        to_size: to.parse().ok()?,
    })
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: ConditionType) -> bool {
    let condition_type = condition_type.to_string();
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .is_some_and(|c| c.status == "True")
}

/// Get the reason for a condition
pub fn get_condition_reason(conditions: &[Condition], condition_type: ConditionType) -> Option<&str> {
    let condition_type = condition_type.to_string();
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .map(|c| c.reason.as_str())
}
