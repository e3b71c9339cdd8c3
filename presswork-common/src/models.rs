//! Work order and reprint request models
//!
//! Wire format uses camelCase field names and lowercase enum values so the
//! same types serve the HTTP surface, the push channel and the terminals.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

// ========================================
// Departments
// ========================================

/// Production department
///
/// Declaration order is the shop's fixed linear sequence, so the derived
/// `Ord` sorts departments the way work flows through the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Department {
    Intake,
    Production,
    Printing,
    Finishing,
    Dispatch,
}

impl Department {
    /// The department sequence, first to last
    pub const SEQUENCE: [Department; 5] = [
        Department::Intake,
        Department::Production,
        Department::Printing,
        Department::Finishing,
        Department::Dispatch,
    ];

    /// Department where new activities land by default
    pub const fn first() -> Department {
        Department::Intake
    }

    /// Department that performs reprint work unless a request says otherwise
    pub const fn reprint_default() -> Department {
        Department::Printing
    }

    /// 0-based position in the sequence
    pub fn position(self) -> usize {
        match self {
            Department::Intake => 0,
            Department::Production => 1,
            Department::Printing => 2,
            Department::Finishing => 3,
            Department::Dispatch => 4,
        }
    }

    /// Following department, `None` at the end of the line
    pub fn next(self) -> Option<Department> {
        Self::SEQUENCE.get(self.position() + 1).copied()
    }

    /// Preceding department, `None` at the first department
    pub fn previous(self) -> Option<Department> {
        self.position()
            .checked_sub(1)
            .and_then(|i| Self::SEQUENCE.get(i).copied())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Department::Intake => "intake",
            Department::Production => "production",
            Department::Printing => "printing",
            Department::Finishing => "finishing",
            Department::Dispatch => "dispatch",
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Department {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Department::SEQUENCE
            .iter()
            .copied()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("Unknown department: {}", s)))
    }
}

// ========================================
// Activities
// ========================================

/// Activity status within its current department
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    /// Waiting for work in the current department
    Pending,
    /// Current department finished its work
    Completed,
    /// Sent back by a downstream department (legacy records only; returns
    /// performed by the workflow engine re-open the activity as pending)
    Returned,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Pending => "pending",
            ActivityStatus::Completed => "completed",
            ActivityStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActivityStatus::Pending),
            "completed" => Ok(ActivityStatus::Completed),
            "returned" => Ok(ActivityStatus::Returned),
            other => Err(Error::Validation(format!("Unknown activity status: {}", other))),
        }
    }
}

/// Kind of transition recorded in an activity's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionAction {
    Complete,
    Return,
    Advance,
}

impl TransitionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionAction::Complete => "complete",
            TransitionAction::Return => "return",
            TransitionAction::Advance => "advance",
        }
    }
}

impl std::fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(TransitionAction::Complete),
            "return" => Ok(TransitionAction::Return),
            "advance" => Ok(TransitionAction::Advance),
            other => Err(Error::Validation(format!("Unknown transition action: {}", other))),
        }
    }
}

/// One committed transition in an activity's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub from_department: Department,
    pub to_department: Department,
    pub action: TransitionAction,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A print-shop work order moving through the departments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub current_department: Department,
    pub status: ActivityStatus,
    /// Append-only, oldest first
    pub history: Vec<HistoryEntry>,
    /// Bumped on every committed transition
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    /// Department the history says the activity should be in
    ///
    /// Equals `current_department` for every well-formed activity. When the
    /// history is empty, `creation_department` is returned.
    pub fn department_per_history(&self, creation_department: Department) -> Department {
        self.history
            .last()
            .map(|entry| entry.to_department)
            .unwrap_or(creation_department)
    }
}

/// Intake registration of a new activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    /// Intake-assigned identifier; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Creation department, `intake` when absent
    #[serde(default)]
    pub department: Option<Department>,
}

/// Read-only activity projection filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFilter {
    #[serde(default)]
    pub department: Option<Department>,
    #[serde(default)]
    pub status: Option<ActivityStatus>,
}

impl ActivityFilter {
    pub fn matches(&self, activity: &Activity) -> bool {
        self.department.map_or(true, |d| activity.current_department == d)
            && self.status.map_or(true, |s| activity.status == s)
    }
}

// ========================================
// Reprint requests
// ========================================

/// Reprint request lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReprintStatus {
    Pending,
    Concluded,
    Rejected,
}

impl ReprintStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReprintStatus::Pending => "pending",
            ReprintStatus::Concluded => "concluded",
            ReprintStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReprintStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReprintStatus::Pending),
            "concluded" => Ok(ReprintStatus::Concluded),
            "rejected" => Ok(ReprintStatus::Rejected),
            other => Err(Error::Validation(format!("Unknown reprint status: {}", other))),
        }
    }
}

/// Final outcome chosen when processing a reprint request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Concluded,
    Rejected,
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concluded" => Ok(Resolution::Concluded),
            "rejected" => Ok(Resolution::Rejected),
            other => Err(Error::Validation(format!(
                "Unknown resolution: {} (expected concluded or rejected)",
                other
            ))),
        }
    }
}

impl From<Resolution> for ReprintStatus {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Concluded => ReprintStatus::Concluded,
            Resolution::Rejected => ReprintStatus::Rejected,
        }
    }
}

/// Request to rework (reprint) an activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprintRequest {
    pub id: Uuid,
    pub activity_id: String,
    pub requested_by: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub quantity: u32,
    pub status: ReprintStatus,
    pub from_department: Department,
    pub to_department: Department,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_by: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl ReprintRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ReprintStatus::Pending
    }
}

/// Input for creating a reprint request
///
/// `quantity` is signed so that non-positive values reach validation instead
/// of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReprintRequest {
    #[serde(default)]
    pub activity_id: String,
    #[serde(default)]
    pub requested_by: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    /// Defaults to the activity's current department
    #[serde(default)]
    pub from_department: Option<Department>,
    /// Defaults to `printing`
    #[serde(default)]
    pub to_department: Option<Department>,
}

/// Read-only reprint projection filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprintFilter {
    #[serde(default)]
    pub to_department: Option<Department>,
    #[serde(default)]
    pub status: Option<ReprintStatus>,
}

impl ReprintFilter {
    /// Pending requests routed to `department` (the terminal poll query)
    pub fn pending_for(department: Department) -> Self {
        Self {
            to_department: Some(department),
            status: Some(ReprintStatus::Pending),
        }
    }

    pub fn matches(&self, request: &ReprintRequest) -> bool {
        self.to_department.map_or(true, |d| request.to_department == d)
            && self.status.map_or(true, |s| request.status == s)
    }
}
