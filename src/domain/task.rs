use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A practice task assigned to a student, worth a fixed number of tickets
/// once a teacher verifies it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignedTask {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assigned_by_id: Uuid,
    pub assigned_date: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub base_points: u32,
    pub is_complete: bool,
    pub completed_date: Option<DateTime<Utc>>,
    pub verification_status: Option<VerificationStatus>,
    pub verified_by_id: Option<Uuid>,
    pub verified_date: Option<DateTime<Utc>>,
    pub actual_points_awarded: Option<u32>,
}

impl AssignedTask {
    pub fn new(input: NewAssignedTask) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: input.student_id,
            assigned_by_id: input.assigned_by_id,
            assigned_date: Utc::now(),
            title: input.title,
            description: input.description,
            base_points: input.base_points,
            is_complete: false,
            completed_date: None,
            verification_status: None,
            verified_by_id: None,
            verified_date: None,
            actual_points_awarded: None,
        }
    }

    /// A task is awaiting verification once completed but not yet reviewed.
    pub fn is_pending_verification(&self) -> bool {
        self.is_complete && self.verification_status == Some(VerificationStatus::Pending)
    }

    /// Once verification leaves `Pending` the record is immutable to this layer.
    pub fn is_finalized(&self) -> bool {
        matches!(
            self.verification_status,
            Some(VerificationStatus::Verified)
                | Some(VerificationStatus::Partial)
                | Some(VerificationStatus::Incomplete)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Partial,
    Incomplete,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Partial => "partial",
            VerificationStatus::Incomplete => "incomplete",
        }
    }
}

/// Payload for creating a new assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAssignedTask {
    pub student_id: Uuid,
    pub assigned_by_id: Uuid,
    pub title: String,
    pub description: String,
    pub base_points: u32,
}

/// The three mutually exclusive update shapes accepted by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignedTaskUpdate {
    /// Student marks the task done; moves it into the verification queue.
    MarkComplete,
    /// Clears completion and any verification state.
    MarkIncomplete,
    /// Teacher records a verification outcome and the tickets awarded.
    Verify {
        status: VerificationStatus,
        points_awarded: u32,
        verified_by: Uuid,
    },
}
