use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::cache::{ParamValue, QueryCache, QueryKey};
use crate::controller::resources;
use crate::domain::{AssignedTask, AssignedTaskUpdate, NewAssignedTask, VerificationStatus};
use crate::gateway::{DataGateway, GatewayError, GatewayResult};

/// The three-step verification interaction, as a pure tagged union:
/// select an outcome, adjust the award, then confirm (with an optional
/// reassign offer afterwards). Transition functions never touch the network;
/// [`VerificationWorkflow`] drives the mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    /// Step 1: pick a verification outcome.
    SelectStatus,
    /// Step 2: tune the award, go back, or confirm.
    SetPoints {
        status: VerificationStatus,
        awarded: u32,
    },
    /// Step 3: verification recorded; the task may be reassigned.
    Done {
        status: VerificationStatus,
        awarded: u32,
    },
    Closed(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Cancelled,
    Confirmed,
    Reassigned,
}

impl WorkflowState {
    /// Step 1 -> 2. Choosing an outcome seeds the award from the task's base
    /// tickets. No-op outside step 1.
    pub fn choose(self, status: VerificationStatus, base_points: u32) -> Self {
        match self {
            WorkflowState::SelectStatus => WorkflowState::SetPoints {
                status,
                awarded: default_award(status, base_points),
            },
            other => other,
        }
    }

    /// Adjust the award within step 2, clamped into `[0, base_points]`.
    pub fn adjust_award(self, points: i64, base_points: u32) -> Self {
        match self {
            WorkflowState::SetPoints { status, .. } => WorkflowState::SetPoints {
                status,
                awarded: clamp_award(points, base_points),
            },
            other => other,
        }
    }

    /// Step 2 -> 1, discarding the chosen outcome.
    pub fn back(self) -> Self {
        match self {
            WorkflowState::SetPoints { .. } => WorkflowState::SelectStatus,
            other => other,
        }
    }

    /// Cancel from any live step; already-closed workflows stay closed.
    pub fn cancel(self) -> Self {
        match self {
            WorkflowState::Closed(reason) => WorkflowState::Closed(reason),
            _ => WorkflowState::Closed(CloseReason::Cancelled),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, WorkflowState::Closed(_))
    }
}

/// Default award for a chosen outcome: full base tickets when verified, half
/// rounded half-up when partial, nothing when incomplete.
pub fn default_award(status: VerificationStatus, base_points: u32) -> u32 {
    match status {
        VerificationStatus::Verified => base_points,
        VerificationStatus::Partial => (base_points + 1) / 2,
        VerificationStatus::Incomplete | VerificationStatus::Pending => 0,
    }
}

/// Clamp a proposed award into `[0, base_points]`.
pub fn clamp_award(points: i64, base_points: u32) -> u32 {
    points.clamp(0, i64::from(base_points)) as u32
}

/// Keys touched by a successful verification for `student_id`: that
/// student's task pages, balance and ticket history, plus the unfiltered
/// assigned-tasks/ticket-history aggregates. Pages scoped to other students
/// never match.
pub fn verification_invalidation(student_id: Uuid) -> impl Fn(&QueryKey) -> bool {
    let student = ParamValue::from(student_id);
    move |key: &QueryKey| match key.resource() {
        resources::ASSIGNED_TASKS | resources::TICKET_HISTORY => key
            .param("student_id")
            .map_or(true, |value| *value == student),
        resources::STUDENT_BALANCE | resources::STREAK_STATS => {
            key.param("student_id") == Some(&student)
        }
        _ => false,
    }
}

/// Keys touched by reassigning a task to `student_id`.
pub fn reassign_invalidation(student_id: Uuid) -> impl Fn(&QueryKey) -> bool {
    let student = ParamValue::from(student_id);
    move |key: &QueryKey| {
        key.resource() == resources::ASSIGNED_TASKS
            && key
                .param("student_id")
                .map_or(true, |value| *value == student)
    }
}

/// Drives one task's verification: holds the state machine plus the task
/// snapshot taken at open, issues the verify/reassign mutations, and
/// invalidates the affected cache keys strictly after the server
/// acknowledges. A failed mutation leaves the state machine where it was so
/// the user can correct and resubmit.
pub struct VerificationWorkflow {
    gateway: Arc<dyn DataGateway>,
    cache: Arc<QueryCache>,
    task_id: Uuid,
    student_id: Uuid,
    title: String,
    description: String,
    base_points: u32,
    state: WorkflowState,
}

impl VerificationWorkflow {
    pub fn open(gateway: Arc<dyn DataGateway>, cache: Arc<QueryCache>, task: &AssignedTask) -> Self {
        Self {
            gateway,
            cache,
            task_id: task.id,
            student_id: task.student_id,
            title: task.title.clone(),
            description: task.description.clone(),
            base_points: task.base_points,
            state: WorkflowState::SelectStatus,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn base_points(&self) -> u32 {
        self.base_points
    }

    pub fn awarded_points(&self) -> Option<u32> {
        match self.state {
            WorkflowState::SetPoints { awarded, .. } | WorkflowState::Done { awarded, .. } => {
                Some(awarded)
            }
            _ => None,
        }
    }

    pub fn select_status(&mut self, status: VerificationStatus) {
        self.state = self.state.clone().choose(status, self.base_points);
    }

    pub fn set_points(&mut self, points: i64) {
        self.state = self.state.clone().adjust_award(points, self.base_points);
    }

    pub fn back(&mut self) {
        self.state = self.state.clone().back();
    }

    pub fn cancel(&mut self) {
        self.state = self.state.clone().cancel();
    }

    /// Close the workflow from the done step without reassigning.
    pub fn close(&mut self) {
        if let WorkflowState::Done { .. } = self.state {
            self.state = WorkflowState::Closed(CloseReason::Confirmed);
        }
    }

    /// Step 2 confirm: dispatch the verify mutation and, on success, move to
    /// step 3 and invalidate the student's affected pages. On failure the
    /// state stays on step 2 and the error is surfaced to the caller.
    pub async fn confirm(&mut self, verified_by: Uuid) -> GatewayResult<AssignedTask> {
        let (status, awarded) = match &self.state {
            WorkflowState::SetPoints { status, awarded } => (*status, *awarded),
            _ => {
                return Err(GatewayError::validation(
                    "step",
                    "confirm is only available from the points step",
                ))
            }
        };
        let awarded = awarded.min(self.base_points);

        let updated = self
            .gateway
            .update_assigned_task(
                self.task_id,
                AssignedTaskUpdate::Verify {
                    status,
                    points_awarded: awarded,
                    verified_by,
                },
            )
            .await?;

        info!(
            task_id = %self.task_id,
            student_id = %self.student_id,
            status = status.as_str(),
            awarded,
            "task verified"
        );
        self.cache.invalidate(verification_invalidation(self.student_id));
        self.state = WorkflowState::Done { status, awarded };
        Ok(updated)
    }

    /// Step 3 reassign: create a fresh copy of the task for the same student
    /// and close the workflow. On failure the workflow stays on step 3.
    pub async fn reassign(&mut self, assigned_by: Uuid) -> GatewayResult<AssignedTask> {
        if !matches!(self.state, WorkflowState::Done { .. }) {
            return Err(GatewayError::validation(
                "step",
                "reassign is only available after verification",
            ));
        }

        let created = self
            .gateway
            .create_assigned_task(NewAssignedTask {
                student_id: self.student_id,
                assigned_by_id: assigned_by,
                title: self.title.clone(),
                description: self.description.clone(),
                base_points: self.base_points,
            })
            .await?;

        info!(task_id = %created.id, student_id = %self.student_id, "task reassigned");
        self.cache.invalidate(reassign_invalidation(self.student_id));
        self.state = WorkflowState::Closed(CloseReason::Reassigned);
        Ok(created)
    }
}
