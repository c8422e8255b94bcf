pub mod error;
pub mod rest;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Admin, AssignedTask, AssignedTaskFilters, AssignedTaskUpdate, NewAssignedTask, Page, Parent,
    RosterFilters, StreakStats, Student, Teacher, TicketHistoryFilters, TicketTransaction,
};

pub use error::GatewayError;
pub use rest::RestGateway;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Typed boundary to the remote data service.
///
/// Every list call returns a server-sorted paging envelope; every failure is
/// a typed [`GatewayError`] — the gateway never swallows errors. Mutations
/// wait for server acknowledgement; callers invalidate cached pages
/// afterwards (no optimistic updates).
#[mockall::automock]
#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn list_assigned_tasks(
        &self,
        filters: &AssignedTaskFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<AssignedTask>>;

    async fn create_assigned_task(&self, input: NewAssignedTask) -> GatewayResult<AssignedTask>;

    async fn update_assigned_task(
        &self,
        assignment_id: Uuid,
        update: AssignedTaskUpdate,
    ) -> GatewayResult<AssignedTask>;

    async fn delete_assigned_task(&self, assignment_id: Uuid) -> GatewayResult<()>;

    async fn list_students(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Student>>;

    async fn list_teachers(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Teacher>>;

    async fn list_parents(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Parent>>;

    async fn list_admins(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Admin>>;

    async fn list_ticket_history(
        &self,
        filters: &TicketHistoryFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<TicketTransaction>>;

    /// Server-authoritative ticket balance for one student.
    async fn fetch_student_balance(&self, student_id: Uuid) -> GatewayResult<i64>;

    async fn fetch_streak_stats(&self, student_id: Uuid) -> GatewayResult<StreakStats>;
}

/// Client-side preconditions shared by every gateway implementation.
pub(crate) fn validate_new_task(input: &NewAssignedTask) -> GatewayResult<()> {
    if input.title.trim().is_empty() {
        return Err(GatewayError::validation("title", "must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_update(update: &AssignedTaskUpdate) -> GatewayResult<()> {
    if let AssignedTaskUpdate::Verify {
        status,
        points_awarded,
        ..
    } = update
    {
        if *status == crate::domain::VerificationStatus::Pending {
            return Err(GatewayError::validation(
                "verification_status",
                "pending is not a verification outcome",
            ));
        }
        if *status == crate::domain::VerificationStatus::Incomplete && *points_awarded > 0 {
            return Err(GatewayError::validation(
                "points_awarded",
                "must be zero when the outcome is incomplete",
            ));
        }
    }
    Ok(())
}

pub(crate) fn validate_page_params(page: u32, limit: u32) -> GatewayResult<()> {
    if page == 0 {
        return Err(GatewayError::validation("page", "must be >= 1"));
    }
    if limit == 0 {
        return Err(GatewayError::validation("limit", "must be > 0"));
    }
    Ok(())
}
