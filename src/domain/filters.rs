use uuid::Uuid;

use super::person::StudentStatus;

/// Server-side filter predicate for the assigned-tasks list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignedTaskFilters {
    pub assignment_status: AssignmentStatusFilter,
    pub student_status: Option<StudentStatus>,
    pub student_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AssignmentStatusFilter {
    /// No completion/verification predicate.
    #[default]
    All,
    /// Not yet marked complete.
    Assigned,
    /// Complete, awaiting verification.
    Pending,
    /// Complete and verified (any outcome).
    Completed,
}

impl AssignmentStatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatusFilter::All => "all",
            AssignmentStatusFilter::Assigned => "assigned",
            AssignmentStatusFilter::Pending => "pending",
            AssignmentStatusFilter::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(AssignmentStatusFilter::All),
            "assigned" => Some(AssignmentStatusFilter::Assigned),
            "pending" => Some(AssignmentStatusFilter::Pending),
            "completed" => Some(AssignmentStatusFilter::Completed),
            _ => None,
        }
    }
}

/// Shared filter shape for the roster lists (students, teachers, parents,
/// admins). `status` only applies to students; `search` matches display name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterFilters {
    pub status: Option<StudentStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketHistoryFilters {
    pub student_id: Option<Uuid>,
}
