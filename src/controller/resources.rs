use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::cache::{ParamValue, Params, QueryCache, QueryKey};
use crate::domain::{
    Admin, AssignedTask, AssignedTaskFilters, AssignmentStatusFilter, Page, Parent, RosterFilters,
    Student, StudentStatus, Teacher, TicketHistoryFilters, TicketTransaction,
};
use crate::gateway::{DataGateway, GatewayError, GatewayResult};

use super::{PageFetcher, PaginatedCollection, ResourceConfig};

pub const STUDENTS: &str = "students";
pub const TEACHERS: &str = "teachers";
pub const PARENTS: &str = "parents";
pub const ADMINS: &str = "admins";
pub const ASSIGNED_TASKS: &str = "assigned-tasks";
pub const TICKET_HISTORY: &str = "ticket-history";
pub const STUDENT_BALANCE: &str = "student-balance";
pub const STREAK_STATS: &str = "streak-stats";

/// Key for one student's server-maintained balance.
pub fn student_balance_key(student_id: Uuid) -> QueryKey {
    QueryKey::new(STUDENT_BALANCE).with("student_id", student_id)
}

pub fn streak_stats_key(student_id: Uuid) -> QueryKey {
    QueryKey::new(STREAK_STATS).with("student_id", student_id)
}

/// Paged students, defaulting to active ones, 20 per page.
pub fn students(
    cache: Arc<QueryCache>,
    gateway: Arc<dyn DataGateway>,
) -> PaginatedCollection<Student> {
    PaginatedCollection::new(
        cache,
        Arc::new(StudentPages { gateway }),
        ResourceConfig::new(STUDENTS, 20).with_default_param("status", "active"),
    )
}

pub fn teachers(
    cache: Arc<QueryCache>,
    gateway: Arc<dyn DataGateway>,
) -> PaginatedCollection<Teacher> {
    PaginatedCollection::new(
        cache,
        Arc::new(TeacherPages { gateway }),
        ResourceConfig::new(TEACHERS, 15),
    )
}

pub fn parents(
    cache: Arc<QueryCache>,
    gateway: Arc<dyn DataGateway>,
) -> PaginatedCollection<Parent> {
    PaginatedCollection::new(
        cache,
        Arc::new(ParentPages { gateway }),
        ResourceConfig::new(PARENTS, 15),
    )
}

pub fn admins(
    cache: Arc<QueryCache>,
    gateway: Arc<dyn DataGateway>,
) -> PaginatedCollection<Admin> {
    PaginatedCollection::new(
        cache,
        Arc::new(AdminPages { gateway }),
        ResourceConfig::new(ADMINS, 10),
    )
}

pub fn assigned_tasks(
    cache: Arc<QueryCache>,
    gateway: Arc<dyn DataGateway>,
) -> PaginatedCollection<AssignedTask> {
    PaginatedCollection::new(
        cache,
        Arc::new(AssignedTaskPages { gateway }),
        ResourceConfig::new(ASSIGNED_TASKS, 25),
    )
}

pub fn ticket_history(
    cache: Arc<QueryCache>,
    gateway: Arc<dyn DataGateway>,
) -> PaginatedCollection<TicketTransaction> {
    PaginatedCollection::new(
        cache,
        Arc::new(TicketHistoryPages { gateway }),
        ResourceConfig::new(TICKET_HISTORY, 25),
    )
}

struct AssignedTaskPages {
    gateway: Arc<dyn DataGateway>,
}

#[async_trait]
impl PageFetcher<AssignedTask> for AssignedTaskPages {
    async fn fetch_page(
        &self,
        params: &Params,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<AssignedTask>> {
        let filters = assigned_task_filters(params)?;
        self.gateway.list_assigned_tasks(&filters, page, limit).await
    }
}

struct StudentPages {
    gateway: Arc<dyn DataGateway>,
}

#[async_trait]
impl PageFetcher<Student> for StudentPages {
    async fn fetch_page(&self, params: &Params, page: u32, limit: u32) -> GatewayResult<Page<Student>> {
        let filters = roster_filters(params)?;
        self.gateway.list_students(&filters, page, limit).await
    }
}

struct TeacherPages {
    gateway: Arc<dyn DataGateway>,
}

#[async_trait]
impl PageFetcher<Teacher> for TeacherPages {
    async fn fetch_page(&self, params: &Params, page: u32, limit: u32) -> GatewayResult<Page<Teacher>> {
        let filters = roster_filters(params)?;
        self.gateway.list_teachers(&filters, page, limit).await
    }
}

struct ParentPages {
    gateway: Arc<dyn DataGateway>,
}

#[async_trait]
impl PageFetcher<Parent> for ParentPages {
    async fn fetch_page(&self, params: &Params, page: u32, limit: u32) -> GatewayResult<Page<Parent>> {
        let filters = roster_filters(params)?;
        self.gateway.list_parents(&filters, page, limit).await
    }
}

struct AdminPages {
    gateway: Arc<dyn DataGateway>,
}

#[async_trait]
impl PageFetcher<Admin> for AdminPages {
    async fn fetch_page(&self, params: &Params, page: u32, limit: u32) -> GatewayResult<Page<Admin>> {
        let filters = roster_filters(params)?;
        self.gateway.list_admins(&filters, page, limit).await
    }
}

struct TicketHistoryPages {
    gateway: Arc<dyn DataGateway>,
}

#[async_trait]
impl PageFetcher<TicketTransaction> for TicketHistoryPages {
    async fn fetch_page(
        &self,
        params: &Params,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<TicketTransaction>> {
        let filters = TicketHistoryFilters {
            student_id: parse_uuid(params, "student_id")?,
        };
        self.gateway.list_ticket_history(&filters, page, limit).await
    }
}

pub(crate) fn assigned_task_filters(params: &Params) -> GatewayResult<AssignedTaskFilters> {
    let assignment_status = match params.get("assignment_status").and_then(ParamValue::as_text) {
        Some(s) => AssignmentStatusFilter::parse(s)
            .ok_or_else(|| GatewayError::validation("assignment_status", "unknown value"))?,
        None => AssignmentStatusFilter::All,
    };
    Ok(AssignedTaskFilters {
        assignment_status,
        student_status: parse_student_status(params)?,
        student_id: parse_uuid(params, "student_id")?,
        teacher_id: parse_uuid(params, "teacher_id")?,
    })
}

pub(crate) fn roster_filters(params: &Params) -> GatewayResult<RosterFilters> {
    Ok(RosterFilters {
        status: parse_student_status(params)?,
        search: params
            .get("search")
            .and_then(ParamValue::as_text)
            .map(str::to_string),
    })
}

fn parse_student_status(params: &Params) -> GatewayResult<Option<StudentStatus>> {
    match params.get("status").or_else(|| params.get("student_status")) {
        None => Ok(None),
        Some(value) => {
            let text = value
                .as_text()
                .ok_or_else(|| GatewayError::validation("status", "expected a text value"))?;
            StudentStatus::parse(text)
                .map(Some)
                .ok_or_else(|| GatewayError::validation("status", "unknown value"))
        }
    }
}

fn parse_uuid(params: &Params, name: &str) -> GatewayResult<Option<Uuid>> {
    match params.get(name) {
        None => Ok(None),
        Some(value) => {
            let text = value
                .as_text()
                .ok_or_else(|| GatewayError::validation(name, "expected a text value"))?;
            Uuid::parse_str(text)
                .map(Some)
                .map_err(|_| GatewayError::validation(name, "not a valid id"))
        }
    }
}
