use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    Admin, AssignedTask, AssignedTaskFilters, AssignedTaskUpdate, AssignmentStatusFilter,
    NewAssignedTask, Page, Parent, RosterFilters, StreakStats, Student, Teacher,
    TicketHistoryFilters, TicketTransaction,
};

use super::{
    validate_new_task, validate_page_params, validate_update, DataGateway, GatewayError,
    GatewayResult,
};

/// HTTP client for the hosted backend. All list endpoints return the shared
/// `{items, current_page, total_pages, total_items}` envelope; rows
/// deserialize straight into domain records.
#[derive(Clone)]
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: None,
        }
    }

    /// Attach the signed-in user's bearer token to subsequent requests.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url).header("apikey", &self.api_key);
        if let Some(token) = &self.access_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<Page<T>> {
        debug!(path = %path, "list request");
        let response = self
            .request(reqwest::Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(|e| GatewayError::query(e.to_string()))?;
        let response = check_status(response, ErrorKind::Query).await?;
        response
            .json::<Page<T>>()
            .await
            .map_err(|e| GatewayError::query(format!("malformed page envelope: {}", e)))
    }

    async fn send_mutation<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: serde_json::Value,
    ) -> GatewayResult<T> {
        debug!(path = %path, "mutation request");
        let response = self
            .request(method, path)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::mutation(e.to_string()))?;
        let response = check_status(response, ErrorKind::Mutation).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::mutation(format!("malformed response payload: {}", e)))
    }

    /// Student ids linked to a teacher; assigned-task queries scoped by
    /// teacher resolve through this link set first.
    async fn linked_student_ids(&self, teacher_id: Uuid) -> GatewayResult<Vec<Uuid>> {
        let path = format!("/teachers/{}/students", teacher_id);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| GatewayError::query(e.to_string()))?;
        let response = check_status(response, ErrorKind::Query).await?;
        let links: TeacherLinks = response
            .json()
            .await
            .map_err(|e| GatewayError::query(format!("malformed link payload: {}", e)))?;
        Ok(links.student_ids)
    }
}

#[derive(Debug, Deserialize)]
struct TeacherLinks {
    student_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct BalanceBody {
    balance: i64,
}

#[derive(Clone, Copy)]
enum ErrorKind {
    Query,
    Mutation,
}

async fn check_status(
    response: reqwest::Response,
    kind: ErrorKind,
) -> GatewayResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GatewayError::permission(message));
    }
    Err(match kind {
        ErrorKind::Query => GatewayError::query(message),
        ErrorKind::Mutation => GatewayError::mutation(message),
    })
}

fn roster_query(filters: &RosterFilters, page: u32, limit: u32) -> Vec<(&'static str, String)> {
    let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
    if let Some(status) = filters.status {
        query.push(("status", status.as_str().to_string()));
    }
    if let Some(search) = &filters.search {
        if !search.is_empty() {
            query.push(("search", search.clone()));
        }
    }
    query
}

#[derive(Debug, Serialize)]
struct VerifyBody<'a> {
    verification_status: &'a str,
    actual_points_awarded: u32,
    verified_by_id: Uuid,
}

#[async_trait]
impl DataGateway for RestGateway {
    async fn list_assigned_tasks(
        &self,
        filters: &AssignedTaskFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<AssignedTask>> {
        validate_page_params(page, limit)?;
        let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
        if filters.assignment_status != AssignmentStatusFilter::All {
            query.push(("assignment_status", filters.assignment_status.as_str().to_string()));
        }
        if let Some(status) = filters.student_status {
            query.push(("student_status", status.as_str().to_string()));
        }
        if let Some(student_id) = filters.student_id {
            query.push(("student_id", student_id.to_string()));
        }
        if let Some(teacher_id) = filters.teacher_id {
            let linked = self.linked_student_ids(teacher_id).await?;
            if linked.is_empty() {
                // A teacher with no linked students has no visible tasks;
                // skip the task query entirely.
                return Ok(Page::empty());
            }
            let ids = linked
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .join(",");
            query.push(("student_ids", ids));
        }
        self.get_page("/assigned-tasks", &query).await
    }

    async fn create_assigned_task(&self, input: NewAssignedTask) -> GatewayResult<AssignedTask> {
        validate_new_task(&input)?;
        let body = serde_json::to_value(&input)
            .map_err(|e| GatewayError::mutation(e.to_string()))?;
        self.send_mutation(reqwest::Method::POST, "/assigned-tasks", body)
            .await
    }

    async fn update_assigned_task(
        &self,
        assignment_id: Uuid,
        update: AssignedTaskUpdate,
    ) -> GatewayResult<AssignedTask> {
        validate_update(&update)?;
        let path = format!("/assigned-tasks/{}", assignment_id);
        let body = match update {
            AssignedTaskUpdate::MarkComplete => json!({ "is_complete": true }),
            AssignedTaskUpdate::MarkIncomplete => json!({ "is_complete": false }),
            AssignedTaskUpdate::Verify {
                status,
                points_awarded,
                verified_by,
            } => serde_json::to_value(VerifyBody {
                verification_status: status.as_str(),
                actual_points_awarded: points_awarded,
                verified_by_id: verified_by,
            })
            .map_err(|e| GatewayError::mutation(e.to_string()))?,
        };
        self.send_mutation(reqwest::Method::PATCH, &path, body).await
    }

    async fn delete_assigned_task(&self, assignment_id: Uuid) -> GatewayResult<()> {
        let path = format!("/assigned-tasks/{}", assignment_id);
        let response = self
            .request(reqwest::Method::DELETE, &path)
            .send()
            .await
            .map_err(|e| GatewayError::mutation(e.to_string()))?;
        check_status(response, ErrorKind::Mutation).await?;
        Ok(())
    }

    async fn list_students(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Student>> {
        validate_page_params(page, limit)?;
        self.get_page("/students", &roster_query(filters, page, limit))
            .await
    }

    async fn list_teachers(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Teacher>> {
        validate_page_params(page, limit)?;
        self.get_page("/teachers", &roster_query(filters, page, limit))
            .await
    }

    async fn list_parents(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Parent>> {
        validate_page_params(page, limit)?;
        self.get_page("/parents", &roster_query(filters, page, limit))
            .await
    }

    async fn list_admins(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Admin>> {
        validate_page_params(page, limit)?;
        self.get_page("/admins", &roster_query(filters, page, limit))
            .await
    }

    async fn list_ticket_history(
        &self,
        filters: &TicketHistoryFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<TicketTransaction>> {
        validate_page_params(page, limit)?;
        let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
        if let Some(student_id) = filters.student_id {
            query.push(("student_id", student_id.to_string()));
        }
        self.get_page("/ticket-history", &query).await
    }

    async fn fetch_student_balance(&self, student_id: Uuid) -> GatewayResult<i64> {
        let path = format!("/students/{}/balance", student_id);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| GatewayError::query(e.to_string()))?;
        let response = check_status(response, ErrorKind::Query).await?;
        let body: BalanceBody = response
            .json()
            .await
            .map_err(|e| GatewayError::query(format!("malformed balance payload: {}", e)))?;
        Ok(body.balance)
    }

    async fn fetch_streak_stats(&self, student_id: Uuid) -> GatewayResult<StreakStats> {
        let path = format!("/students/{}/streak", student_id);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| GatewayError::query(e.to_string()))?;
        let response = check_status(response, ErrorKind::Query).await?;
        response
            .json::<StreakStats>()
            .await
            .map_err(|e| GatewayError::query(format!("malformed streak payload: {}", e)))
    }
}
