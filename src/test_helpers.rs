// In-memory gateway for integration tests and the demo binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::page::total_pages_for;
use crate::domain::{
    Admin, AssignedTask, AssignedTaskFilters, AssignedTaskUpdate, AssignmentStatusFilter,
    NewAssignedTask, Page, Parent, RosterFilters, StreakStats, Student, StudentStatus, Teacher,
    TicketHistoryFilters, TicketTransaction, TransactionKind, VerificationStatus,
};
use crate::gateway::{DataGateway, GatewayError, GatewayResult};

#[derive(Default)]
struct Stores {
    students: Vec<Student>,
    teachers: Vec<Teacher>,
    parents: Vec<Parent>,
    admins: Vec<Admin>,
    tasks: Vec<AssignedTask>,
    transactions: Vec<TicketTransaction>,
    streaks: HashMap<Uuid, StreakStats>,
    teacher_links: HashMap<Uuid, Vec<Uuid>>,
}

/// Full-fidelity in-memory [`DataGateway`]: same filtering, paging envelope,
/// validation, and error rules as the REST implementation, plus call
/// counters and injectable latency so tests can observe coalescing and
/// response ordering.
#[derive(Default)]
pub struct InMemoryGateway {
    stores: Mutex<Stores>,
    latency: Mutex<Option<Duration>>,
    task_queries: AtomicUsize,
    student_queries: AtomicUsize,
    link_lookups: AtomicUsize,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, to widen race windows in tests.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// How many times the assigned-tasks store was actually scanned.
    pub fn task_query_count(&self) -> usize {
        self.task_queries.load(Ordering::SeqCst)
    }

    /// How many times the students store was scanned.
    pub fn student_query_count(&self) -> usize {
        self.student_queries.load(Ordering::SeqCst)
    }

    pub fn link_lookup_count(&self) -> usize {
        self.link_lookups.load(Ordering::SeqCst)
    }

    pub fn add_student(&self, display_name: &str, status: StudentStatus) -> Student {
        let student = Student {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            email: None,
            status,
            instrument: None,
        };
        self.stores.lock().students.push(student.clone());
        student
    }

    pub fn add_teacher(&self, display_name: &str, linked_students: Vec<Uuid>) -> Teacher {
        let teacher = Teacher {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            email: None,
        };
        let mut stores = self.stores.lock();
        stores.teacher_links.insert(teacher.id, linked_students);
        stores.teachers.push(teacher.clone());
        teacher
    }

    pub fn add_parent(&self, display_name: &str) -> Parent {
        let parent = Parent {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            email: None,
        };
        self.stores.lock().parents.push(parent.clone());
        parent
    }

    pub fn add_admin(&self, display_name: &str) -> Admin {
        let admin = Admin {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            email: None,
        };
        self.stores.lock().admins.push(admin.clone());
        admin
    }

    pub fn add_task(&self, task: AssignedTask) -> AssignedTask {
        self.stores.lock().tasks.push(task.clone());
        task
    }

    pub fn add_transaction(&self, transaction: TicketTransaction) {
        self.stores.lock().transactions.push(transaction);
    }

    pub fn set_streak(&self, stats: StreakStats) {
        self.stores.lock().streaks.insert(stats.student_id, stats);
    }

    pub fn get_task(&self, id: Uuid) -> Option<AssignedTask> {
        self.stores.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn task_ids(&self) -> Vec<Uuid> {
        self.stores.lock().tasks.iter().map(|t| t.id).collect()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn paginate<T: Clone>(items: &[T], page: u32, limit: u32) -> Page<T> {
    let total_items = items.len() as u64;
    let start = ((page - 1) as usize).saturating_mul(limit as usize);
    let page_items = items
        .iter()
        .skip(start)
        .take(limit as usize)
        .cloned()
        .collect();
    Page {
        items: page_items,
        current_page: page,
        total_pages: total_pages_for(total_items, limit),
        total_items,
    }
}

fn matches_search(display_name: &str, search: &Option<String>) -> bool {
    match search {
        Some(term) if !term.is_empty() => display_name
            .to_lowercase()
            .contains(&term.to_lowercase()),
        _ => true,
    }
}

#[async_trait]
impl DataGateway for InMemoryGateway {
    async fn list_assigned_tasks(
        &self,
        filters: &AssignedTaskFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<AssignedTask>> {
        crate::gateway::validate_page_params(page, limit)?;
        self.simulate_latency().await;

        let scoped_students = match filters.teacher_id {
            Some(teacher_id) => {
                self.link_lookups.fetch_add(1, Ordering::SeqCst);
                let linked = self
                    .stores
                    .lock()
                    .teacher_links
                    .get(&teacher_id)
                    .cloned()
                    .unwrap_or_default();
                if linked.is_empty() {
                    // No linked students means no visible tasks; skip the
                    // task scan entirely.
                    return Ok(Page::empty());
                }
                Some(linked)
            }
            None => None,
        };

        self.task_queries.fetch_add(1, Ordering::SeqCst);
        let stores = self.stores.lock();
        let matching: Vec<AssignedTask> = stores
            .tasks
            .iter()
            .filter(|task| match filters.assignment_status {
                AssignmentStatusFilter::All => true,
                AssignmentStatusFilter::Assigned => !task.is_complete,
                AssignmentStatusFilter::Pending => task.is_pending_verification(),
                AssignmentStatusFilter::Completed => task.is_finalized(),
            })
            .filter(|task| match filters.student_id {
                Some(student_id) => task.student_id == student_id,
                None => true,
            })
            .filter(|task| match &scoped_students {
                Some(ids) => ids.contains(&task.student_id),
                None => true,
            })
            .filter(|task| match filters.student_status {
                Some(status) => stores
                    .students
                    .iter()
                    .any(|s| s.id == task.student_id && s.status == status),
                None => true,
            })
            .cloned()
            .collect();
        Ok(paginate(&matching, page, limit))
    }

    async fn create_assigned_task(&self, input: NewAssignedTask) -> GatewayResult<AssignedTask> {
        crate::gateway::validate_new_task(&input)?;
        self.simulate_latency().await;
        let task = AssignedTask::new(input);
        self.stores.lock().tasks.push(task.clone());
        Ok(task)
    }

    async fn update_assigned_task(
        &self,
        assignment_id: Uuid,
        update: AssignedTaskUpdate,
    ) -> GatewayResult<AssignedTask> {
        crate::gateway::validate_update(&update)?;
        self.simulate_latency().await;
        let mut stores = self.stores.lock();
        let Stores {
            tasks,
            transactions,
            ..
        } = &mut *stores;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == assignment_id)
            .ok_or_else(|| GatewayError::mutation("assignment not found"))?;

        match update {
            AssignedTaskUpdate::MarkComplete => {
                task.is_complete = true;
                task.completed_date = Some(Utc::now());
                task.verification_status = Some(VerificationStatus::Pending);
            }
            AssignedTaskUpdate::MarkIncomplete => {
                task.is_complete = false;
                task.completed_date = None;
                task.verification_status = None;
                task.verified_by_id = None;
                task.verified_date = None;
                task.actual_points_awarded = None;
            }
            AssignedTaskUpdate::Verify {
                status,
                points_awarded,
                verified_by,
            } => {
                if !task.is_complete {
                    return Err(GatewayError::mutation(
                        "assignment is not awaiting verification",
                    ));
                }
                if task.is_finalized() {
                    return Err(GatewayError::mutation("assignment is already verified"));
                }
                task.verification_status = Some(status);
                task.actual_points_awarded = Some(points_awarded);
                task.verified_by_id = Some(verified_by);
                task.verified_date = Some(Utc::now());
                if points_awarded > 0 {
                    transactions.push(TicketTransaction {
                        id: Uuid::new_v4(),
                        student_id: task.student_id,
                        amount: i64::from(points_awarded),
                        kind: TransactionKind::TaskAward,
                        note: Some(task.title.clone()),
                        created_at: Utc::now(),
                    });
                }
            }
        }
        Ok(task.clone())
    }

    async fn delete_assigned_task(&self, assignment_id: Uuid) -> GatewayResult<()> {
        self.simulate_latency().await;
        let mut stores = self.stores.lock();
        let task = stores
            .tasks
            .iter()
            .find(|t| t.id == assignment_id)
            .ok_or_else(|| GatewayError::mutation("assignment not found"))?;
        if task.is_finalized() {
            return Err(GatewayError::permission(
                "verified assignments cannot be deleted",
            ));
        }
        stores.tasks.retain(|t| t.id != assignment_id);
        Ok(())
    }

    async fn list_students(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Student>> {
        crate::gateway::validate_page_params(page, limit)?;
        self.simulate_latency().await;
        self.student_queries.fetch_add(1, Ordering::SeqCst);
        let stores = self.stores.lock();
        let matching: Vec<Student> = stores
            .students
            .iter()
            .filter(|s| filters.status.map_or(true, |status| s.status == status))
            .filter(|s| matches_search(&s.display_name, &filters.search))
            .cloned()
            .collect();
        Ok(paginate(&matching, page, limit))
    }

    async fn list_teachers(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Teacher>> {
        crate::gateway::validate_page_params(page, limit)?;
        self.simulate_latency().await;
        let stores = self.stores.lock();
        let matching: Vec<Teacher> = stores
            .teachers
            .iter()
            .filter(|t| matches_search(&t.display_name, &filters.search))
            .cloned()
            .collect();
        Ok(paginate(&matching, page, limit))
    }

    async fn list_parents(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Parent>> {
        crate::gateway::validate_page_params(page, limit)?;
        self.simulate_latency().await;
        let stores = self.stores.lock();
        let matching: Vec<Parent> = stores
            .parents
            .iter()
            .filter(|p| matches_search(&p.display_name, &filters.search))
            .cloned()
            .collect();
        Ok(paginate(&matching, page, limit))
    }

    async fn list_admins(
        &self,
        filters: &RosterFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<Admin>> {
        crate::gateway::validate_page_params(page, limit)?;
        self.simulate_latency().await;
        let stores = self.stores.lock();
        let matching: Vec<Admin> = stores
            .admins
            .iter()
            .filter(|a| matches_search(&a.display_name, &filters.search))
            .cloned()
            .collect();
        Ok(paginate(&matching, page, limit))
    }

    async fn list_ticket_history(
        &self,
        filters: &TicketHistoryFilters,
        page: u32,
        limit: u32,
    ) -> GatewayResult<Page<TicketTransaction>> {
        crate::gateway::validate_page_params(page, limit)?;
        self.simulate_latency().await;
        let stores = self.stores.lock();
        let matching: Vec<TicketTransaction> = stores
            .transactions
            .iter()
            .filter(|t| filters.student_id.map_or(true, |id| t.student_id == id))
            .cloned()
            .collect();
        Ok(paginate(&matching, page, limit))
    }

    async fn fetch_student_balance(&self, student_id: Uuid) -> GatewayResult<i64> {
        self.simulate_latency().await;
        let stores = self.stores.lock();
        Ok(stores
            .transactions
            .iter()
            .filter(|t| t.student_id == student_id)
            .map(|t| t.amount)
            .sum())
    }

    async fn fetch_streak_stats(&self, student_id: Uuid) -> GatewayResult<StreakStats> {
        self.simulate_latency().await;
        let stores = self.stores.lock();
        Ok(stores
            .streaks
            .get(&student_id)
            .cloned()
            .unwrap_or(StreakStats {
                student_id,
                current_streak_days: 0,
                longest_streak_days: 0,
                last_practice_date: None,
            }))
    }
}

/// A fresh unassigned task for one student.
pub fn make_task(student_id: Uuid, title: &str, base_points: u32) -> AssignedTask {
    AssignedTask::new(NewAssignedTask {
        student_id,
        assigned_by_id: Uuid::new_v4(),
        title: title.to_string(),
        description: String::new(),
        base_points,
    })
}

/// A task already completed and awaiting verification.
pub fn make_pending_task(student_id: Uuid, title: &str, base_points: u32) -> AssignedTask {
    let mut task = make_task(student_id, title, base_points);
    task.is_complete = true;
    task.completed_date = Some(Utc::now());
    task.verification_status = Some(VerificationStatus::Pending);
    task
}
