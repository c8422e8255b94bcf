use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use uuid::Uuid;

use etude::cache::QueryCache;
use etude::controller::resources;
use etude::domain::{StudentStatus, VerificationStatus};
use etude::gateway::DataGateway;
use etude::test_helpers::{make_pending_task, InMemoryGateway};
use etude::workflow::VerificationWorkflow;

/// Demo wiring: pages through seeded assigned tasks, verifies one, and shows
/// the invalidated pages refetching.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let gateway = Arc::new(seeded_gateway());
    let gateway_dyn: Arc<dyn DataGateway> = gateway.clone();
    let cache = Arc::new(QueryCache::new());
    let _gc = cache.spawn_gc(Duration::from_secs(60));

    let tasks = resources::assigned_tasks(Arc::clone(&cache), Arc::clone(&gateway_dyn));
    tasks.refresh().await?;
    let snapshot = tasks.snapshot();
    info!(
        total_items = snapshot.total_items(),
        total_pages = snapshot.total_pages(),
        "assigned tasks loaded"
    );

    tasks.set_page(2).await?;
    info!(page = tasks.snapshot().current_page, "after page flip");

    let pending = tasks
        .snapshot()
        .items()
        .iter()
        .find(|t| t.is_pending_verification())
        .cloned();
    if let Some(task) = pending {
        let verifier = Uuid::new_v4();
        let mut workflow =
            VerificationWorkflow::open(Arc::clone(&gateway_dyn), Arc::clone(&cache), &task);
        workflow.select_status(VerificationStatus::Verified);
        let verified = workflow.confirm(verifier).await?;
        info!(
            task = %verified.title,
            awarded = verified.actual_points_awarded.unwrap_or(0),
            "verified one task"
        );

        // The invalidated page refetches on next access.
        tasks.refresh().await?;
        let balance = gateway_dyn.fetch_student_balance(task.student_id).await?;
        info!(student_id = %task.student_id, balance, "student balance after award");
    }

    Ok(())
}

fn seeded_gateway() -> InMemoryGateway {
    let gateway = InMemoryGateway::new();
    for index in 0..6 {
        let student = gateway.add_student(&format!("Student {}", index), StudentStatus::Active);
        for task_index in 0..10 {
            gateway.add_task(make_pending_task(
                student.id,
                &format!("Practice piece {}", task_index),
                10,
            ));
        }
    }
    gateway
}
