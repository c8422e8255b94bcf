use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use etude::cache::{FetchOptions, Params, QueryCache, QueryKey};
use etude::controller::resources;
use etude::controller::{PageFetcher, PaginatedCollection, ResourceConfig};
use etude::domain::{Page, StudentStatus};
use etude::gateway::{DataGateway, GatewayError, GatewayResult};
use etude::test_helpers::InMemoryGateway;

fn seeded_students(count: usize) -> Arc<InMemoryGateway> {
    let gateway = InMemoryGateway::new();
    for index in 0..count {
        gateway.add_student(&format!("Student {:02}", index), StudentStatus::Active);
    }
    Arc::new(gateway)
}

fn students_controller(
    gateway: &Arc<InMemoryGateway>,
) -> (Arc<QueryCache>, PaginatedCollection<etude::domain::Student>) {
    let cache = Arc::new(QueryCache::new());
    let controller = resources::students(
        Arc::clone(&cache),
        Arc::clone(gateway) as Arc<dyn DataGateway>,
    );
    (cache, controller)
}

#[tokio::test]
async fn test_first_refresh_populates_snapshot() {
    let gateway = seeded_students(45);
    let (_cache, controller) = students_controller(&gateway);

    controller.refresh().await.unwrap();
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.current_page, 1);
    assert_eq!(snapshot.items().len(), 20);
    assert_eq!(snapshot.total_pages(), 3);
    assert_eq!(snapshot.total_items(), 45);
    assert!(!snapshot.is_loading);
    assert!(!snapshot.is_fetching);
    assert!(!snapshot.is_error);
}

#[tokio::test]
async fn test_set_page_clamps_to_known_bounds() {
    let gateway = seeded_students(45);
    let (_cache, controller) = students_controller(&gateway);

    // Nothing fetched yet: only page 1 is known to exist.
    controller.set_page(7).await.unwrap();
    assert_eq!(controller.snapshot().current_page, 1);

    controller.refresh().await.unwrap();

    controller.set_page(99).await.unwrap();
    assert_eq!(controller.snapshot().current_page, 3);

    controller.set_page(0).await.unwrap();
    assert_eq!(controller.snapshot().current_page, 1);
}

#[tokio::test]
async fn test_set_page_noop_when_unchanged() {
    let gateway = seeded_students(45);
    let (_cache, controller) = students_controller(&gateway);
    controller.refresh().await.unwrap();

    let before = controller.snapshot();
    controller.set_page(1).await.unwrap();
    let after = controller.snapshot();
    assert_eq!(before.current_page, after.current_page);
}

#[tokio::test]
async fn test_last_page_is_short() {
    let gateway = seeded_students(45);
    let (_cache, controller) = students_controller(&gateway);
    controller.refresh().await.unwrap();

    controller.set_page(3).await.unwrap();
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.items().len(), 5);
    assert_eq!(snapshot.current_page, 3);
}

#[tokio::test]
async fn test_filter_change_resets_to_page_one() {
    let gateway = seeded_students(45);
    gateway.add_student("Resting", StudentStatus::Inactive);
    let (_cache, controller) = students_controller(&gateway);

    controller.refresh().await.unwrap();
    controller.set_page(2).await.unwrap();
    assert_eq!(controller.snapshot().current_page, 2);

    controller.set_filter("status", "inactive").await.unwrap();
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.current_page, 1);
    assert_eq!(snapshot.items().len(), 1);
}

#[tokio::test]
async fn test_search_term_resets_to_page_one() {
    let gateway = seeded_students(45);
    let (_cache, controller) = students_controller(&gateway);

    controller.refresh().await.unwrap();
    controller.set_page(3).await.unwrap();

    controller.set_search_term("Student 04").await.unwrap();
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.current_page, 1);
    assert_eq!(snapshot.items().len(), 1);

    // Clearing the term also repositions to page 1.
    controller.set_page(2).await.unwrap();
    controller.set_search_term("").await.unwrap();
    assert_eq!(controller.snapshot().current_page, 1);
}

#[tokio::test]
async fn test_loading_and_fetching_flags_during_first_fetch() {
    let gateway = seeded_students(45);
    gateway.set_latency(Some(Duration::from_millis(80)));
    let (_cache, controller) = students_controller(&gateway);
    let controller = Arc::new(controller);

    let background = Arc::clone(&controller);
    let handle = tokio::spawn(async move { background.refresh().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = controller.snapshot();
    assert!(snapshot.is_loading, "no data yet: blocking spinner case");
    assert!(snapshot.is_fetching);

    handle.await.unwrap().unwrap();
    let snapshot = controller.snapshot();
    assert!(!snapshot.is_loading);
    assert!(!snapshot.is_fetching);
}

#[tokio::test]
async fn test_placeholder_data_shown_while_next_page_loads() {
    let cache = Arc::new(QueryCache::new());
    let mut delays = HashMap::new();
    delays.insert(2u32, Duration::from_millis(80));
    let controller = Arc::new(PaginatedCollection::new(
        Arc::clone(&cache),
        Arc::new(ScriptedPages {
            delays,
            total_items: 100,
        }),
        ResourceConfig::new("scripted", 10).without_prefetch(),
    ));
    controller.refresh().await.unwrap();

    let background = Arc::clone(&controller);
    let handle = tokio::spawn(async move { background.set_page(2).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = controller.snapshot();
    assert!(snapshot.is_placeholder_data, "old page shown during flip");
    assert!(!snapshot.is_loading, "placeholder is not the blocking case");
    assert!(snapshot.is_fetching);
    assert!(!snapshot.items().is_empty());

    handle.await.unwrap().unwrap();
    let snapshot = controller.snapshot();
    assert!(!snapshot.is_placeholder_data);
    assert_eq!(snapshot.current_page, 2);
}

#[tokio::test]
async fn test_background_revalidation_reports_fetching() {
    let cache = Arc::new(QueryCache::new());
    let mut delays = HashMap::new();
    delays.insert(1u32, Duration::from_millis(60));
    let controller = PaginatedCollection::new(
        Arc::clone(&cache),
        Arc::new(ScriptedPages {
            delays,
            total_items: 30,
        }),
        ResourceConfig::new("scripted", 10)
            .without_prefetch()
            .with_fetch_options(FetchOptions {
                stale_time: Duration::ZERO,
                gc_time: Duration::from_secs(60),
            }),
    );

    controller.refresh().await.unwrap();

    // stale_time zero: this refresh resolves from cache immediately and
    // leaves the revalidation running in the background.
    controller.refresh().await.unwrap();
    let snapshot = controller.snapshot();
    assert!(snapshot.page.is_some(), "stale data stays on screen");
    assert!(
        snapshot.is_fetching,
        "a background refetch must surface through is_fetching"
    );
    assert!(!snapshot.is_loading, "not the blocking spinner case");

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!controller.snapshot().is_fetching);
}

#[tokio::test]
async fn test_adjacent_pages_are_prefetched() {
    let gateway = seeded_students(45);
    let (cache, controller) = students_controller(&gateway);
    controller.refresh().await.unwrap();
    controller.set_page(2).await.unwrap();

    // Give the fire-and-forget prefetches time to commit.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let mut params = controller.filters();
    params.insert("limit".to_string(), 20u32.into());
    let key_for = |page: u32| {
        QueryKey::new(resources::STUDENTS)
            .with_params(params.clone())
            .with("page", page)
    };
    assert!(cache.peek(&key_for(1)).map_or(false, |e| e.has_data));
    assert!(cache.peek(&key_for(3)).map_or(false, |e| e.has_data));
}

/// Pages answer with scripted delays so response-ordering races are
/// reproducible.
struct ScriptedPages {
    delays: HashMap<u32, Duration>,
    total_items: u64,
}

#[async_trait]
impl PageFetcher<u32> for ScriptedPages {
    async fn fetch_page(&self, _params: &Params, page: u32, limit: u32) -> GatewayResult<Page<u32>> {
        if let Some(delay) = self.delays.get(&page) {
            tokio::time::sleep(*delay).await;
        }
        Ok(Page::new(vec![page], page, self.total_items, limit))
    }
}

#[tokio::test]
async fn test_stale_response_discarded_after_rapid_page_flips() {
    let cache = Arc::new(QueryCache::new());
    let mut delays = HashMap::new();
    delays.insert(2u32, Duration::from_millis(150));
    delays.insert(5u32, Duration::from_millis(10));
    let controller = Arc::new(PaginatedCollection::new(
        Arc::clone(&cache),
        Arc::new(ScriptedPages {
            delays,
            total_items: 100,
        }),
        ResourceConfig::new("scripted", 10).without_prefetch(),
    ));

    controller.refresh().await.unwrap();
    assert_eq!(controller.snapshot().total_pages(), 10);

    // Page 2 is slow; page 5 is requested afterwards and lands first.
    let slow = Arc::clone(&controller);
    let slow_flip = tokio::spawn(async move { slow.set_page(2).await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    controller.set_page(5).await.unwrap();

    slow_flip.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.current_page, 5, "late page-2 response must not win");
    assert_eq!(snapshot.items(), &[5]);
}

struct FailingPages;

#[async_trait]
impl PageFetcher<u32> for FailingPages {
    async fn fetch_page(&self, _params: &Params, page: u32, limit: u32) -> GatewayResult<Page<u32>> {
        if page == 2 {
            return Err(GatewayError::query("page 2 is unavailable"));
        }
        Ok(Page::new(vec![page], page, 30, limit))
    }
}

#[tokio::test]
async fn test_read_error_sets_error_state_and_renavigation_retries() {
    let cache = Arc::new(QueryCache::new());
    let controller = PaginatedCollection::new(
        Arc::clone(&cache),
        Arc::new(FailingPages),
        ResourceConfig::new("flaky", 10).without_prefetch(),
    );

    controller.refresh().await.unwrap();
    let result = controller.set_page(2).await;
    assert!(result.is_err());

    let snapshot = controller.snapshot();
    assert!(snapshot.is_error);
    assert!(snapshot.error.unwrap().to_string().contains("page 2 is unavailable"));
    assert!(snapshot.page.is_none(), "failing page shows the error state");

    // User-initiated re-navigation retries and recovers.
    controller.set_page(3).await.unwrap();
    let snapshot = controller.snapshot();
    assert!(!snapshot.is_error);
    assert_eq!(snapshot.items(), &[3]);
}

#[tokio::test]
async fn test_resource_variants_use_their_own_defaults() {
    let gateway = seeded_students(3);
    gateway.add_student("Paused", StudentStatus::Inactive);
    gateway.add_teacher("Ms. Reed", vec![]);
    gateway.add_parent("Pat");
    gateway.add_admin("Root");

    let cache = Arc::new(QueryCache::new());
    let dyn_gateway: Arc<dyn DataGateway> = Arc::clone(&gateway) as Arc<dyn DataGateway>;

    let students = resources::students(Arc::clone(&cache), Arc::clone(&dyn_gateway));
    students.refresh().await.unwrap();
    // Default student filter is status=active.
    assert_eq!(students.snapshot().total_items(), 3);

    let teachers = resources::teachers(Arc::clone(&cache), Arc::clone(&dyn_gateway));
    teachers.refresh().await.unwrap();
    assert_eq!(teachers.snapshot().total_items(), 1);

    let parents = resources::parents(Arc::clone(&cache), Arc::clone(&dyn_gateway));
    parents.refresh().await.unwrap();
    assert_eq!(parents.snapshot().total_items(), 1);

    let admins = resources::admins(Arc::clone(&cache), Arc::clone(&dyn_gateway));
    admins.refresh().await.unwrap();
    assert_eq!(admins.snapshot().total_items(), 1);
}

#[tokio::test]
async fn test_repeated_refresh_hits_cache() {
    let gateway = seeded_students(5);
    let (_cache, controller) = students_controller(&gateway);

    controller.refresh().await.unwrap();
    controller.refresh().await.unwrap();
    controller.refresh().await.unwrap();

    // 5 students fit one page, so no prefetches fire either.
    assert_eq!(gateway.student_query_count(), 1);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.total_items(), 5);
}
