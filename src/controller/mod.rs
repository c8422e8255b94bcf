pub mod resources;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{
    CacheError, FetchOptions, ParamValue, Params, QueryCache, QueryKey, Subscription,
};
use crate::domain::Page;
use crate::gateway::GatewayResult;

/// Fetches one page of one resource. Adapters in [`resources`] translate the
/// controller's stringly param map into the gateway's typed filters.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(&self, params: &Params, page: u32, limit: u32) -> GatewayResult<Page<T>>;
}

/// Per-resource configuration; the six resource variants differ only in
/// these values, never in controller logic.
#[derive(Clone)]
pub struct ResourceConfig {
    pub resource: &'static str,
    pub limit: u32,
    pub default_params: Params,
    pub prefetch_adjacent: bool,
    pub fetch_options: FetchOptions,
}

impl ResourceConfig {
    pub fn new(resource: &'static str, limit: u32) -> Self {
        Self {
            resource,
            limit,
            default_params: Params::new(),
            prefetch_adjacent: true,
            fetch_options: FetchOptions::default(),
        }
    }

    pub fn with_default_param(
        mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Self {
        self.default_params.insert(name.into(), value.into());
        self
    }

    pub fn without_prefetch(mut self) -> Self {
        self.prefetch_adjacent = false;
        self
    }

    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = options;
        self
    }
}

/// What a view reads each render.
#[derive(Clone)]
pub struct CollectionSnapshot<T> {
    pub page: Option<Arc<Page<T>>>,
    pub current_page: u32,
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_placeholder_data: bool,
    pub is_error: bool,
    pub error: Option<CacheError>,
}

impl<T> CollectionSnapshot<T> {
    pub fn items(&self) -> &[T] {
        self.page.as_ref().map_or(&[], |p| p.items.as_slice())
    }

    pub fn total_pages(&self) -> u32 {
        self.page.as_ref().map_or(1, |p| p.total_pages)
    }

    pub fn total_items(&self) -> u64 {
        self.page.as_ref().map_or(0, |p| p.total_items)
    }
}

struct State<T> {
    current_page: u32,
    // Survives a cleared page_data so error recovery can still navigate.
    known_total_pages: u32,
    params: Params,
    page_data: Option<Arc<Page<T>>>,
    is_loading: bool,
    is_fetching: bool,
    is_placeholder: bool,
    error: Option<CacheError>,
    generation: u64,
    subscription: Option<Subscription>,
}

/// Navigable, filterable view over one paged resource.
///
/// Owns the current page number and active filters, derives the query key,
/// resolves data through the shared [`QueryCache`], and prefetches adjacent
/// pages once the current page settles. Every navigation bumps an internal
/// generation; a fetch that completes after a newer one was issued is
/// discarded, so rapid page flipping never regresses the visible page.
pub struct PaginatedCollection<T> {
    cache: Arc<QueryCache>,
    fetcher: Arc<dyn PageFetcher<T>>,
    config: ResourceConfig,
    state: Mutex<State<T>>,
}

impl<T: Send + Sync + 'static> PaginatedCollection<T> {
    pub fn new(
        cache: Arc<QueryCache>,
        fetcher: Arc<dyn PageFetcher<T>>,
        config: ResourceConfig,
    ) -> Self {
        let state = State {
            current_page: 1,
            known_total_pages: 1,
            params: config.default_params.clone(),
            page_data: None,
            is_loading: false,
            is_fetching: false,
            is_placeholder: false,
            error: None,
            generation: 0,
            subscription: None,
        };
        Self {
            cache,
            fetcher,
            config,
            state: Mutex::new(state),
        }
    }

    pub fn resource(&self) -> &'static str {
        self.config.resource
    }

    pub fn snapshot(&self) -> CollectionSnapshot<T> {
        let state = self.state.lock();
        // A stale hit resolves immediately while the revalidation is still
        // in flight; the cache knows about that fetch, the state does not.
        let revalidating = self
            .cache
            .is_fetching(&self.key_for(&state.params, state.current_page));
        CollectionSnapshot {
            page: state.page_data.clone(),
            current_page: state.current_page,
            is_loading: state.is_loading,
            is_fetching: state.is_fetching || revalidating,
            is_placeholder_data: state.is_placeholder,
            is_error: state.error.is_some(),
            error: state.error.clone(),
        }
    }

    pub fn filters(&self) -> Params {
        self.state.lock().params.clone()
    }

    /// Navigate to `page`, clamped to `[1, last known total_pages]` (1 when
    /// nothing has been fetched yet). No-op when the page is unchanged.
    pub async fn set_page(&self, page: u32) -> Result<(), CacheError> {
        {
            let mut state = self.state.lock();
            let clamped = page.clamp(1, state.known_total_pages.max(1));
            if clamped == state.current_page {
                return Ok(());
            }
            debug!(resource = self.config.resource, page = clamped, "page change");
            state.current_page = clamped;
            state.is_placeholder = state.page_data.is_some();
        }
        self.refresh().await
    }

    /// Update one filter value. The current position is meaningless in a
    /// different result set, so this resets to page 1 — exactly once, with a
    /// single refetch.
    pub async fn set_filter(
        &self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Result<(), CacheError> {
        {
            let mut state = self.state.lock();
            state.params.insert(name.into(), value.into());
            state.current_page = 1;
            state.is_placeholder = state.page_data.is_some();
        }
        self.refresh().await
    }

    pub async fn clear_filter(&self, name: &str) -> Result<(), CacheError> {
        {
            let mut state = self.state.lock();
            state.params.remove(name);
            state.current_page = 1;
            state.is_placeholder = state.page_data.is_some();
        }
        self.refresh().await
    }

    /// Convenience for the free-text filter; an empty term clears it.
    pub async fn set_search_term(&self, term: impl Into<String>) -> Result<(), CacheError> {
        let term = term.into();
        if term.is_empty() {
            self.clear_filter("search").await
        } else {
            self.set_filter("search", term).await
        }
    }

    /// Fetch the current (page, filters) key through the cache and apply the
    /// result, unless a newer navigation superseded this one meanwhile.
    pub async fn refresh(&self) -> Result<(), CacheError> {
        let (key, params, page, generation) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.is_fetching = true;
            state.is_loading = state.page_data.is_none();
            state.error = None;
            (
                self.key_for(&state.params, state.current_page),
                state.params.clone(),
                state.current_page,
                state.generation,
            )
        };

        let subscription = self.cache.subscribe(key.clone());
        let fetcher = Arc::clone(&self.fetcher);
        let limit = self.config.limit;
        let fetch_params = params.clone();
        let result = self
            .cache
            .fetch::<Page<T>, _, _>(key, self.config.fetch_options, move || async move {
                fetcher.fetch_page(&fetch_params, page, limit).await
            })
            .await;

        let applied = {
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!(
                    resource = self.config.resource,
                    page, "discarding superseded page fetch"
                );
                None
            } else {
                state.is_fetching = false;
                state.is_loading = false;
                state.is_placeholder = false;
                state.subscription = Some(subscription);
                match result {
                    Ok(page_data) => {
                        state.error = None;
                        state.known_total_pages = page_data.total_pages;
                        state.page_data = Some(Arc::clone(&page_data));
                        Some(Ok(page_data))
                    }
                    Err(error) => {
                        state.page_data = None;
                        state.error = Some(error.clone());
                        Some(Err(error))
                    }
                }
            }
        };

        match applied {
            Some(Ok(page_data)) => {
                if self.config.prefetch_adjacent {
                    self.prefetch_adjacent(&params, page, page_data.total_pages);
                }
                Ok(())
            }
            Some(Err(error)) => Err(error),
            // Superseded: the newer navigation owns the visible state.
            None => Ok(()),
        }
    }

    fn key_for(&self, params: &Params, page: u32) -> QueryKey {
        QueryKey::new(self.config.resource)
            .with_params(params.clone())
            .with("page", page)
            .with("limit", self.config.limit)
    }

    /// Warm the neighbouring pages with identical filters so page flips can
    /// resolve from cache.
    fn prefetch_adjacent(&self, params: &Params, page: u32, total_pages: u32) {
        let mut targets = Vec::new();
        if page > 1 {
            targets.push(page - 1);
        }
        if page < total_pages {
            targets.push(page + 1);
        }
        for target in targets {
            let key = self.key_for(params, target);
            let fetcher = Arc::clone(&self.fetcher);
            let fetch_params = params.clone();
            let limit = self.config.limit;
            self.cache.prefetch::<Page<T>, _, _>(
                key,
                self.config.fetch_options,
                move || async move { fetcher.fetch_page(&fetch_params, target, limit).await },
            );
        }
    }
}
