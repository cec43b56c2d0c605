// History query engine: filterable, server-paginated session history with
// a query-keyed cache and explicit prefix invalidation.
//
// The engine owns the current query state and the cache; nothing else
// mutates either. Mutations elsewhere signal invalidation, after which the
// next read is a fresh fetch.

pub mod debounce;

pub use debounce::{Debouncer, DEFAULT_QUIET_MS};

use crate::api::{ApiClient, ApiError};
use crate::models::PagedHistory;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Default page size, matching the backend's paged-history default
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Cache key prefix for paged history entries
pub const HISTORY_FAMILY: &str = "history:";
/// Cache key for the category list
pub const CATEGORIES_KEY: &str = "categories";

/// Sentinel sent when no category filter is active
pub const ALL_CATEGORIES: &str = "All";

/// Identity of one history read. Equal queries share a cache slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Multi-select category filter; empty means "All"
    pub categories: BTreeSet<String>,
    /// Trimmed search text
    pub search: String,
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
}

impl HistoryQuery {
    pub fn new(limit: u32) -> Self {
        Self {
            categories: BTreeSet::new(),
            search: String::new(),
            page: 1,
            limit,
        }
    }

    /// Comma-joined category list, or the `All` sentinel when empty
    pub fn category_param(&self) -> String {
        if self.categories.is_empty() {
            ALL_CATEGORIES.to_string()
        } else {
            self.categories.iter().cloned().collect::<Vec<_>>().join(",")
        }
    }

    /// Query-string pairs for `/research/history/paged`. The search term is
    /// included only when non-empty after trimming.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("category", self.category_param())];
        let search = self.search.trim();
        if !search.is_empty() {
            params.push(("search", search.to_string()));
        }
        params.push(("page", self.page.to_string()));
        params.push(("limit", self.limit.to_string()));
        params
    }

    /// Stable cache key within the history family
    pub fn cache_key(&self) -> String {
        format!(
            "{}cat={}:search={}:page={}:limit={}",
            HISTORY_FAMILY,
            self.category_param(),
            self.search.trim(),
            self.page,
            self.limit
        )
    }
}

enum CacheEntry {
    History(PagedHistory),
    Categories(Vec<String>),
}

/// Cache keyed by query identity with prefix invalidation
pub struct QueryCache {
    entries: HashMap<String, CacheEntry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get_history(&self, key: &str) -> Option<&PagedHistory> {
        match self.entries.get(key) {
            Some(CacheEntry::History(page)) => Some(page),
            _ => None,
        }
    }

    pub fn put_history(&mut self, key: String, page: PagedHistory) {
        self.entries.insert(key, CacheEntry::History(page));
    }

    pub fn get_categories(&self) -> Option<&Vec<String>> {
        match self.entries.get(CATEGORIES_KEY) {
            Some(CacheEntry::Categories(list)) => Some(list),
            _ => None,
        }
    }

    pub fn put_categories(&mut self, list: Vec<String>) {
        self.entries
            .insert(CATEGORIES_KEY.to_string(), CacheEntry::Categories(list));
    }

    /// Drop every entry whose key starts with `prefix`
    pub fn invalidate(&mut self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the current history view: filter state, pagination, cache, and the
/// last page loaded (which doubles as the CSV fallback data source).
pub struct HistoryEngine {
    api: Arc<ApiClient>,
    cache: QueryCache,
    query: HistoryQuery,
    /// totalPages of the last applied result; pagination is
    /// server-authoritative so this is trusted as-is
    total_pages: u32,
    last_page: Option<PagedHistory>,
}

impl HistoryEngine {
    pub fn new(api: Arc<ApiClient>, limit: u32) -> Self {
        Self {
            api,
            cache: QueryCache::new(),
            query: HistoryQuery::new(limit),
            total_pages: 1,
            last_page: None,
        }
    }

    pub fn query(&self) -> &HistoryQuery {
        &self.query
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// The currently loaded page, if any; the export fallback reads this
    /// rather than re-fetching the unpaginated set
    pub fn current_items(&self) -> &[crate::models::ResearchSession] {
        self.last_page.as_ref().map(|p| p.items.as_slice()).unwrap_or(&[])
    }

    /// Toggle a category in the multi-select filter. Resets to page 1.
    pub fn toggle_category(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        if !self.query.categories.remove(name) {
            self.query.categories.insert(name.to_string());
        }
        self.query.page = 1;
    }

    /// Clear the category filter back to "All". Resets to page 1.
    pub fn clear_categories(&mut self) {
        self.query.categories.clear();
        self.query.page = 1;
    }

    /// Commit a settled search value (from the debouncer). Resets to page 1.
    pub fn commit_search(&mut self, value: &str) {
        self.query.search = value.trim().to_string();
        self.query.page = 1;
    }

    pub fn can_prev(&self) -> bool {
        self.query.page > 1
    }

    pub fn can_next(&self) -> bool {
        self.query.page < self.total_pages
    }

    /// Move to the next page if the last result says one exists
    pub fn next_page(&mut self) -> bool {
        if self.can_next() {
            self.query.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.can_prev() {
            self.query.page -= 1;
            true
        } else {
            false
        }
    }

    /// Fetch the current page, serving from cache when the identical query
    /// was already loaded and not invalidated since.
    pub async fn fetch_page(&mut self) -> Result<PagedHistory, ApiError> {
        let key = self.query.cache_key();
        if let Some(cached) = self.cache.get_history(&key) {
            log::debug!("history cache hit: {}", key);
            let page = cached.clone();
            self.apply_result(&page);
            return Ok(page);
        }

        let page = self.api.history_paged(&self.query).await?;
        self.apply_result(&page);
        self.cache.put_history(key, page.clone());
        Ok(page)
    }

    /// Fetch the category list, cached until invalidated
    pub async fn fetch_categories(&mut self) -> Result<Vec<String>, ApiError> {
        if let Some(cached) = self.cache.get_categories() {
            return Ok(cached.clone());
        }
        let list = self.api.categories().await?;
        self.cache.put_categories(list.clone());
        Ok(list)
    }

    /// Adopt a server result: trust total/totalPages and keep the page
    /// number inside 1..=max(totalPages, 1)
    fn apply_result(&mut self, page: &PagedHistory) {
        self.total_pages = page.total_pages.max(1);
        if self.query.page > self.total_pages {
            self.query.page = self.total_pages;
        }
        self.last_page = Some(page.clone());
    }

    /// Called after a successful mutation elsewhere: the next history and
    /// category reads must hit the network again.
    pub fn invalidate_after_mutation(&mut self) {
        self.cache.invalidate(HISTORY_FAMILY);
        self.cache.invalidate(CATEGORIES_KEY);
        log::debug!("history and category caches invalidated");
    }
}
