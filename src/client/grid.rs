//! Paging and row virtualization for an infinitely scrolling grid.

use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
    client::{
        http::{ApiClient, PageSource},
        query_cache::{Freshness, QueryCache, QueryKey},
    },
    error::{FetchError, LayoutError},
    models::{MediaItem, MediaKey, MediaKind, Page, TimeWindow},
};

pub const TRENDING_QUERY: &str = "trending";

const DEFAULT_OVERSCAN: usize = 2;
const DEFAULT_PREFETCH_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    LoadingFirstPage,
    Ready,
    FetchingNextPage,
    /// Every page is loaded
    Exhausted,
    /// The last page request failed; loaded pages are kept
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    items_per_row: usize,
    row_height: f64,
    viewport_height: f64,
    /// Rows rendered beyond each edge of the viewport
    overscan: usize,
    /// Request the next page once the last visible row is this close to the end
    prefetch_threshold: usize,
}

impl GridLayout {
    /// Heights share one unit (pixels, points). Rows must be at least one
    /// unit tall.
    pub fn new(
        items_per_row: usize,
        row_height: f64,
        viewport_height: f64,
    ) -> Result<Self, LayoutError> {
        if items_per_row == 0 {
            return Err(LayoutError::NoColumns);
        }
        if !(row_height.is_finite() && row_height >= 1.0) {
            return Err(LayoutError::RowHeight(row_height));
        }
        if !(viewport_height.is_finite() && viewport_height >= 0.0) {
            return Err(LayoutError::ViewportHeight(viewport_height));
        }

        Ok(Self {
            items_per_row,
            row_height,
            viewport_height,
            overscan: DEFAULT_OVERSCAN,
            prefetch_threshold: DEFAULT_PREFETCH_THRESHOLD,
        })
    }

    pub fn items_per_row(&self) -> usize {
        self.items_per_row
    }

    pub fn row_height(&self) -> f64 {
        self.row_height
    }

    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    pub fn overscan(&self) -> usize {
        self.overscan
    }

    pub fn prefetch_threshold(&self) -> usize {
        self.prefetch_threshold
    }

    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    pub fn with_prefetch_threshold(mut self, threshold: usize) -> Self {
        self.prefetch_threshold = threshold;
        self
    }

    pub fn total_rows(&self, items: usize) -> usize {
        items.div_ceil(self.items_per_row)
    }
}

/// Half-open range of row indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<usize> {
        (!self.is_empty()).then(|| self.end - 1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridWindow {
    pub total_rows: usize,
    pub visible: RowRange,
    /// Visible rows plus overscan; the only rows to materialize
    pub rendered: RowRange,
}

impl GridWindow {
    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }
}

/// Synchronous grid state machine.
///
/// Methods that decide to load a page return its number; the caller performs
/// the fetch and reports back with [`receive_page`](Self::receive_page) or
/// [`fail_page`](Self::fail_page).
#[derive(Debug)]
pub struct GridController {
    layout: GridLayout,
    items: Vec<MediaItem>,
    seen: HashSet<MediaKey>,
    state: LoadState,
    loaded_page: u32,
    next_page: Option<u32>,
    requested: Option<u32>,
    error: Option<FetchError>,
}

impl GridController {
    pub fn new(layout: GridLayout) -> Self {
        Self {
            layout,
            items: Vec::new(),
            seen: HashSet::new(),
            state: LoadState::Idle,
            loaded_page: 0,
            next_page: Some(1),
            requested: None,
            error: None,
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: GridLayout) {
        self.layout = layout;
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub fn loaded_page(&self) -> u32 {
        self.loaded_page
    }

    pub fn has_next_page(&self) -> bool {
        self.next_page.is_some()
    }

    /// Loading finished with nothing to show
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && matches!(self.state, LoadState::Ready | LoadState::Exhausted)
    }

    /// Starts the first page load. Only valid from `Idle`.
    pub fn start(&mut self) -> Option<u32> {
        if self.state != LoadState::Idle {
            return None;
        }
        self.request(LoadState::LoadingFirstPage, 1)
    }

    fn request(&mut self, state: LoadState, page: u32) -> Option<u32> {
        self.state = state;
        self.requested = Some(page);
        Some(page)
    }

    /// Rows to show for a scroll position (in the same unit as the layout
    /// heights)
    pub fn window(&self, scroll_offset: f64) -> GridWindow {
        let total_rows = self.layout.total_rows(self.items.len());
        if total_rows == 0 {
            return GridWindow::default();
        }

        let row_height = self.layout.row_height;
        let top = scroll_offset.max(0.0);
        let bottom = top + self.layout.viewport_height;

        let first = ((top / row_height).floor() as usize).min(total_rows - 1);
        let end = ((bottom / row_height).ceil() as usize).clamp(first + 1, total_rows);

        GridWindow {
            total_rows,
            visible: RowRange { start: first, end },
            rendered: RowRange {
                start: first.saturating_sub(self.layout.overscan),
                end: (end + self.layout.overscan).min(total_rows),
            },
        }
    }

    /// Items of the given rows
    pub fn items_in(&self, rows: RowRange) -> &[MediaItem] {
        let per_row = self.layout.items_per_row;
        let start = (rows.start * per_row).min(self.items.len());
        let end = (rows.end * per_row).min(self.items.len());
        &self.items[start..end]
    }

    /// Re-evaluates the window for `scroll_offset` and returns the page to
    /// fetch, if the end of loaded data is near.
    ///
    /// Returns `None` while a page request is outstanding, so repeated calls
    /// before it resolves never issue a second request.
    pub fn on_scroll(&mut self, scroll_offset: f64) -> Option<u32> {
        if self.state != LoadState::Ready {
            return None;
        }
        let next = self.next_page?;

        let window = self.window(scroll_offset);
        let remaining = window.total_rows - window.visible.end;
        if remaining > self.layout.prefetch_threshold {
            return None;
        }

        tracing::debug!(page = next, remaining, "Requesting next grid page");
        self.request(LoadState::FetchingNextPage, next)
    }

    /// Appends a fetched page. Items already in the grid are skipped.
    ///
    /// Returns `false` for a page nobody is waiting for.
    pub fn receive_page(&mut self, page: Page<MediaItem>) -> bool {
        if self.requested != Some(page.page) {
            tracing::debug!(page = page.page, "Discarding unrequested grid page");
            return false;
        }

        let next_page = page.next_page();
        let received = page.results.len();
        for item in page.results {
            if self.seen.insert(item.key()) {
                self.items.push(item);
            }
        }

        self.loaded_page = page.page;
        self.next_page = next_page;
        self.requested = None;
        self.error = None;
        self.state = if next_page.is_some() {
            LoadState::Ready
        } else {
            LoadState::Exhausted
        };

        tracing::debug!(
            page = self.loaded_page,
            received,
            total = self.items.len(),
            "Grid page loaded"
        );
        true
    }

    /// Records a failed page request; loaded items stay
    pub fn fail_page(&mut self, page: u32, error: FetchError) {
        if self.requested != Some(page) {
            return;
        }
        tracing::warn!(page, error = %error, "Grid page failed");
        self.requested = None;
        self.error = Some(error);
        self.state = LoadState::Failed;
    }

    /// Re-requests the page that failed
    pub fn retry(&mut self) -> Option<u32> {
        if self.state != LoadState::Failed {
            return None;
        }
        let page = self.next_page?;
        let state = if self.loaded_page == 0 {
            LoadState::LoadingFirstPage
        } else {
            LoadState::FetchingNextPage
        };
        self.request(state, page)
    }
}

/// Drives a [`GridController`] against a [`PageSource`]
pub struct InfiniteGrid<P> {
    source: P,
    controller: Mutex<GridController>,
}

impl<P: PageSource> InfiniteGrid<P> {
    pub fn new(source: P, layout: GridLayout) -> Self {
        Self {
            source,
            controller: Mutex::new(GridController::new(layout)),
        }
    }

    fn controller(&self) -> MutexGuard<'_, GridController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the current grid state
    pub fn with_controller<R>(&self, f: impl FnOnce(&GridController) -> R) -> R {
        f(&self.controller())
    }

    pub fn state(&self) -> LoadState {
        self.controller().state()
    }

    pub fn window(&self, scroll_offset: f64) -> GridWindow {
        self.controller().window(scroll_offset)
    }

    pub fn len(&self) -> usize {
        self.controller().items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn load_first_page(&self) -> Result<(), FetchError> {
        let page = self.controller().start();
        match page {
            Some(page) => self.fetch(page).await,
            None => Ok(()),
        }
    }

    /// Returns the page fetched in response to the scroll, if any
    pub async fn on_scroll(&self, scroll_offset: f64) -> Result<Option<u32>, FetchError> {
        let page = self.controller().on_scroll(scroll_offset);
        match page {
            Some(page) => self.fetch(page).await.map(|_| Some(page)),
            None => Ok(None),
        }
    }

    pub async fn retry(&self) -> Result<(), FetchError> {
        let page = self.controller().retry();
        match page {
            Some(page) => self.fetch(page).await,
            None => Ok(()),
        }
    }

    async fn fetch(&self, page: u32) -> Result<(), FetchError> {
        match self.source.page(page).await {
            Ok(result) => {
                self.controller().receive_page(result);
                Ok(())
            }
            Err(e) => {
                self.controller().fail_page(page, e.clone());
                Err(e)
            }
        }
    }
}

/// Trending titles as a page source, read through the query cache
#[derive(Clone)]
pub struct TrendingPages {
    client: ApiClient,
    cache: QueryCache,
    kind: MediaKind,
    window: TimeWindow,
}

impl TrendingPages {
    pub fn new(client: ApiClient, cache: QueryCache, kind: MediaKind, window: TimeWindow) -> Self {
        Self {
            client,
            cache,
            kind,
            window,
        }
    }
}

#[async_trait::async_trait]
impl PageSource for TrendingPages {
    async fn page(&self, page: u32) -> Result<Page<MediaItem>, FetchError> {
        let (kind, window) = (self.kind, self.window);
        let client = self.client.clone();
        let key = QueryKey::new(TRENDING_QUERY, &(kind, window, page))?;

        self.cache
            .fetch_query(key, Freshness::Short, move || {
                let client = client.clone();
                async move { client.trending(kind, window, page).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::http::MockPageSource;
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    fn item(id: u64) -> MediaItem {
        MediaItem {
            id,
            kind: MediaKind::Movie,
            title: format!("Title {}", id),
            poster_path: None,
            release_date: None,
            vote_average: 0.0,
            genre_ids: vec![],
        }
    }

    /// Page `n` of `total` pages, 20 items each
    fn page(n: u32, total: u32) -> Page<MediaItem> {
        let first = u64::from(n - 1) * 20;
        Page {
            page: n,
            total_pages: total,
            total_results: u64::from(total) * 20,
            results: (first..first + 20).map(item).collect(),
        }
    }

    // 4 items per 100px row in a 300px viewport
    fn layout() -> GridLayout {
        GridLayout::new(4, 100.0, 300.0).unwrap()
    }

    #[test]
    fn test_layout_rejects_degenerate_geometry() {
        assert_eq!(GridLayout::new(0, 100.0, 300.0), Err(LayoutError::NoColumns));
        assert_eq!(GridLayout::new(4, 0.5, 300.0), Err(LayoutError::RowHeight(0.5)));
        assert!(matches!(
            GridLayout::new(4, f64::NAN, 300.0),
            Err(LayoutError::RowHeight(_))
        ));
        assert_eq!(
            GridLayout::new(4, 100.0, -1.0),
            Err(LayoutError::ViewportHeight(-1.0))
        );

        let tight = GridLayout::new(1, 1.0, 0.0).unwrap();
        assert_eq!(tight.row_height(), 1.0);
        assert_eq!(tight.total_rows(3), 3);
    }

    fn loaded(pages: u32, total: u32) -> GridController {
        let mut grid = GridController::new(layout());
        grid.start();
        grid.receive_page(page(1, total));
        for n in 2..=pages {
            grid.state = LoadState::FetchingNextPage;
            grid.requested = Some(n);
            grid.receive_page(page(n, total));
        }
        grid
    }

    #[test]
    fn test_empty_grid_window() {
        let grid = GridController::new(layout());
        let window = grid.window(500.0);
        assert!(window.is_empty());
        assert!(window.visible.is_empty());
        assert!(grid.items_in(window.rendered).is_empty());
    }

    #[test]
    fn test_first_page_lifecycle() {
        let mut grid = GridController::new(layout());
        assert_eq!(grid.state(), LoadState::Idle);

        assert_eq!(grid.start(), Some(1));
        assert_eq!(grid.state(), LoadState::LoadingFirstPage);
        assert_eq!(grid.start(), None);

        assert!(grid.receive_page(page(1, 3)));
        assert_eq!(grid.state(), LoadState::Ready);
        assert_eq!(grid.items().len(), 20);
    }

    #[test]
    fn test_window_with_overscan() {
        let grid = loaded(2, 5); // 40 items, 10 rows

        let top = grid.window(0.0);
        assert_eq!(top.total_rows, 10);
        assert_eq!(top.visible, RowRange { start: 0, end: 3 });
        assert_eq!(top.rendered, RowRange { start: 0, end: 5 });

        let middle = grid.window(450.0);
        assert_eq!(middle.visible, RowRange { start: 4, end: 8 });
        assert_eq!(middle.rendered, RowRange { start: 2, end: 10 });
        assert_eq!(grid.items_in(middle.visible).len(), 16);
        assert_eq!(grid.items_in(middle.visible)[0].id, 16);

        let past_end = grid.window(10_000.0);
        assert_eq!(past_end.visible, RowRange { start: 9, end: 10 });
    }

    #[test]
    fn test_next_page_requested_once_near_end() {
        let mut grid = loaded(1, 3); // 20 items, 5 rows

        // the last visible row is within 5 rows of the end
        assert_eq!(grid.on_scroll(0.0), Some(2));
        assert_eq!(grid.state(), LoadState::FetchingNextPage);

        // re-running the check before the fetch resolves must not re-request
        assert_eq!(grid.on_scroll(0.0), None);
        assert_eq!(grid.on_scroll(200.0), None);

        assert!(grid.receive_page(page(2, 3)));
        assert_eq!(grid.state(), LoadState::Ready);
        assert_eq!(grid.items().len(), 40);
    }

    #[test]
    fn test_no_request_far_from_end() {
        let mut grid = loaded(3, 10); // 60 items, 15 rows
        assert_eq!(grid.on_scroll(0.0), None);
        assert_eq!(grid.state(), LoadState::Ready);

        assert_eq!(grid.on_scroll(700.0), Some(4));
    }

    #[test]
    fn test_exhausted_after_last_page() {
        let mut grid = loaded(2, 2);
        assert_eq!(grid.state(), LoadState::Exhausted);
        assert_eq!(grid.on_scroll(10_000.0), None);
        assert!(!grid.has_next_page());
    }

    #[test]
    fn test_failure_keeps_loaded_items_and_retries() {
        let mut grid = loaded(1, 3);
        assert_eq!(grid.on_scroll(0.0), Some(2));

        grid.fail_page(
            2,
            FetchError::Status {
                status: 503,
                message: "unavailable".to_string(),
            },
        );
        assert_eq!(grid.state(), LoadState::Failed);
        assert_eq!(grid.items().len(), 20);
        assert!(grid.error().is_some());
        assert_eq!(grid.on_scroll(0.0), None);

        assert_eq!(grid.retry(), Some(2));
        assert_eq!(grid.state(), LoadState::FetchingNextPage);
        assert!(grid.receive_page(page(2, 3)));
        assert!(grid.error().is_none());
    }

    #[test]
    fn test_duplicates_across_pages_skipped() {
        let mut grid = loaded(1, 3);
        grid.on_scroll(0.0);

        // provider listings shift between requests, repeating an item
        let mut second = page(2, 3);
        second.results[0] = item(3);
        grid.receive_page(second);

        assert_eq!(grid.items().len(), 39);
        let unique: HashSet<MediaKey> = grid.items().iter().map(MediaItem::key).collect();
        assert_eq!(unique.len(), 39);
    }

    #[test]
    fn test_unrequested_page_discarded() {
        let mut grid = loaded(1, 3);
        assert!(!grid.receive_page(page(3, 3)));
        assert_eq!(grid.items().len(), 20);
    }

    #[test]
    fn test_empty_result_is_empty_state() {
        let mut grid = GridController::new(layout());
        grid.start();
        grid.receive_page(Page {
            page: 1,
            total_pages: 1,
            total_results: 0,
            results: vec![],
        });
        assert!(grid.is_empty());
        assert_eq!(grid.state(), LoadState::Exhausted);
    }

    #[tokio::test]
    async fn test_infinite_grid_loads_pages() {
        let mut source = MockPageSource::new();
        source.expect_page().times(2).returning(|n| Ok(page(n, 2)));

        let grid = InfiniteGrid::new(source, layout());
        grid.load_first_page().await.unwrap();
        assert_eq!(grid.len(), 20);

        assert_eq!(grid.on_scroll(0.0).await.unwrap(), Some(2));
        assert_eq!(grid.state(), LoadState::Exhausted);
        assert_eq!(grid.on_scroll(0.0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_page_failure_then_retry() {
        let mut source = MockPageSource::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(FetchError::Network("offline".to_string())));
        source
            .expect_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|n| Ok(page(n, 1)));

        let grid = InfiniteGrid::new(source, layout());
        assert!(grid.load_first_page().await.is_err());
        assert_eq!(grid.state(), LoadState::Failed);
        assert!(grid.is_empty());

        grid.retry().await.unwrap();
        assert_eq!(grid.len(), 20);
    }

    struct SlowPages {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl PageSource for SlowPages {
        async fn page(&self, n: u32) -> Result<Page<MediaItem>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(page(n, 10))
        }
    }

    #[tokio::test]
    async fn test_concurrent_scrolls_fetch_once() {
        let grid = Arc::new(InfiniteGrid::new(
            SlowPages {
                calls: AtomicU32::new(0),
            },
            layout(),
        ));
        grid.load_first_page().await.unwrap();

        let (a, b, c) = tokio::join!(
            grid.on_scroll(0.0),
            grid.on_scroll(0.0),
            grid.on_scroll(100.0)
        );
        let requested: Vec<u32> = [a, b, c]
            .into_iter()
            .filter_map(|result| result.unwrap())
            .collect();

        assert_eq!(requested, vec![2]);
        assert_eq!(grid.source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(grid.len(), 40);
    }
}
