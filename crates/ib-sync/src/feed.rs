//! Feed filter and paging state.

use ib_core::error::Result;
use ib_core::models::{Category, Idea};
use ib_core::query::{IdeaQuery, DEFAULT_PAGE_SIZE};
use ib_core::traits::IdeaRepo;
use tracing::debug;

/// Search box plus category chips. At most one chip is active; clicking the
/// active chip clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedFilter {
    text: Option<String>,
    category: Option<Category>,
}

impl FeedFilter {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// Blank text clears the search.
    pub fn set_text(&mut self, text: &str) {
        let text = text.trim();
        self.text = (!text.is_empty()).then(|| text.to_string());
    }

    pub fn toggle_category(&mut self, category: Category) {
        self.category = match self.category {
            Some(active) if active == category => None,
            _ => Some(category),
        };
    }

    pub fn query(&self, offset: usize, limit: usize) -> IdeaQuery {
        IdeaQuery {
            text: self.text.clone(),
            category: self.category,
            offset,
            limit,
        }
    }
}

/// Incrementally loaded feed ("load more").
#[derive(Debug, Clone)]
pub struct FeedPager {
    filter: FeedFilter,
    page_size: usize,
    loaded: Vec<Idea>,
    total: u64,
    has_more: bool,
}

impl FeedPager {
    pub fn new(filter: FeedFilter, page_size: usize) -> Self {
        Self {
            filter,
            page_size: page_size.max(1),
            loaded: Vec::new(),
            total: 0,
            has_more: false,
        }
    }

    pub fn with_default_page(filter: FeedFilter) -> Self {
        Self::new(filter, DEFAULT_PAGE_SIZE)
    }

    pub fn ideas(&self) -> &[Idea] {
        &self.loaded
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    /// Replaces the loaded ideas with the first page and the total count.
    pub async fn load_first(&mut self, repo: &dyn IdeaRepo) -> Result<&[Idea]> {
        let page = self.filter.query(0, self.page_size);
        let (ideas, total) = tokio::try_join!(repo.list_ideas(&page), repo.count_ideas(&page))?;

        let fetched = ideas.len() as u64;
        self.has_more = fetched >= self.page_size as u64 && fetched < total;
        self.total = total;
        self.loaded = ideas;
        debug!(fetched, total, has_more = self.has_more, "feed loaded");
        Ok(&self.loaded)
    }

    /// Appends the next page; returns only the newly loaded ideas.
    pub async fn load_more(&mut self, repo: &dyn IdeaRepo) -> Result<&[Idea]> {
        let start = self.loaded.len();
        let page = self.filter.query(start, self.page_size);
        let ideas = repo.list_ideas(&page).await?;

        self.loaded.extend(ideas);
        self.has_more = (self.loaded.len() as u64) < self.total;
        debug!(loaded = self.loaded.len(), total = self.total, "feed extended");
        Ok(&self.loaded[start..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ib_core::models::{Author, IdeaId};
    use ib_core::traits::MockIdeaRepo;

    fn ideas(range: std::ops::Range<usize>) -> Vec<Idea> {
        range
            .map(|n| Idea {
                id: IdeaId::new(format!("idea-{n}")),
                title: format!("Idea {n}"),
                slug: format!("idea-{n}"),
                category: Category::Other,
                body: "body".into(),
                notes: None,
                author: Author::anonymous(),
                published_at: Utc::now(),
                vote_tally: 0,
                comments_count: 0,
            })
            .collect()
    }

    #[test]
    fn category_chip_toggles() {
        let mut filter = FeedFilter::default();
        filter.toggle_category(Category::Health);
        assert_eq!(filter.category(), Some(Category::Health));
        filter.toggle_category(Category::Business);
        assert_eq!(filter.category(), Some(Category::Business));
        filter.toggle_category(Category::Business);
        assert_eq!(filter.category(), None);
    }

    #[test]
    fn blank_search_clears_text() {
        let mut filter = FeedFilter::default();
        filter.set_text("  solar ");
        assert_eq!(filter.text(), Some("solar"));
        filter.set_text("   ");
        assert_eq!(filter.text(), None);
    }

    #[tokio::test]
    async fn pager_tracks_has_more() {
        let mut repo = MockIdeaRepo::new();
        repo.expect_count_ideas().returning(|_| Ok(5));
        repo.expect_list_ideas()
            .returning(|q| Ok(ideas(q.offset..(q.offset + q.limit).min(5))));

        let mut pager = FeedPager::new(FeedFilter::default(), 2);
        assert_eq!(pager.load_first(&repo).await.unwrap().len(), 2);
        assert!(pager.has_more());

        assert_eq!(pager.load_more(&repo).await.unwrap().len(), 2);
        assert!(pager.has_more());

        let last = pager.load_more(&repo).await.unwrap();
        assert_eq!(last[0].id, IdeaId::from("idea-4"));
        assert!(!pager.has_more());
        assert_eq!(pager.ideas().len(), 5);
    }

    #[tokio::test]
    async fn short_first_page_has_no_more() {
        let mut repo = MockIdeaRepo::new();
        repo.expect_count_ideas().returning(|_| Ok(3));
        repo.expect_list_ideas().returning(|_| Ok(ideas(0..3)));

        let mut pager = FeedPager::with_default_page(FeedFilter::default());
        pager.load_first(&repo).await.unwrap();
        assert!(!pager.has_more());
        assert_eq!(pager.total(), 3);
    }
}
