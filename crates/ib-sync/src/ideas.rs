//! Idea authoring, detail and profile use-cases.
//!
//! Unlike votes and comments these are not optimistic: the caller waits for
//! the store and shows the result.

use std::sync::Arc;

use ib_core::error::{AppError, Result};
use ib_core::models::{validate_bio_text, Author, AuthenticatedUser, Bio, Idea, IdeaDraft, IdeaId, UserId};
use ib_core::traits::IdeaRepo;
use serde::Serialize;
use tracing::info;

use crate::feed::FeedPager;

/// Author page: their ideas, newest first, and an optional bio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorProfile {
    pub author: Author,
    pub ideas: Vec<Idea>,
    pub bio: Option<Bio>,
}

#[derive(Clone)]
pub struct IdeaService {
    repo: Arc<dyn IdeaRepo>,
}

impl IdeaService {
    pub fn new(repo: Arc<dyn IdeaRepo>) -> Self {
        Self { repo }
    }

    /// Loads the first page into `pager`, then keeps loading until `page`
    /// (1-based) is reached. Returns that page's ideas, empty past the end.
    pub async fn feed_page(&self, pager: &mut FeedPager, page: usize) -> Result<Vec<Idea>> {
        let repo = self.repo.as_ref();
        let mut shown = pager.load_first(repo).await?.to_vec();
        for _ in 1..page.max(1) {
            if !pager.has_more() {
                return Ok(Vec::new());
            }
            shown = pager.load_more(repo).await?.to_vec();
        }
        Ok(shown)
    }

    pub async fn idea_detail(&self, id: &IdeaId) -> Result<Idea> {
        self.repo
            .get_idea(id)
            .await?
            .ok_or_else(|| AppError::not_found("idea", id))
    }

    pub async fn create_idea(&self, user: &AuthenticatedUser, draft: IdeaDraft) -> Result<Idea> {
        let draft = draft.validated()?;
        let idea = self.repo.create_idea(draft, user.as_author()).await?;
        info!(id = %idea.id, author = %user.id, "idea created");
        Ok(idea)
    }

    /// Only the author may edit; id, author and publication time never change.
    pub async fn update_idea(
        &self,
        user: &AuthenticatedUser,
        id: &IdeaId,
        draft: IdeaDraft,
    ) -> Result<Idea> {
        let draft = draft.validated()?;
        let existing = self.idea_detail(id).await?;
        if existing.author.id != user.id {
            return Err(AppError::Unauthorized(
                "Only the author can edit this idea".into(),
            ));
        }
        let idea = self.repo.update_idea(id, draft).await?;
        info!(%id, author = %user.id, "idea updated");
        Ok(idea)
    }

    pub async fn author_profile(&self, author_id: &UserId) -> Result<AuthorProfile> {
        let (mut ideas, bio) = tokio::try_join!(
            self.repo.ideas_by_author(author_id),
            self.repo.get_bio(author_id)
        )?;
        ideas.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let author = ideas
            .first()
            .map(|i| i.author.clone())
            .or_else(|| bio.as_ref().map(|b| b.author.clone()))
            .ok_or_else(|| AppError::not_found("author", author_id))?;

        Ok(AuthorProfile { author, ideas, bio })
    }

    /// Creates the user's bio on first save, updates it afterwards.
    pub async fn save_bio(&self, user: &AuthenticatedUser, text: &str) -> Result<Bio> {
        let text = validate_bio_text(text)?;
        match self.repo.get_bio(&user.id).await? {
            Some(existing) => self.repo.update_bio(&existing.id, text).await,
            None => self.repo.create_bio(text, user.as_author()).await,
        }
    }
}
