//! # Mutation Coordinator
//!
//! The single entry point for vote and comment mutations. Each action moves
//! through `Idle → Optimistic → Settled`:
//!
//! 1. `submit_*` validates, records the optimistic entry and returns a
//!    dispatch handle. The display already shows the new state.
//! 2. The handle's `run` performs the remote write.
//! 3. On success the entry is confirmed and a refresh retires it; on failure
//!    it is rolled back to the intent it replaced, if any, and the error is
//!    returned for an inline message.
//!
//! A newer vote click supersedes an older one. An older dispatch that has not
//! been sent yet is cancelled; one already in flight resolves without
//! touching the newer intent. When the last write for a key resolves, the
//! coordinator refreshes and, if a late stale write left the store showing
//! something else, re-asserts the latest intent once.

use std::sync::Arc;

use chrono::Duration;
use ib_core::error::{AppError, Result};
use ib_core::models::{
    validate_comment_text, Author, AuthenticatedUser, Comment, CommentId, CommentOrder, IdeaId,
    UserId, VoteDirection,
};
use ib_core::traits::EngagementRepo;
use tracing::{debug, info, warn};

use crate::cache::{EntityCache, Refreshed};
use crate::ledger::{
    CommentResolution, CommentTicket, OptimisticLedger, Reassert, VoteResolution, VoteSettlement,
    VoteTicket, WriteOutcome,
};
use crate::reconciler::{DisplayState, Reconciler};

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Tolerance when matching an optimistic comment to a stored one
    pub comment_dedup_window: Duration,
    /// Order requested when refreshing the comment panel
    pub comment_order: CommentOrder,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            comment_dedup_window: Duration::seconds(60),
            comment_order: CommentOrder::NewestFirst,
        }
    }
}

struct Inner {
    store: Arc<dyn EngagementRepo>,
    cache: EntityCache,
    ledger: OptimisticLedger,
    reconciler: Reconciler,
    comment_order: CommentOrder,
}

/// Cheap to clone; clones share the cache and the ledger.
#[derive(Clone)]
pub struct MutationCoordinator {
    inner: Arc<Inner>,
}

impl MutationCoordinator {
    pub fn new(store: Arc<dyn EngagementRepo>, options: SyncOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                cache: EntityCache::new(),
                ledger: OptimisticLedger::new(),
                reconciler: Reconciler::new(options.comment_dedup_window),
                comment_order: options.comment_order,
            }),
        }
    }

    pub fn cache(&self) -> &EntityCache {
        &self.inner.cache
    }

    pub fn ledger(&self) -> &OptimisticLedger {
        &self.inner.ledger
    }

    /// What the UI shows for `idea` right now.
    pub fn display(&self, idea: &IdeaId, viewer: Option<&AuthenticatedUser>) -> DisplayState {
        let snapshot = self.inner.cache.snapshot(idea);
        let ledger = self.inner.ledger.snapshot(idea);
        self.inner
            .reconciler
            .display(idea, &snapshot, &ledger, viewer.map(|u| &u.id))
    }

    /// Records the click and returns the write to perform.
    ///
    /// Anonymous viewers are rejected before anything is recorded.
    pub fn submit_vote(
        &self,
        idea: &IdeaId,
        viewer: Option<&AuthenticatedUser>,
        clicked: VoteDirection,
    ) -> Result<VoteDispatch> {
        let Some(user) = viewer else {
            warn!(%idea, "vote rejected: viewer is not signed in");
            return Err(AppError::Unauthorized("Sign in to vote".into()));
        };

        let displayed = self.display(idea, Some(user)).direction;
        let ticket = self
            .inner
            .ledger
            .apply_vote_intent(idea, &user.id, clicked, displayed);

        Ok(VoteDispatch {
            coordinator: self.clone(),
            optimistic: self.display(idea, Some(user)),
            ticket,
            voter: user.clone(),
            unresolved: true,
        })
    }

    /// `submit_vote` followed by the write.
    pub async fn vote(
        &self,
        idea: &IdeaId,
        viewer: Option<&AuthenticatedUser>,
        clicked: VoteDirection,
    ) -> Result<DisplayState> {
        self.submit_vote(idea, viewer, clicked)?.run().await
    }

    /// Validates the text and shows the comment at the top of the panel.
    /// Signed-out viewers comment as the anonymous author.
    pub fn submit_comment(
        &self,
        idea: &IdeaId,
        viewer: Option<&AuthenticatedUser>,
        text: &str,
    ) -> Result<CommentDispatch> {
        let text = validate_comment_text(text)?;
        let author = viewer
            .map(AuthenticatedUser::as_author)
            .unwrap_or_else(Author::anonymous);
        let (ticket, draft) = self
            .inner
            .ledger
            .insert_optimistic_comment(idea, text, author);

        Ok(CommentDispatch {
            coordinator: self.clone(),
            optimistic: self.display(idea, viewer),
            ticket,
            draft,
            viewer: viewer.cloned(),
            unresolved: true,
        })
    }

    pub async fn comment(
        &self,
        idea: &IdeaId,
        viewer: Option<&AuthenticatedUser>,
        text: &str,
    ) -> Result<DisplayState> {
        self.submit_comment(idea, viewer, text)?.run().await
    }

    /// Fetches tally, the viewer's vote and the comment list, stores them,
    /// and retires whatever the fetch now represents. Other ideas are not
    /// touched.
    pub async fn refresh(
        &self,
        idea: &IdeaId,
        viewer: Option<&AuthenticatedUser>,
    ) -> Result<DisplayState> {
        let store = &self.inner.store;
        let order = self.inner.comment_order;
        let viewer_vote = async {
            match viewer {
                Some(user) => store
                    .user_vote(idea, &user.id)
                    .await
                    .map(|vote| Some((user.id.clone(), vote))),
                None => Ok(None),
            }
        };

        let (tally, viewer_vote, comments) = tokio::try_join!(
            store.vote_tally(idea),
            viewer_vote,
            store.list_comments(idea, order),
        )?;

        self.inner.cache.apply(
            idea,
            Refreshed {
                tally: Some(tally),
                viewer_vote,
                comments: Some((order, comments)),
            },
        );
        self.retire(idea);
        Ok(self.display(idea, viewer))
    }

    async fn refresh_votes(&self, idea: &IdeaId, user: &UserId) -> Result<()> {
        let store = &self.inner.store;
        let (tally, vote) = tokio::try_join!(store.vote_tally(idea), store.user_vote(idea, user))?;
        self.inner.cache.apply(
            idea,
            Refreshed {
                tally: Some(tally),
                viewer_vote: Some((user.clone(), vote)),
                comments: None,
            },
        );
        self.retire(idea);
        Ok(())
    }

    async fn refresh_comments(&self, idea: &IdeaId) -> Result<()> {
        let order = self.inner.comment_order;
        let comments = self.inner.store.list_comments(idea, order).await?;
        self.inner.cache.apply(
            idea,
            Refreshed {
                tally: None,
                viewer_vote: None,
                comments: Some((order, comments)),
            },
        );
        self.retire(idea);
        Ok(())
    }

    fn retire(&self, idea: &IdeaId) {
        let snapshot = self.inner.cache.snapshot(idea);
        let retired = self
            .inner
            .ledger
            .update(idea, |ledger| self.inner.reconciler.retire(&snapshot, ledger));
        if retired.votes > 0 || retired.comments > 0 {
            debug!(%idea, votes = retired.votes, comments = retired.comments, "retired optimistic entries");
        }
    }

    async fn write_vote(&self, ticket: &VoteTicket, voter: &AuthenticatedUser) -> Result<()> {
        match ticket.direction {
            Some(direction) => {
                self.inner
                    .store
                    .set_vote(&ticket.idea, &voter.as_author(), direction)
                    .await
            }
            None => self.inner.store.clear_vote(&ticket.idea, &voter.id).await,
        }
    }

    /// Runs once no write for (idea, voter) is outstanding. Failures here
    /// only affect freshness, so they are logged rather than returned.
    async fn settle_vote(&self, idea: &IdeaId, voter: &AuthenticatedUser) {
        if let Err(err) = self.try_settle_vote(idea, voter).await {
            warn!(%idea, user = %voter.id, error = %err, "could not confirm vote against the store");
        }
    }

    async fn try_settle_vote(&self, idea: &IdeaId, voter: &AuthenticatedUser) -> Result<()> {
        self.refresh_votes(idea, &voter.id).await?;

        let stored = self.inner.cache.snapshot(idea).vote_of(&voter.id);
        let ticket = match self.inner.ledger.reassert_unreflected(idea, &voter.id, stored) {
            Reassert::NotNeeded => return Ok(()),
            Reassert::Abandoned => {
                warn!(%idea, user = %voter.id, "store disagrees with confirmed vote; showing stored state");
                return Ok(());
            }
            Reassert::Reissue(ticket) => ticket,
        };

        info!(%idea, user = %voter.id, direction = ?ticket.direction, "re-asserting latest vote after a late stale write");
        let result = self.write_vote(&ticket, voter).await;
        let outcome = if result.is_ok() {
            WriteOutcome::Succeeded
        } else {
            WriteOutcome::Failed
        };
        let settlement = self.inner.ledger.resolve_vote(&ticket, outcome);
        result?;

        if settlement.settled {
            self.refresh_votes(idea, &voter.id).await?;
            let stored = self.inner.cache.snapshot(idea).vote_of(&voter.id);
            if let Reassert::Abandoned =
                self.inner.ledger.reassert_unreflected(idea, &voter.id, stored)
            {
                warn!(%idea, user = %voter.id, "store still disagrees after re-assert; showing stored state");
            }
        }
        Ok(())
    }
}

/// A recorded vote intent whose write has not been performed yet.
///
/// Dropping the dispatch, or the future returned by `run`, before the write
/// resolves counts as a cancelled write: the intent is rolled back.
#[must_use = "the vote is only shown locally until the dispatch runs"]
pub struct VoteDispatch {
    coordinator: MutationCoordinator,
    ticket: VoteTicket,
    voter: AuthenticatedUser,
    optimistic: DisplayState,
    unresolved: bool,
}

impl VoteDispatch {
    /// Display right after the click, before any I/O.
    pub fn optimistic(&self) -> &DisplayState {
        &self.optimistic
    }

    pub fn ticket(&self) -> &VoteTicket {
        &self.ticket
    }

    fn resolve(&mut self, outcome: WriteOutcome) -> VoteSettlement {
        self.unresolved = false;
        self.coordinator.inner.ledger.resolve_vote(&self.ticket, outcome)
    }

    /// Performs the write and reconciles. Returns the display after the
    /// outcome is applied, or the write error after rolling back.
    pub async fn run(mut self) -> Result<DisplayState> {
        let coordinator = self.coordinator.clone();
        let idea = self.ticket.idea.clone();

        if !coordinator.inner.ledger.is_latest(&self.ticket) {
            let settlement = self.resolve(WriteOutcome::Cancelled);
            debug!(%idea, user = %self.voter.id, "superseded vote cancelled before dispatch");
            if settlement.settled {
                coordinator.settle_vote(&idea, &self.voter).await;
            }
            return Ok(coordinator.display(&idea, Some(&self.voter)));
        }

        let result = coordinator.write_vote(&self.ticket, &self.voter).await;
        let outcome = if result.is_ok() {
            WriteOutcome::Succeeded
        } else {
            WriteOutcome::Failed
        };
        let settlement = self.resolve(outcome);

        match (settlement.resolution, result) {
            (VoteResolution::RolledBack { restored }, Err(err)) => {
                warn!(
                    %idea,
                    user = %self.voter.id,
                    restored = ?restored,
                    error = %err,
                    "vote write failed; optimistic intent rolled back"
                );
                // a reinstated earlier intent may never have been written
                if settlement.settled
                    && coordinator.inner.ledger.vote(&idea, &self.voter.id).is_some()
                {
                    coordinator.settle_vote(&idea, &self.voter).await;
                }
                return Err(err);
            }
            (resolution, Err(err)) => {
                debug!(%idea, ?resolution, error = %err, "stale vote write failed");
            }
            (resolution, Ok(())) => {
                info!(%idea, user = %self.voter.id, direction = ?self.ticket.direction, ?resolution, "vote write settled");
            }
        }

        if settlement.settled {
            coordinator.settle_vote(&idea, &self.voter).await;
        }
        Ok(coordinator.display(&idea, Some(&self.voter)))
    }
}

impl Drop for VoteDispatch {
    fn drop(&mut self) {
        if self.unresolved {
            let settlement = self.resolve(WriteOutcome::Cancelled);
            debug!(
                idea = %self.ticket.idea,
                user = %self.voter.id,
                resolution = ?settlement.resolution,
                "vote dispatch dropped before its write resolved"
            );
        }
    }
}

/// An optimistic comment whose write has not been performed yet.
///
/// Dropping it unsent removes the optimistic comment.
#[must_use = "the comment is only shown locally until the dispatch runs"]
pub struct CommentDispatch {
    coordinator: MutationCoordinator,
    ticket: CommentTicket,
    draft: Comment,
    viewer: Option<AuthenticatedUser>,
    optimistic: DisplayState,
    unresolved: bool,
}

impl CommentDispatch {
    pub fn optimistic(&self) -> &DisplayState {
        &self.optimistic
    }

    /// The locally generated comment shown while the write is in flight.
    pub fn draft(&self) -> &Comment {
        &self.draft
    }

    fn resolve(&mut self, server_id: Option<CommentId>) -> CommentResolution {
        self.unresolved = false;
        self.coordinator
            .inner
            .ledger
            .resolve_comment(&self.ticket, server_id)
    }

    pub async fn run(mut self) -> Result<DisplayState> {
        let coordinator = self.coordinator.clone();
        let idea = self.ticket.idea.clone();

        let result = coordinator
            .inner
            .store
            .add_comment(&idea, self.draft.text.clone(), self.draft.author.clone())
            .await;

        match result {
            Ok(stored) => {
                let resolution = self.resolve(Some(stored.id.clone()));
                info!(%idea, id = %stored.id, ?resolution, "comment stored");
                if let Err(err) = coordinator.refresh_comments(&idea).await {
                    warn!(%idea, error = %err, "comment stored but refresh failed");
                }
                Ok(coordinator.display(&idea, self.viewer.as_ref()))
            }
            Err(err) => {
                if self.resolve(None) == CommentResolution::RolledBack {
                    warn!(%idea, error = %err, "comment write failed; optimistic comment removed");
                }
                Err(err)
            }
        }
    }
}

impl Drop for CommentDispatch {
    fn drop(&mut self) {
        if self.unresolved {
            let resolution = self.resolve(None);
            debug!(idea = %self.ticket.idea, ?resolution, "comment dispatch dropped before its write resolved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ib_core::traits::MockEngagementRepo;
    use mockall::predicate::eq;

    fn ada() -> AuthenticatedUser {
        AuthenticatedUser::new("ada", "Ada")
    }

    fn idea() -> IdeaId {
        IdeaId::from("idea-1")
    }

    fn coordinator(store: MockEngagementRepo) -> MutationCoordinator {
        MutationCoordinator::new(Arc::new(store), SyncOptions::default())
    }

    #[tokio::test]
    async fn anonymous_vote_is_rejected_before_any_write() {
        let mut store = MockEngagementRepo::new();
        store.expect_set_vote().never();
        store.expect_clear_vote().never();
        let coordinator = coordinator(store);

        let before = coordinator.display(&idea(), None);
        let err = coordinator
            .vote(&idea(), None, VoteDirection::Upvote)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(_)));
        assert_eq!(coordinator.display(&idea(), None), before);
        assert_eq!(coordinator.ledger().pending_ideas(), 0);
    }

    #[tokio::test]
    async fn failed_vote_restores_pre_click_display() {
        let mut store = MockEngagementRepo::new();
        store.expect_vote_tally().returning(|_| Ok(4));
        store
            .expect_user_vote()
            .returning(|_, _| Ok(Some(VoteDirection::Upvote)));
        store.expect_list_comments().returning(|_, _| Ok(Vec::new()));
        store
            .expect_set_vote()
            .times(1)
            .returning(|_, _, _| Err(AppError::Remote("503".into())));
        let coordinator = coordinator(store);
        let user = ada();

        let before = coordinator.refresh(&idea(), Some(&user)).await.unwrap();
        assert_eq!((before.tally, before.direction), (4, Some(VoteDirection::Upvote)));

        let dispatch = coordinator
            .submit_vote(&idea(), Some(&user), VoteDirection::Downvote)
            .unwrap();
        assert_eq!(dispatch.optimistic().tally, 2);
        assert_eq!(dispatch.optimistic().direction, Some(VoteDirection::Downvote));

        let err = dispatch.run().await.unwrap_err();
        assert_eq!(err, AppError::Remote("503".into()));
        assert_eq!(coordinator.display(&idea(), Some(&user)), before);
        assert!(coordinator.ledger().vote(&idea(), &user.id).is_none());
    }

    #[tokio::test]
    async fn successful_vote_is_retired_by_the_follow_up_refresh() {
        let mut store = MockEngagementRepo::new();
        store
            .expect_set_vote()
            .with(eq(idea()), eq(ada().as_author()), eq(VoteDirection::Upvote))
            .times(1)
            .returning(|_, _, _| Ok(()));
        store.expect_vote_tally().returning(|_| Ok(1));
        store
            .expect_user_vote()
            .returning(|_, _| Ok(Some(VoteDirection::Upvote)));
        let coordinator = coordinator(store);
        let user = ada();

        let shown = coordinator
            .vote(&idea(), Some(&user), VoteDirection::Upvote)
            .await
            .unwrap();

        assert_eq!((shown.tally, shown.direction, shown.vote_pending), (1, Some(VoteDirection::Upvote), false));
        assert_eq!(coordinator.ledger().pending_ideas(), 0);
    }

    #[tokio::test]
    async fn empty_comment_never_reaches_the_ledger() {
        let mut store = MockEngagementRepo::new();
        store.expect_add_comment().never();
        let coordinator = coordinator(store);

        let err = coordinator
            .comment(&idea(), Some(&ada()), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(coordinator.ledger().pending_ideas(), 0);
    }

    #[tokio::test]
    async fn failed_comment_leaves_authoritative_list_unchanged() {
        let stored = Comment {
            id: CommentId::from("c1"),
            idea_id: idea(),
            text: "first!".into(),
            author: Author::anonymous(),
            created_at: Utc::now(),
        };
        let listed = stored.clone();

        let mut store = MockEngagementRepo::new();
        store.expect_vote_tally().returning(|_| Ok(0));
        store.expect_user_vote().returning(|_, _| Ok(None));
        store
            .expect_list_comments()
            .returning(move |_, _| Ok(vec![listed.clone()]));
        store
            .expect_add_comment()
            .times(1)
            .returning(|_, _, _| Err(AppError::Remote("timeout".into())));
        let coordinator = coordinator(store);
        let user = ada();

        let before = coordinator.refresh(&idea(), Some(&user)).await.unwrap();
        let dispatch = coordinator
            .submit_comment(&idea(), Some(&user), "second")
            .unwrap();
        let shown = dispatch.optimistic();
        assert_eq!(shown.comments.len(), 2);
        assert!(shown.comments[0].pending);
        assert_eq!(shown.comments[0].comment.text, "second");

        assert!(dispatch.run().await.is_err());
        let after = coordinator.display(&idea(), Some(&user));
        assert_eq!(after, before);
        assert_eq!(after.comments[0].comment, stored);
    }

    #[tokio::test]
    async fn signed_out_comment_uses_anonymous_author() {
        let mut store = MockEngagementRepo::new();
        store
            .expect_add_comment()
            .withf(|_, text, author| text == "hello" && author.is_anonymous())
            .times(1)
            .returning(|idea, text, author| {
                Ok(Comment {
                    id: CommentId::from("c9"),
                    idea_id: idea.clone(),
                    text,
                    author,
                    created_at: Utc::now(),
                })
            });
        store.expect_list_comments().returning(|_, _| Err(AppError::Remote("flaky".into())));
        let coordinator = coordinator(store);

        // refresh failure after a stored comment is not an error for the caller
        let shown = coordinator.comment(&idea(), None, " hello ").await.unwrap();
        assert_eq!(shown.comments.len(), 1);
        assert!(shown.comments[0].pending);
    }

    #[tokio::test]
    async fn dropped_vote_dispatch_rolls_back_without_writing() {
        let mut store = MockEngagementRepo::new();
        store.expect_set_vote().never();
        store.expect_clear_vote().never();
        let coordinator = coordinator(store);
        let user = ada();

        let dispatch = coordinator
            .submit_vote(&idea(), Some(&user), VoteDirection::Upvote)
            .unwrap();
        assert!(dispatch.optimistic().vote_pending);
        drop(dispatch);

        let shown = coordinator.display(&idea(), Some(&user));
        assert_eq!((shown.tally, shown.direction, shown.vote_pending), (0, None, false));
        assert_eq!(coordinator.ledger().writes_in_flight(&idea(), &user.id), 0);
        assert_eq!(coordinator.ledger().pending_ideas(), 0);
    }

    #[tokio::test]
    async fn dropped_comment_dispatch_removes_the_draft() {
        let mut store = MockEngagementRepo::new();
        store.expect_add_comment().never();
        let coordinator = coordinator(store);

        let dispatch = coordinator.submit_comment(&idea(), None, "hi").unwrap();
        assert_eq!(dispatch.optimistic().comments.len(), 1);
        drop(dispatch);

        assert!(coordinator.display(&idea(), None).comments.is_empty());
        assert_eq!(coordinator.ledger().pending_ideas(), 0);
    }
}
