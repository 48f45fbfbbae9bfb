//! Shared fixtures for the end-to-end flows: a store whose writes can be
//! parked and released in any order, plus seeded users and ideas.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ib_core::error::Result;
use ib_core::models::{
    Author, AuthenticatedUser, Category, Comment, CommentOrder, Idea, IdeaDraft, IdeaId, UserId,
    VoteDirection,
};
use ib_core::traits::{EngagementRepo, IdeaRepo};
use ib_store_memory::InMemoryStore;
use ib_sync::{MutationCoordinator, SyncOptions};
use tokio::sync::oneshot;

/// Wraps `InMemoryStore`; while holding, vote writes wait for `release`.
#[derive(Default)]
pub struct GatedStore {
    inner: InMemoryStore,
    hold: AtomicBool,
    parked: Mutex<Vec<oneshot::Sender<()>>>,
}

impl GatedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn hold_writes(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn parked(&self) -> usize {
        self.parked.lock().unwrap().len()
    }

    /// Lets the `index`-th parked write (in arrival order) proceed.
    pub fn release(&self, index: usize) {
        let gate = self.parked.lock().unwrap().remove(index);
        let _ = gate.send(());
    }

    /// Yields until `count` writes are parked.
    pub async fn until_parked(&self, count: usize) {
        for _ in 0..1_000 {
            if self.parked() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} parked writes, found {}", self.parked());
    }

    async fn gate(&self) {
        if !self.hold.load(Ordering::SeqCst) {
            return;
        }
        let (tx, rx) = oneshot::channel();
        self.parked.lock().unwrap().push(tx);
        let _ = rx.await;
    }
}

#[async_trait]
impl EngagementRepo for GatedStore {
    async fn vote_tally(&self, idea: &IdeaId) -> Result<i64> {
        self.inner.vote_tally(idea).await
    }

    async fn user_vote(&self, idea: &IdeaId, user: &UserId) -> Result<Option<VoteDirection>> {
        self.inner.user_vote(idea, user).await
    }

    async fn set_vote(&self, idea: &IdeaId, voter: &Author, direction: VoteDirection) -> Result<()> {
        self.gate().await;
        self.inner.set_vote(idea, voter, direction).await
    }

    async fn clear_vote(&self, idea: &IdeaId, user: &UserId) -> Result<()> {
        self.gate().await;
        self.inner.clear_vote(idea, user).await
    }

    async fn list_comments(&self, idea: &IdeaId, order: CommentOrder) -> Result<Vec<Comment>> {
        self.inner.list_comments(idea, order).await
    }

    async fn add_comment(&self, idea: &IdeaId, text: String, author: Author) -> Result<Comment> {
        self.inner.add_comment(idea, text, author).await
    }
}

pub fn ada() -> AuthenticatedUser {
    AuthenticatedUser::new("1001", "Ada Lovelace")
}

pub fn grace() -> AuthenticatedUser {
    AuthenticatedUser::new("1002", "Grace Hopper")
}

pub fn coordinator(store: Arc<GatedStore>) -> MutationCoordinator {
    MutationCoordinator::new(store, SyncOptions::default())
}

/// Creates an idea authored by `author` and returns it.
pub async fn seed_idea(store: &InMemoryStore, title: &str, category: Category, author: &AuthenticatedUser) -> Idea {
    store
        .create_idea(
            IdeaDraft {
                title: title.into(),
                body: format!("{title}: the details"),
                category,
                notes: None,
            },
            author.as_author(),
        )
        .await
        .unwrap()
}
