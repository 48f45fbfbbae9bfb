//! # Optimistic Ledger
//!
//! Local, not-yet-confirmed mutations, kept per idea. A vote intent is keyed
//! by (idea, user) and only the newest click survives; optimistic comments
//! are kept newest first until the authoritative list absorbs them.
//!
//! Entry lifecycle: `Pending` while its write is in flight, `Confirmed` once
//! the write succeeded (dropped by the reconciler when a refresh shows the
//! record). When the newest vote write fails, the intent it replaced comes
//! back, so the display returns to what it showed before the click.
//!
//! Outstanding writes are counted per (idea, user) apart from the intents.
//! The count survives rollbacks, and no intent is retired while it is above
//! zero, so a stale write that lands late can still be corrected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ib_core::models::{Author, Comment, CommentId, IdeaId, UserId, VoteDirection};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Prefix marking ids that were generated locally and never came from the store.
pub const OPTIMISTIC_ID_PREFIX: &str = "optimistic-";

pub fn is_optimistic_id(id: &CommentId) -> bool {
    id.as_str().starts_with(OPTIMISTIC_ID_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryState {
    /// The write is still in flight
    Pending,
    /// The write succeeded; waiting for a refresh to show the record
    Confirmed,
}

/// The newest vote intent of one user on one idea.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVote {
    /// Requested direction; `None` is a retraction
    pub direction: Option<VoteDirection>,
    /// Direction displayed when the click happened
    pub previous: Option<VoteDirection>,
    /// Tally change implied by the click
    pub delta: i64,
    pub generation: u64,
    pub state: EntryState,
    pub reasserted: bool,
    pub created_at: DateTime<Utc>,
    /// Intent this click replaced, restored if this one fails
    pub superseded: Option<Box<PendingVote>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingComment {
    /// Draft with a temporary id; `created_at` is the local submission time
    pub comment: Comment,
    pub state: EntryState,
    /// Id the store assigned, once the write succeeded
    pub server_id: Option<CommentId>,
}

/// Everything pending for one idea.
#[derive(Debug, Clone, Default)]
pub struct IdeaLedger {
    pub votes: HashMap<UserId, PendingVote>,
    /// Vote writes per user that have not resolved yet, superseded ones included
    pub in_flight: HashMap<UserId, u32>,
    /// Newest first
    pub comments: Vec<PendingComment>,
}

impl IdeaLedger {
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty() && self.in_flight.is_empty() && self.comments.is_empty()
    }

    pub fn writes_in_flight(&self, user: &UserId) -> u32 {
        self.in_flight.get(user).copied().unwrap_or(0)
    }

    /// Counts one write as resolved; returns how many remain.
    fn finish_write(&mut self, user: &UserId) -> u32 {
        let remaining = self.writes_in_flight(user).saturating_sub(1);
        if remaining == 0 {
            self.in_flight.remove(user);
        } else {
            self.in_flight.insert(user.clone(), remaining);
        }
        remaining
    }
}

/// Handle for one dispatched vote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTicket {
    pub idea: IdeaId,
    pub user: UserId,
    pub direction: Option<VoteDirection>,
    pub generation: u64,
}

/// Handle for one dispatched comment write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentTicket {
    pub idea: IdeaId,
    pub temp_id: CommentId,
}

/// How a dispatched write ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Succeeded,
    Failed,
    /// Superseded before it was sent; no request was made
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteResolution {
    /// Latest intent written; entry waits for retirement
    Committed,
    /// A newer click owns the key; this outcome changes nothing
    Superseded,
    /// Latest intent failed; the replaced intent, if any, is back in place
    RolledBack { restored: Option<VoteDirection> },
    /// No intent for the key (already retired or purged)
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteSettlement {
    pub resolution: VoteResolution,
    /// No write for this key is outstanding any more
    pub settled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentResolution {
    Committed,
    RolledBack,
    Missing,
}

/// What to do with a confirmed intent the store does not reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassert {
    /// Nothing to do: no entry, still in flight, or already reflected
    NotNeeded,
    /// Send the intent once more
    Reissue(VoteTicket),
    /// Already re-asserted once; the entry was dropped in favour of the store
    Abandoned,
}

/// Per-idea pending mutations for the whole session.
#[derive(Debug, Default)]
pub struct OptimisticLedger {
    ideas: DashMap<IdeaId, IdeaLedger>,
    generation: AtomicU64,
}

impl OptimisticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Records a click. Clicking the displayed direction again retracts the
    /// vote; any earlier intent of the same user on the same idea is replaced.
    pub fn apply_vote_intent(
        &self,
        idea: &IdeaId,
        user: &UserId,
        clicked: VoteDirection,
        displayed: Option<VoteDirection>,
    ) -> VoteTicket {
        let direction = if displayed == Some(clicked) {
            None
        } else {
            Some(clicked)
        };
        let delta = VoteDirection::delta(displayed, direction);
        let generation = self.next_generation();

        let mut ledger = self.ideas.entry(idea.clone()).or_default();
        *ledger.in_flight.entry(user.clone()).or_insert(0) += 1;
        let superseded = ledger.votes.remove(user).map(Box::new);
        ledger.votes.insert(
            user.clone(),
            PendingVote {
                direction,
                previous: displayed,
                delta,
                generation,
                state: EntryState::Pending,
                reasserted: false,
                created_at: Utc::now(),
                superseded,
            },
        );
        debug!(%idea, %user, ?displayed, ?direction, delta, generation, "vote intent recorded");

        VoteTicket {
            idea: idea.clone(),
            user: user.clone(),
            direction,
            generation,
        }
    }

    /// True while no newer click has replaced the ticket's intent.
    pub fn is_latest(&self, ticket: &VoteTicket) -> bool {
        self.ideas
            .get(&ticket.idea)
            .and_then(|l| l.votes.get(&ticket.user).map(|v| v.generation == ticket.generation))
            .unwrap_or(false)
    }

    pub fn resolve_vote(&self, ticket: &VoteTicket, outcome: WriteOutcome) -> VoteSettlement {
        let Some(mut ledger) = self.ideas.get_mut(&ticket.idea) else {
            return VoteSettlement {
                resolution: VoteResolution::Missing,
                settled: true,
            };
        };
        let settled = ledger.finish_write(&ticket.user) == 0;

        let latest = ledger
            .votes
            .get(&ticket.user)
            .map(|v| v.generation == ticket.generation);
        let resolution = match (latest, outcome) {
            (None, _) => VoteResolution::Missing,
            (Some(false), _) => {
                debug!(idea = %ticket.idea, user = %ticket.user, ?outcome, "superseded vote write resolved");
                VoteResolution::Superseded
            }
            (Some(true), WriteOutcome::Succeeded) => {
                if let Some(entry) = ledger.votes.get_mut(&ticket.user) {
                    entry.state = EntryState::Confirmed;
                }
                VoteResolution::Committed
            }
            (Some(true), WriteOutcome::Failed | WriteOutcome::Cancelled) => {
                match ledger.votes.remove(&ticket.user) {
                    Some(failed) => {
                        if let Some(prior) = failed.superseded {
                            // its own write may have been cancelled; settling re-checks it
                            let mut prior = *prior;
                            prior.state = EntryState::Confirmed;
                            prior.reasserted = false;
                            ledger.votes.insert(ticket.user.clone(), prior);
                        }
                        VoteResolution::RolledBack {
                            restored: failed.previous,
                        }
                    }
                    None => VoteResolution::Missing,
                }
            }
        };

        if settled {
            // nothing older can fail any more
            if let Some(entry) = ledger.votes.get_mut(&ticket.user) {
                entry.superseded = None;
            }
        }
        drop(ledger);
        self.drop_if_empty(&ticket.idea);

        debug!(idea = %ticket.idea, user = %ticket.user, ?resolution, settled, "vote write resolved");
        VoteSettlement {
            resolution,
            settled,
        }
    }

    /// Called once every write for the key has resolved and a refresh did
    /// not retire the confirmed intent.
    pub fn reassert_unreflected(
        &self,
        idea: &IdeaId,
        user: &UserId,
        authoritative: Option<VoteDirection>,
    ) -> Reassert {
        let generation = self.next_generation();
        let Some(mut ledger) = self.ideas.get_mut(idea) else {
            return Reassert::NotNeeded;
        };
        if ledger.writes_in_flight(user) > 0 {
            return Reassert::NotNeeded;
        }
        let Some(entry) = ledger.votes.get_mut(user) else {
            return Reassert::NotNeeded;
        };
        if entry.state != EntryState::Confirmed || entry.direction == authoritative {
            return Reassert::NotNeeded;
        }
        if entry.reasserted {
            ledger.votes.remove(user);
            drop(ledger);
            self.drop_if_empty(idea);
            return Reassert::Abandoned;
        }

        entry.reasserted = true;
        entry.state = EntryState::Pending;
        entry.generation = generation;
        let direction = entry.direction;
        ledger.in_flight.insert(user.clone(), 1);
        Reassert::Reissue(VoteTicket {
            idea: idea.clone(),
            user: user.clone(),
            direction,
            generation,
        })
    }

    /// Prepends a pending comment with a locally generated id.
    pub fn insert_optimistic_comment(
        &self,
        idea: &IdeaId,
        text: String,
        author: Author,
    ) -> (CommentTicket, Comment) {
        let temp_id = CommentId::new(format!("{OPTIMISTIC_ID_PREFIX}{}", Uuid::new_v4()));
        let comment = Comment {
            id: temp_id.clone(),
            idea_id: idea.clone(),
            text,
            author,
            created_at: Utc::now(),
        };
        self.ideas.entry(idea.clone()).or_default().comments.insert(
            0,
            PendingComment {
                comment: comment.clone(),
                state: EntryState::Pending,
                server_id: None,
            },
        );
        debug!(%idea, id = %temp_id, "optimistic comment inserted");

        (
            CommentTicket {
                idea: idea.clone(),
                temp_id,
            },
            comment,
        )
    }

    /// `server_id` is the id of the created document when the write succeeded.
    pub fn resolve_comment(
        &self,
        ticket: &CommentTicket,
        server_id: Option<CommentId>,
    ) -> CommentResolution {
        let Some(mut ledger) = self.ideas.get_mut(&ticket.idea) else {
            return CommentResolution::Missing;
        };
        let Some(pos) = ledger
            .comments
            .iter()
            .position(|c| c.comment.id == ticket.temp_id)
        else {
            return CommentResolution::Missing;
        };

        match server_id {
            Some(id) => {
                let entry = &mut ledger.comments[pos];
                entry.state = EntryState::Confirmed;
                entry.server_id = Some(id);
                CommentResolution::Committed
            }
            None => {
                ledger.comments.remove(pos);
                drop(ledger);
                self.drop_if_empty(&ticket.idea);
                CommentResolution::RolledBack
            }
        }
    }

    /// Copy of the idea's pending entries (empty when nothing is pending).
    pub fn snapshot(&self, idea: &IdeaId) -> IdeaLedger {
        self.ideas
            .get(idea)
            .map(|l| l.value().clone())
            .unwrap_or_default()
    }

    pub fn vote(&self, idea: &IdeaId, user: &UserId) -> Option<PendingVote> {
        self.ideas.get(idea).and_then(|l| l.votes.get(user).cloned())
    }

    /// Vote writes for (idea, user) that have not resolved yet.
    pub fn writes_in_flight(&self, idea: &IdeaId, user: &UserId) -> u32 {
        self.ideas.get(idea).map_or(0, |l| l.writes_in_flight(user))
    }

    /// Runs `f` on the idea's ledger, dropping the ledger if it ends up empty.
    pub fn update<R>(&self, idea: &IdeaId, f: impl FnOnce(&mut IdeaLedger) -> R) -> R {
        let result = {
            let mut ledger = self.ideas.entry(idea.clone()).or_default();
            f(&mut ledger)
        };
        self.drop_if_empty(idea);
        result
    }

    fn drop_if_empty(&self, idea: &IdeaId) {
        self.ideas.remove_if(idea, |_, l| l.is_empty());
    }

    pub fn pending_ideas(&self) -> usize {
        self.ideas.len()
    }
}
