//! # Reconciler
//!
//! Merges an authoritative [`IdeaSnapshot`] with the idea's [`IdeaLedger`]
//! into what the user sees, and retires ledger entries once the snapshot
//! represents them. Both operations are pure over their inputs.

use chrono::Duration;
use ib_core::models::{Comment, IdeaId, UserId, VoteDirection};
use serde::Serialize;

use crate::cache::IdeaSnapshot;
use crate::ledger::{EntryState, IdeaLedger, PendingComment};

/// Comment as shown in the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayComment {
    pub comment: Comment,
    /// Optimistic entry not yet seen in an authoritative fetch
    pub pending: bool,
}

/// The value the UI renders for one idea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    pub idea: IdeaId,
    pub tally: i64,
    pub direction: Option<VoteDirection>,
    pub vote_pending: bool,
    pub comments: Vec<DisplayComment>,
}

impl DisplayState {
    pub fn pending_comments(&self) -> usize {
        self.comments.iter().filter(|c| c.pending).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Retired {
    pub votes: usize,
    pub comments: usize,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    dedup_window: Duration,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Duration::seconds(60))
    }
}

impl Reconciler {
    pub fn new(dedup_window: Duration) -> Self {
        Self { dedup_window }
    }

    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    pub fn display(
        &self,
        idea: &IdeaId,
        snapshot: &IdeaSnapshot,
        ledger: &IdeaLedger,
        viewer: Option<&UserId>,
    ) -> DisplayState {
        let stored = viewer.and_then(|u| snapshot.vote_of(u));
        let intent = viewer.and_then(|u| ledger.votes.get(u));

        // Tally is rebuilt from the stored vote, never offset twice.
        let (tally, direction) = match intent {
            Some(pending) => (
                snapshot.tally - VoteDirection::contribution(stored)
                    + VoteDirection::contribution(pending.direction),
                pending.direction,
            ),
            None => (snapshot.tally, stored),
        };

        let absorbed = self.absorbed(&ledger.comments, &snapshot.comments);
        let comments = ledger
            .comments
            .iter()
            .zip(absorbed)
            .filter(|(_, absorbed)| !absorbed)
            .map(|(p, _)| DisplayComment {
                comment: p.comment.clone(),
                pending: true,
            })
            .chain(snapshot.comments.iter().map(|c| DisplayComment {
                comment: c.clone(),
                pending: false,
            }))
            .collect();

        DisplayState {
            idea: idea.clone(),
            tally,
            direction,
            vote_pending: intent.is_some(),
            comments,
        }
    }

    /// Drops confirmed vote intents the snapshot already shows and every
    /// optimistic comment the authoritative list has absorbed.
    pub fn retire(&self, snapshot: &IdeaSnapshot, ledger: &mut IdeaLedger) -> Retired {
        let votes_before = ledger.votes.len();
        let in_flight = &ledger.in_flight;
        ledger.votes.retain(|user, pending| {
            let reflected = snapshot.votes.get(user) == Some(&pending.direction);
            let quiet = !in_flight.contains_key(user);
            !(reflected && pending.state == EntryState::Confirmed && quiet)
        });

        let absorbed = self.absorbed(&ledger.comments, &snapshot.comments);
        let comments_before = ledger.comments.len();
        let mut flags = absorbed.into_iter();
        ledger.comments.retain(|_| !flags.next().unwrap_or(false));

        Retired {
            votes: votes_before - ledger.votes.len(),
            comments: comments_before - ledger.comments.len(),
        }
    }

    /// For each pending comment, whether an authoritative comment stands for
    /// it. A known server id matches first; otherwise same author, same text,
    /// and timestamps within the window. Each authoritative comment absorbs
    /// at most one pending comment.
    fn absorbed(&self, pending: &[PendingComment], authoritative: &[Comment]) -> Vec<bool> {
        let mut used = vec![false; authoritative.len()];
        let mut absorbed = vec![false; pending.len()];

        for (i, p) in pending.iter().enumerate() {
            let Some(server_id) = &p.server_id else { continue };
            if let Some(j) = authoritative
                .iter()
                .enumerate()
                .position(|(j, a)| !used[j] && &a.id == server_id)
            {
                used[j] = true;
                absorbed[i] = true;
            }
        }

        for (i, p) in pending.iter().enumerate() {
            if absorbed[i] {
                continue;
            }
            if let Some(j) = authoritative
                .iter()
                .enumerate()
                .position(|(j, a)| !used[j] && self.same_comment(&p.comment, a))
            {
                used[j] = true;
                absorbed[i] = true;
            }
        }
        absorbed
    }

    fn same_comment(&self, optimistic: &Comment, stored: &Comment) -> bool {
        optimistic.author.id == stored.author.id
            && optimistic.text == stored.text
            && (stored.created_at - optimistic.created_at).abs() <= self.dedup_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PendingVote;
    use chrono::Utc;
    use ib_core::models::{Author, CommentId, CommentOrder};
    use VoteDirection::*;

    fn snapshot(tally: i64, user: &UserId, vote: Option<VoteDirection>) -> IdeaSnapshot {
        let mut snap = IdeaSnapshot {
            tally,
            comment_order: CommentOrder::NewestFirst,
            ..IdeaSnapshot::default()
        };
        snap.votes.insert(user.clone(), vote);
        snap
    }

    fn intent(direction: Option<VoteDirection>, state: EntryState) -> PendingVote {
        PendingVote {
            direction,
            previous: None,
            delta: 0,
            generation: 1,
            state,
            reasserted: false,
            created_at: Utc::now(),
            superseded: None,
        }
    }

    fn comment(id: &str, author: &str, text: &str, offset_secs: i64) -> Comment {
        Comment {
            id: CommentId::from(id),
            idea_id: IdeaId::from("i"),
            text: text.into(),
            author: Author {
                id: UserId::from(author),
                name: author.to_uppercase(),
            },
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    fn pending(c: Comment) -> PendingComment {
        PendingComment {
            comment: c,
            state: EntryState::Pending,
            server_id: None,
        }
    }

    #[test]
    fn intent_overrides_stored_vote_without_double_counting() {
        let r = Reconciler::default();
        let idea = IdeaId::from("i");
        let user = UserId::from("u");
        let mut ledger = IdeaLedger::default();
        ledger
            .votes
            .insert(user.clone(), intent(Some(Downvote), EntryState::Pending));

        // store still shows the old upvote: 5 - 1 - 1
        let shown = r.display(&idea, &snapshot(5, &user, Some(Upvote)), &ledger, Some(&user));
        assert_eq!((shown.tally, shown.direction, shown.vote_pending), (3, Some(Downvote), true));

        // store already caught up: no second offset
        let shown = r.display(&idea, &snapshot(3, &user, Some(Downvote)), &ledger, Some(&user));
        assert_eq!(shown.tally, 3);
    }

    #[test]
    fn anonymous_viewer_sees_cache_only() {
        let r = Reconciler::default();
        let user = UserId::from("u");
        let shown = r.display(
            &IdeaId::from("i"),
            &snapshot(2, &user, Some(Upvote)),
            &IdeaLedger::default(),
            None,
        );
        assert_eq!((shown.tally, shown.direction), (2, None));
    }

    #[test]
    fn retire_waits_for_confirmation_and_reflection() {
        let r = Reconciler::default();
        let user = UserId::from("u");
        let mut ledger = IdeaLedger::default();

        ledger.votes.insert(user.clone(), intent(Some(Upvote), EntryState::Pending));
        assert_eq!(r.retire(&snapshot(1, &user, Some(Upvote)), &mut ledger).votes, 0);

        ledger.votes.insert(user.clone(), intent(Some(Upvote), EntryState::Confirmed));
        assert_eq!(r.retire(&snapshot(0, &user, None), &mut ledger).votes, 0);
        assert_eq!(r.retire(&snapshot(1, &user, Some(Upvote)), &mut ledger).votes, 1);
        assert!(ledger.votes.is_empty());
    }

    #[test]
    fn confirmed_intent_is_kept_while_older_writes_are_outstanding() {
        let r = Reconciler::default();
        let user = UserId::from("u");
        let mut ledger = IdeaLedger::default();
        ledger.votes.insert(user.clone(), intent(Some(Upvote), EntryState::Confirmed));
        ledger.in_flight.insert(user.clone(), 1);

        assert_eq!(r.retire(&snapshot(1, &user, Some(Upvote)), &mut ledger).votes, 0);

        ledger.in_flight.clear();
        assert_eq!(r.retire(&snapshot(1, &user, Some(Upvote)), &mut ledger).votes, 1);
    }

    #[test]
    fn retraction_retires_when_store_shows_no_vote() {
        let r = Reconciler::default();
        let user = UserId::from("u");
        let mut ledger = IdeaLedger::default();
        ledger.votes.insert(user.clone(), intent(None, EntryState::Confirmed));
        assert_eq!(r.retire(&snapshot(0, &user, None), &mut ledger).votes, 1);
    }

    #[test]
    fn round_tripped_comment_is_shown_once() {
        let r = Reconciler::default();
        let idea = IdeaId::from("i");
        let mut ledger = IdeaLedger::default();
        ledger.comments.push(pending(comment("optimistic-1", "ada", "nice", 0)));

        let mut snap = IdeaSnapshot::default();
        snap.comments = vec![comment("c1", "ada", "nice", 2), comment("c0", "bob", "old", -600)];

        let shown = r.display(&idea, &snap, &ledger, None);
        assert_eq!(shown.comments.len(), 2);
        assert_eq!(shown.pending_comments(), 0);

        assert_eq!(r.retire(&snap, &mut ledger).comments, 1);
        assert!(ledger.comments.is_empty());
    }

    #[test]
    fn match_outside_window_or_by_other_author_is_not_absorbed() {
        let r = Reconciler::new(Duration::seconds(60));
        let idea = IdeaId::from("i");
        let mut ledger = IdeaLedger::default();
        ledger.comments.push(pending(comment("optimistic-1", "ada", "nice", 0)));

        let mut snap = IdeaSnapshot::default();
        snap.comments = vec![comment("c1", "ada", "nice", 120), comment("c2", "bob", "nice", 1)];

        let shown = r.display(&idea, &snap, &ledger, None);
        assert_eq!(shown.comments.len(), 3);
        assert!(shown.comments[0].pending);
        assert_eq!(shown.comments[0].comment.id, CommentId::from("optimistic-1"));
    }

    #[test]
    fn one_stored_comment_absorbs_one_duplicate_draft() {
        let r = Reconciler::default();
        let mut ledger = IdeaLedger::default();
        ledger.comments.push(pending(comment("optimistic-2", "ada", "+1", 0)));
        ledger.comments.push(pending(comment("optimistic-1", "ada", "+1", 0)));

        let mut snap = IdeaSnapshot::default();
        snap.comments = vec![comment("c1", "ada", "+1", 1)];

        assert_eq!(r.retire(&snap, &mut ledger).comments, 1);
        assert_eq!(ledger.comments.len(), 1);
    }

    #[test]
    fn server_id_matches_regardless_of_clock() {
        let r = Reconciler::new(Duration::seconds(1));
        let mut ledger = IdeaLedger::default();
        let mut p = pending(comment("optimistic-1", "ada", "hello", 0));
        p.state = EntryState::Confirmed;
        p.server_id = Some(CommentId::from("c-77"));
        ledger.comments.push(p);

        let mut snap = IdeaSnapshot::default();
        snap.comments = vec![comment("c-77", "ada", "hello", 3600)];
        assert_eq!(r.retire(&snap, &mut ledger).comments, 1);
    }
}
