//! # ib-sync
//!
//! Client-side state for Idea Board: the authoritative [`EntityCache`], the
//! [`OptimisticLedger`] of local mutations, the [`Reconciler`] merging the
//! two, and the [`MutationCoordinator`] through which the UI votes and
//! comments. Feed paging and idea/profile use-cases live alongside.

pub mod cache;
pub mod coordinator;
pub mod feed;
pub mod ideas;
pub mod ledger;
pub mod reconciler;

pub use cache::{EntityCache, IdeaSnapshot};
pub use coordinator::{CommentDispatch, MutationCoordinator, SyncOptions, VoteDispatch};
pub use feed::{FeedFilter, FeedPager};
pub use ideas::{AuthorProfile, IdeaService};
pub use ledger::{EntryState, OptimisticLedger};
pub use reconciler::{DisplayComment, DisplayState, Reconciler};
