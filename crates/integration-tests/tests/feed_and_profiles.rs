use std::collections::HashSet;
use std::sync::Arc;

use ib_core::error::AppError;
use ib_core::models::{Category, IdeaDraft, VoteDirection};
use ib_core::traits::EngagementRepo;
use ib_store_memory::InMemoryStore;
use ib_sync::{FeedFilter, FeedPager, IdeaService, MutationCoordinator, SyncOptions};
use integration_tests::{ada, grace, seed_idea};

fn draft(title: &str) -> IdeaDraft {
    IdeaDraft {
        title: title.into(),
        body: "Plenty of detail".into(),
        category: Category::Technology,
        notes: Some("- step one".into()),
    }
}

#[tokio::test]
async fn feed_loads_twelve_then_the_rest() {
    let store = InMemoryStore::new();
    for n in 0..14 {
        seed_idea(&store, &format!("Idea {n}"), Category::Other, &grace()).await;
    }

    let mut pager = FeedPager::with_default_page(FeedFilter::default());
    assert_eq!(pager.load_first(&store).await.unwrap().len(), 12);
    assert!(pager.has_more());
    assert_eq!(pager.total(), 14);

    assert_eq!(pager.load_more(&store).await.unwrap().len(), 2);
    assert!(!pager.has_more());

    let ids: HashSet<_> = pager.ideas().iter().map(|i| i.id.clone()).collect();
    assert_eq!(ids.len(), 14);
}

#[tokio::test]
async fn category_chip_and_search_narrow_the_feed() {
    let store = InMemoryStore::new();
    seed_idea(&store, "Solar benches", Category::Technology, &grace()).await;
    seed_idea(&store, "Solar cooking class", Category::Education, &grace()).await;
    seed_idea(&store, "Bike repair stand", Category::Technology, &ada()).await;

    let mut filter = FeedFilter::default();
    filter.toggle_category(Category::Technology);
    let mut pager = FeedPager::with_default_page(filter.clone());
    assert_eq!(pager.load_first(&store).await.unwrap().len(), 2);

    filter.set_text("solar");
    let mut pager = FeedPager::with_default_page(filter.clone());
    let ideas = pager.load_first(&store).await.unwrap();
    assert_eq!(ideas.len(), 1);
    assert_eq!(ideas[0].slug, "solar-benches");

    filter.toggle_category(Category::Technology);
    let mut pager = FeedPager::with_default_page(filter);
    assert_eq!(pager.load_first(&store).await.unwrap().len(), 2);
}

#[tokio::test]
async fn feed_tallies_seed_the_vote_display() {
    let store = Arc::new(InMemoryStore::new());
    let idea = seed_idea(&store, "Night buses", Category::Business, &grace()).await;
    store
        .set_vote(&idea.id, &grace().as_author(), VoteDirection::Upvote)
        .await
        .unwrap();

    let mut pager = FeedPager::with_default_page(FeedFilter::default());
    pager.load_first(store.as_ref()).await.unwrap();
    let board = MutationCoordinator::new(store.clone(), SyncOptions::default());
    board.cache().observe_ideas(pager.ideas());

    let dispatch = board
        .submit_vote(&idea.id, Some(&ada()), VoteDirection::Upvote)
        .unwrap();
    assert_eq!(dispatch.optimistic().tally, 2);
    let shown = dispatch.run().await.unwrap();
    assert_eq!(shown.tally, 2);
}

#[tokio::test]
async fn authors_edit_only_their_own_ideas() {
    let store = Arc::new(InMemoryStore::new());
    let ideas = IdeaService::new(store.clone());

    let idea = ideas.create_idea(&ada(), draft("Shared ladders")).await.unwrap();
    assert_eq!(idea.slug, "shared-ladders");
    assert_eq!(idea.author.id, ada().id);

    let err = ideas
        .update_idea(&grace(), &idea.id, draft("Hijacked"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let updated = ideas
        .update_idea(&ada(), &idea.id, draft("Shared ladders & tools"))
        .await
        .unwrap();
    assert_eq!(updated.slug, "shared-ladders-tools");
    assert_eq!(updated.published_at, idea.published_at);
    assert_eq!(ideas.idea_detail(&idea.id).await.unwrap().title, "Shared ladders & tools");
}

#[tokio::test]
async fn profile_shows_ideas_and_the_saved_bio() {
    let store = Arc::new(InMemoryStore::new());
    let ideas = IdeaService::new(store.clone());
    ideas.create_idea(&ada(), draft("Analytical engine club")).await.unwrap();
    seed_idea(&store, "Unrelated", Category::Other, &grace()).await;

    assert!(matches!(
        ideas.save_bio(&ada(), "short").await,
        Err(AppError::Validation(_))
    ));
    let first = ideas
        .save_bio(&ada(), "Mathematician and writer.")
        .await
        .unwrap();
    let second = ideas
        .save_bio(&ada(), "Mathematician, writer, first programmer.")
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let profile = ideas.author_profile(&ada().id).await.unwrap();
    assert_eq!(profile.author.name, "Ada Lovelace");
    assert_eq!(profile.ideas.len(), 1);
    assert_eq!(
        profile.bio.map(|b| b.text),
        Some("Mathematician, writer, first programmer.".to_string())
    );
}
