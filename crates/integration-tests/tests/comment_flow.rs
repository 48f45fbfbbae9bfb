use chrono::{Duration, Utc};
use ib_core::error::AppError;
use ib_core::models::{Category, CommentOrder};
use ib_core::traits::EngagementRepo;
use integration_tests::{ada, coordinator, grace, seed_idea, GatedStore};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn posted_comment_is_shown_first_then_replaced_without_duplicate() {
    let store = GatedStore::new();
    let idea = seed_idea(store.inner(), "Pocket park", Category::Health, &grace()).await.id;
    store.inner().insert_comment_at(
        &idea,
        "Where would it go?",
        grace().as_author(),
        Utc::now() - Duration::hours(2),
    );
    let board = coordinator(store.clone());
    board.refresh(&idea, Some(&ada())).await.unwrap();

    let dispatch = board.submit_comment(&idea, Some(&ada()), "  Love it  ").unwrap();
    let shown = dispatch.optimistic();
    assert_eq!(shown.comments.len(), 2);
    assert!(shown.comments[0].pending);
    assert_eq!(shown.comments[0].comment.text, "Love it");

    let shown = dispatch.run().await.unwrap();
    assert_eq!(shown.comments.len(), 2);
    assert_eq!(shown.pending_comments(), 0);
    assert_eq!(shown.comments[0].comment.text, "Love it");
    assert_eq!(shown.comments[0].comment.author.id, ada().id);
}

#[tokio::test]
async fn matching_comment_from_another_session_absorbs_the_pending_one() {
    let store = GatedStore::new();
    let idea = seed_idea(store.inner(), "Tiny library", Category::Education, &grace()).await.id;
    let board = coordinator(store.clone());

    let _unsent = board.submit_comment(&idea, Some(&ada()), "Count me in").unwrap();
    store
        .inner()
        .insert_comment_at(&idea, "Count me in", ada().as_author(), Utc::now());

    let shown = board.refresh(&idea, Some(&ada())).await.unwrap();
    assert_eq!(shown.comments.len(), 1);
    assert!(!shown.comments[0].pending);
    assert_eq!(board.ledger().pending_ideas(), 0);
}

#[tokio::test]
async fn stored_comment_outside_the_window_is_a_different_comment() {
    let store = GatedStore::new();
    let idea = seed_idea(store.inner(), "Dog run", Category::Other, &grace()).await.id;
    store.inner().insert_comment_at(
        &idea,
        "+1",
        ada().as_author(),
        Utc::now() - Duration::minutes(10),
    );
    let board = coordinator(store.clone());

    let _unsent = board.submit_comment(&idea, Some(&ada()), "+1").unwrap();
    let shown = board.refresh(&idea, Some(&ada())).await.unwrap();
    assert_eq!(shown.comments.len(), 2);
    assert_eq!(shown.pending_comments(), 1);
}

#[tokio::test]
async fn one_stored_comment_absorbs_one_pending_copy() {
    let store = GatedStore::new();
    let idea = seed_idea(store.inner(), "Mural wall", Category::Creative, &grace()).await.id;
    let board = coordinator(store.clone());

    let _first = board.submit_comment(&idea, Some(&ada()), "Yes!").unwrap();
    let _second = board.submit_comment(&idea, Some(&ada()), "Yes!").unwrap();
    store
        .inner()
        .insert_comment_at(&idea, "Yes!", ada().as_author(), Utc::now());

    let shown = board.refresh(&idea, Some(&ada())).await.unwrap();
    assert_eq!(shown.comments.len(), 2);
    assert_eq!(shown.pending_comments(), 1);
}

#[tokio::test]
async fn failed_comment_leaves_the_list_unchanged() {
    let store = GatedStore::new();
    let idea = seed_idea(store.inner(), "Compost hub", Category::Health, &grace()).await.id;
    store
        .inner()
        .insert_comment_at(&idea, "Smells?", grace().as_author(), Utc::now());
    let board = coordinator(store.clone());
    let before = board.refresh(&idea, Some(&ada())).await.unwrap();

    store.inner().set_offline(true);
    let err = assert_err!(board.comment(&idea, Some(&ada()), "Not at all").await);
    assert!(matches!(err, AppError::Remote(_)));
    assert_eq!(board.display(&idea, Some(&ada())), before);
    assert_eq!(
        store
            .inner()
            .list_comments(&idea, CommentOrder::NewestFirst)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn blank_comment_is_rejected_before_the_ledger() {
    let store = GatedStore::new();
    let idea = seed_idea(store.inner(), "Skate spot", Category::Other, &grace()).await.id;
    let board = coordinator(store.clone());

    let err = assert_err!(board.comment(&idea, Some(&ada()), "   ").await);
    assert_eq!(err, AppError::Validation("Comment text is required".into()));
    let long = "x".repeat(501);
    assert!(board.comment(&idea, Some(&ada()), &long).await.is_err());
    assert_eq!(board.ledger().pending_ideas(), 0);
}

#[tokio::test]
async fn signed_out_viewer_comments_anonymously() {
    let store = GatedStore::new();
    let idea = seed_idea(store.inner(), "Open mic", Category::Creative, &grace()).await.id;
    let board = coordinator(store.clone());

    let shown = assert_ok!(board.comment(&idea, None, "Great idea").await);
    assert_eq!(shown.comments.len(), 1);
    assert!(shown.comments[0].comment.author.is_anonymous());
}
