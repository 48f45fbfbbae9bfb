use async_trait::async_trait;
use chrono::Utc;
use ib_core::error::{AppError, Result};
use ib_core::models::{
    Author, Bio, Comment, CommentOrder, Idea, IdeaDraft, IdeaId, UserId, VoteDirection,
};
use ib_core::query::{GroqQuery, IdeaQuery, Sort};
use ib_core::traits::{EngagementRepo, IdeaRepo};
use tracing::info;

use crate::client::{GroqClient, GroqConfig, Mutation};
use crate::documents::{
    decode_returned, idea_patch, new_bio_document, new_comment_document, new_idea_document,
    vote_document, vote_document_id, BioDoc, CommentDoc, IdeaDoc, VoteDoc, BIO_PROJECTION,
    BIO_TYPE, COMMENT_PROJECTION, COMMENT_TYPE, IDEA_PROJECTION, IDEA_TYPE, VOTE_TYPE,
};

/// Fields searched by the feed's free-text box.
const SEARCH_FIELDS: [&str; 4] = ["title", "body[].children[].text", "author.name", "category"];

/// Document-store backed repositories.
pub struct GroqStore {
    client: GroqClient,
}

impl GroqStore {
    pub fn new(config: GroqConfig) -> Result<Self> {
        Ok(Self {
            client: GroqClient::new(config)?,
        })
    }

    pub fn client(&self) -> &GroqClient {
        &self.client
    }

    /// Commits a single mutation and returns its result.
    async fn mutate_one(&self, mutation: Mutation) -> Result<crate::client::MutationResult> {
        self.client
            .mutate(std::slice::from_ref(&mutation))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Remote("mutation returned no result".into()))
    }
}

/// Selection shared by the feed listing and its count.
pub(crate) fn idea_selection(query: &IdeaQuery) -> GroqQuery {
    let mut selection = GroqQuery::documents(IDEA_TYPE);
    if let Some(category) = query.category {
        selection = selection.where_eq("category", category.as_str());
    }
    if let Some(text) = query.text.as_deref() {
        selection = selection.where_any_match(&SEARCH_FIELDS, text);
    }
    selection
}

#[async_trait]
impl IdeaRepo for GroqStore {
    async fn list_ideas(&self, query: &IdeaQuery) -> Result<Vec<Idea>> {
        let bound = idea_selection(query)
            .order_by("publishedAt", Sort::Desc)
            .range(query.offset, query.limit)
            .project(IDEA_PROJECTION)
            .build();
        let docs: Vec<IdeaDoc> = self.client.query(&bound).await?;
        Ok(docs.into_iter().map(IdeaDoc::into_idea).collect())
    }

    async fn count_ideas(&self, query: &IdeaQuery) -> Result<u64> {
        self.client.query(&idea_selection(query).count()).await
    }

    async fn get_idea(&self, id: &IdeaId) -> Result<Option<Idea>> {
        let bound = GroqQuery::documents(IDEA_TYPE)
            .where_eq("_id", id.as_str())
            .first()
            .project(IDEA_PROJECTION)
            .build();
        let doc: Option<IdeaDoc> = self.client.query(&bound).await?;
        Ok(doc.map(IdeaDoc::into_idea))
    }

    async fn ideas_by_author(&self, author_id: &UserId) -> Result<Vec<Idea>> {
        let bound = GroqQuery::documents(IDEA_TYPE)
            .where_eq("author.id", author_id.as_str())
            .order_by("publishedAt", Sort::Desc)
            .project(IDEA_PROJECTION)
            .build();
        let docs: Vec<IdeaDoc> = self.client.query(&bound).await?;
        Ok(docs.into_iter().map(IdeaDoc::into_idea).collect())
    }

    async fn create_idea(&self, draft: IdeaDraft, author: Author) -> Result<Idea> {
        let published_at = Utc::now();
        let result = self
            .mutate_one(Mutation::Create(new_idea_document(&draft, &author, published_at)))
            .await?;
        info!(id = %result.id, "idea stored");
        Ok(Idea {
            id: IdeaId::new(result.id),
            slug: draft.slug(),
            title: draft.title,
            category: draft.category,
            body: draft.body,
            notes: draft.notes,
            author,
            published_at,
            vote_tally: 0,
            comments_count: 0,
        })
    }

    async fn update_idea(&self, id: &IdeaId, draft: IdeaDraft) -> Result<Idea> {
        self.mutate_one(Mutation::Patch {
            id: id.to_string(),
            set: idea_patch(&draft, Utc::now()),
        })
        .await?;
        self.get_idea(id)
            .await?
            .ok_or_else(|| AppError::not_found("idea", id))
    }

    async fn get_bio(&self, author_id: &UserId) -> Result<Option<Bio>> {
        let bound = GroqQuery::documents(BIO_TYPE)
            .where_eq("author.id", author_id.as_str())
            .first()
            .project(BIO_PROJECTION)
            .build();
        let doc: Option<BioDoc> = self.client.query(&bound).await?;
        Ok(doc.map(BioDoc::into_bio))
    }

    async fn create_bio(&self, text: String, author: Author) -> Result<Bio> {
        let result = self
            .mutate_one(Mutation::Create(new_bio_document(&text, &author, Utc::now())))
            .await?;
        let doc: BioDoc = decode_returned(result.document, &result.id)?;
        Ok(doc.into_bio())
    }

    async fn update_bio(&self, bio_id: &str, text: String) -> Result<Bio> {
        let result = self
            .mutate_one(Mutation::Patch {
                id: bio_id.to_string(),
                set: serde_json::json!({ "bio": text, "updatedAt": Utc::now() }),
            })
            .await?;
        let doc: BioDoc = decode_returned(result.document, &result.id)?;
        Ok(doc.into_bio())
    }
}

#[async_trait]
impl EngagementRepo for GroqStore {
    async fn vote_tally(&self, idea: &IdeaId) -> Result<i64> {
        let bound = GroqQuery::documents(VOTE_TYPE)
            .where_eq("ideaId", idea.as_str())
            .count_difference(
                "direction",
                VoteDirection::Upvote.as_str(),
                VoteDirection::Downvote.as_str(),
            );
        self.client.query(&bound).await
    }

    async fn user_vote(&self, idea: &IdeaId, user: &UserId) -> Result<Option<VoteDirection>> {
        let bound = GroqQuery::documents(VOTE_TYPE)
            .where_eq("_id", vote_document_id(idea, user))
            .first()
            .project("{ direction }")
            .build();
        let doc: Option<VoteDoc> = self.client.query(&bound).await?;
        match doc {
            Some(doc) => doc.direction(),
            None => Ok(None),
        }
    }

    async fn set_vote(&self, idea: &IdeaId, voter: &Author, direction: VoteDirection) -> Result<()> {
        if voter.is_anonymous() {
            return Err(AppError::Unauthorized("Sign in to vote".into()));
        }
        self.mutate_one(Mutation::CreateOrReplace(vote_document(
            idea,
            voter,
            direction,
            Utc::now(),
        )))
        .await?;
        Ok(())
    }

    async fn clear_vote(&self, idea: &IdeaId, user: &UserId) -> Result<()> {
        self.client
            .mutate(&[Mutation::Delete {
                id: vote_document_id(idea, user),
            }])
            .await?;
        Ok(())
    }

    async fn list_comments(&self, idea: &IdeaId, order: CommentOrder) -> Result<Vec<Comment>> {
        let sort = match order {
            CommentOrder::OldestFirst => Sort::Asc,
            CommentOrder::NewestFirst => Sort::Desc,
        };
        let bound = GroqQuery::documents(COMMENT_TYPE)
            .where_eq("ideaId", idea.as_str())
            .order_by("createdAt", sort)
            .project(COMMENT_PROJECTION)
            .build();
        let docs: Vec<CommentDoc> = self.client.query(&bound).await?;
        Ok(docs.into_iter().map(|d| d.into_comment(idea)).collect())
    }

    async fn add_comment(&self, idea: &IdeaId, text: String, author: Author) -> Result<Comment> {
        let result = self
            .mutate_one(Mutation::Create(new_comment_document(
                idea,
                &text,
                &author,
                Utc::now(),
            )))
            .await?;
        let doc: CommentDoc = decode_returned(result.document, &result.id)?;
        Ok(doc.into_comment(idea))
    }
}
