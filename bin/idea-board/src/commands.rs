//! Command handlers. Output goes to stdout; diagnostics go through `tracing`.

use ib_core::error::{AppError, Result};
use ib_core::models::{AuthenticatedUser, Idea, IdeaDraft, IdeaId, UserId, VoteDirection};
use ib_sync::{DisplayState, FeedFilter, FeedPager, IdeaService, MutationCoordinator};

use crate::cli::Commands;

pub struct App {
    pub ideas: IdeaService,
    pub board: MutationCoordinator,
    pub page_size: usize,
    pub viewer: Option<AuthenticatedUser>,
}

impl App {
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Feed {
                query,
                category,
                page,
            } => self.feed(query, category, page).await,
            Commands::Show { idea } => self.show(&IdeaId::new(idea)).await,
            Commands::Vote { idea, direction } => self.vote(&IdeaId::new(idea), direction).await,
            Commands::Comment { idea, text } => self.comment(&IdeaId::new(idea), &text).await,
            Commands::Post {
                title,
                body,
                category,
                notes,
            } => {
                self.post(IdeaDraft {
                    title,
                    body,
                    category,
                    notes,
                })
                .await
            }
            Commands::Profile { author } => self.profile(&UserId::new(author)).await,
            Commands::Bio { text } => self.bio(&text).await,
        }
    }

    fn require_viewer(&self, action: &str) -> Result<&AuthenticatedUser> {
        self.viewer
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized(format!("Sign in to {action}")))
    }

    async fn feed(
        &self,
        query: Option<String>,
        category: Option<ib_core::models::Category>,
        page: usize,
    ) -> Result<()> {
        let mut filter = FeedFilter::default();
        if let Some(query) = query {
            filter.set_text(&query);
        }
        if let Some(category) = category {
            filter.toggle_category(category);
        }

        let mut pager = FeedPager::new(filter, self.page_size);
        let shown = self.ideas.feed_page(&mut pager, page).await?;
        self.board.cache().observe_ideas(pager.ideas());

        if shown.is_empty() {
            println!("No ideas found.");
            return Ok(());
        }
        for idea in &shown {
            print_card(idea);
        }
        println!(
            "-- {} of {} ideas{}",
            pager.ideas().len(),
            pager.total(),
            if pager.has_more() { ", more available" } else { "" }
        );
        Ok(())
    }

    async fn show(&self, id: &IdeaId) -> Result<()> {
        let idea = match self.ideas.idea_detail(id).await {
            Ok(idea) => idea,
            Err(err @ AppError::NotFound(..)) => {
                println!("{}. Back to all ideas: idea-board feed", err.user_message());
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let state = self.board.refresh(id, self.viewer.as_ref()).await?;

        println!("{}  [{}]", idea.title, idea.category);
        println!("by {} on {}", idea.author.name, idea.published_at.format("%Y-%m-%d"));
        println!();
        println!("{}", idea.body);
        if let Some(notes) = &idea.notes {
            println!();
            println!("{notes}");
        }
        println!();
        print_state(&state);
        Ok(())
    }

    async fn vote(&self, idea: &IdeaId, direction: VoteDirection) -> Result<()> {
        let viewer = self.viewer.as_ref();
        if viewer.is_some() {
            self.board.refresh(idea, viewer).await?;
        }
        let dispatch = self.board.submit_vote(idea, viewer, direction)?;
        print_votes(dispatch.optimistic());
        let state = dispatch.run().await?;
        print_votes(&state);
        Ok(())
    }

    async fn comment(&self, idea: &IdeaId, text: &str) -> Result<()> {
        let viewer = self.viewer.as_ref();
        self.board.refresh(idea, viewer).await?;
        let dispatch = self.board.submit_comment(idea, viewer, text)?;
        println!("posting: {}", dispatch.draft().text);
        let state = dispatch.run().await?;
        print_state(&state);
        Ok(())
    }

    async fn post(&self, draft: IdeaDraft) -> Result<()> {
        let viewer = self.require_viewer("post an idea")?;
        let idea = self.ideas.create_idea(viewer, draft).await?;
        println!("published {} ({})", idea.title, idea.id);
        Ok(())
    }

    async fn profile(&self, author: &UserId) -> Result<()> {
        let profile = self.ideas.author_profile(author).await?;
        println!("{}", profile.author.name);
        if let Some(bio) = &profile.bio {
            println!("{}", bio.text);
        }
        println!();
        for idea in &profile.ideas {
            print_card(idea);
        }
        Ok(())
    }

    async fn bio(&self, text: &str) -> Result<()> {
        let viewer = self.require_viewer("edit your bio")?;
        let bio = self.ideas.save_bio(viewer, text).await?;
        println!("bio saved ({} characters)", bio.text.chars().count());
        Ok(())
    }
}

fn print_card(idea: &Idea) {
    println!(
        "{:>4}  {}  [{}]  by {}  💬 {}  ({})",
        idea.vote_tally, idea.title, idea.category, idea.author.name, idea.comments_count, idea.id
    );
}

fn print_votes(state: &DisplayState) {
    let mine = match state.direction {
        Some(VoteDirection::Upvote) => "▲",
        Some(VoteDirection::Downvote) => "▼",
        None => "·",
    };
    let pending = if state.vote_pending { " (saving)" } else { "" };
    println!("{mine} {}{pending}", state.tally);
}

fn print_state(state: &DisplayState) {
    print_votes(state);
    println!("{} comments", state.comments.len());
    for shown in &state.comments {
        let marker = if shown.pending { " (sending)" } else { "" };
        println!(
            "  {} · {}{marker}",
            shown.comment.author.name,
            shown.comment.created_at.format("%Y-%m-%d %H:%M")
        );
        println!("    {}", shown.comment.text);
    }
}
