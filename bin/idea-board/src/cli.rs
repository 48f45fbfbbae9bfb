use clap::{Args, Parser, Subcommand};
use ib_core::models::{Category, VoteDirection};

#[derive(Parser)]
#[command(name = "idea-board")]
#[command(about = "Browse, vote on and discuss community ideas", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub identity: Identity,

    #[command(subcommand)]
    pub command: Commands,
}

/// Who is acting. Without a user id the viewer is signed out.
#[derive(Args, Debug, Clone)]
pub struct Identity {
    #[arg(long, global = true, env = "IDEA_BOARD_USER_ID")]
    pub user_id: Option<String>,

    #[arg(long, global = true, env = "IDEA_BOARD_USER_NAME")]
    pub user_name: Option<String>,

    #[arg(long, global = true, env = "IDEA_BOARD_USER_EMAIL")]
    pub user_email: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List ideas, newest first
    Feed {
        /// Free-text search over title, description, author and category
        #[arg(long, short)]
        query: Option<String>,

        #[arg(long, short, value_parser = parse_category)]
        category: Option<Category>,

        /// 1-based page of the feed to show
        #[arg(long, default_value = "1")]
        page: usize,
    },

    /// Show one idea with its tally and comments
    Show {
        idea: String,
    },

    /// Vote on an idea; voting the same way again retracts the vote
    Vote {
        idea: String,

        #[arg(value_parser = parse_direction)]
        direction: VoteDirection,
    },

    /// Comment on an idea
    Comment {
        idea: String,

        text: String,
    },

    /// Publish a new idea
    Post {
        #[arg(long)]
        title: String,

        #[arg(long)]
        body: String,

        #[arg(long, value_parser = parse_category, default_value = "other")]
        category: Category,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Show an author's ideas and bio
    Profile {
        author: String,
    },

    /// Create or replace your bio
    Bio {
        text: String,
    },
}

fn parse_category(raw: &str) -> Result<Category, String> {
    raw.parse::<Category>().map_err(|e| e.to_string())
}

fn parse_direction(raw: &str) -> Result<VoteDirection, String> {
    raw.parse::<VoteDirection>().map_err(|e| e.to_string())
}
