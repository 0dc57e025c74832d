pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use crate::error::Result;
use crate::tokens::{PAGINATE_ACTION, PREFERENCES_ACTION};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "customer-news")]
#[command(about = "Per-customer news feed driven by saved preferences")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// News API key
        #[arg(long, env = "CUSTOMER_NEWS_API_KEY")]
        api_key: Option<String>,

        /// News API endpoint
        #[arg(long)]
        endpoint: Option<String>,

        /// Articles per page (1-20)
        #[arg(long)]
        page_size: Option<usize>,

        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Manage a customer's news preferences
    Preferences {
        #[command(subcommand)]
        action: PreferencesCommand,
    },

    /// Show a page of a customer's news
    News {
        /// Customer ID
        user: String,

        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Section tag echoed back with paginated results
        #[arg(short, long, default_value = "customer-portal")]
        section: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Drop a customer's cached news
    Invalidate {
        /// Customer ID
        user: String,
    },

    /// Print a customer's activity log
    Log {
        /// Customer ID
        user: String,

        /// Only show the last N lines
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },

    /// Issue a request token for a customer
    Token {
        /// Customer ID
        user: String,

        /// Action the token is bound to
        #[arg(value_enum, default_value_t = TokenAction::Paginate)]
        action: TokenAction,
    },

    /// Show configuration and cache status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum PreferencesCommand {
    /// Save preferences, replacing every field
    Set {
        /// Customer ID
        user: String,

        /// Keyword query
        #[arg(long, default_value = "")]
        interest: String,

        /// Comma-separated domains
        #[arg(long, default_value = "")]
        domains: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long, default_value = "")]
        from: String,

        /// End date (YYYY-MM-DD)
        #[arg(long, default_value = "")]
        to: String,
    },

    /// Show saved preferences
    Show {
        /// Customer ID
        user: String,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TokenAction {
    Preferences,
    Paginate,
}

impl TokenAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenAction::Preferences => PREFERENCES_ACTION,
            TokenAction::Paginate => PAGINATE_ACTION,
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings = commands::logging_settings(self.config.clone());
        let _guard = commands::init_logging(self.debug, self.verbose, &settings)?;

        match self.command {
            Commands::Init { api_key, endpoint, page_size, force } => {
                commands::init(api_key, endpoint, page_size, force, self.config).await
            }
            Commands::Preferences { action } => match action {
                PreferencesCommand::Set { user, interest, domains, from, to } => {
                    commands::set_preferences(user, interest, domains, from, to, self.config).await
                }
                PreferencesCommand::Show { user } => {
                    commands::show_preferences(user, self.config).await
                }
            },
            Commands::News { user, page, section, json } => {
                commands::news(user, page, section, json, self.config).await
            }
            Commands::Invalidate { user } => {
                commands::invalidate(user, self.config).await
            }
            Commands::Log { user, lines } => {
                commands::show_log(user, lines, self.config).await
            }
            Commands::Token { user, action } => {
                commands::token(user, action, self.config).await
            }
            Commands::Status => {
                commands::status(self.config).await
            }
            Commands::Completions { shell } => {
                commands::generate_completions(shell);
                Ok(())
            }
        }
    }
}
