pub mod activity;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod news;
pub mod storage;
pub mod tokens;

pub use activity::ActivityLogger;
pub use config::Config;
pub use error::{Error, FetchError, Result};
pub use news::{ArticleRecord, NewsClient, NewsSource, UserPreferences};
pub use storage::{NewsRepository, RepositoryFactory};
pub use tokens::RequestTokens;
