//! Entry points for the account page, the widget and the pagination request.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::news::ArticleRecord;
use crate::storage::{NewsPage, NewsRepository};
use crate::tokens::{RequestTokens, PAGINATE_ACTION, PREFERENCES_ACTION};

pub const PAGINATED_CODE: &str = "paginated";
pub const AJAX_FAILED_CODE: &str = "ajax-failed";

pub const PREFERENCES_UPDATED: &str = "News preferences have been updated.";
pub const FETCH_FAILED: &str = "The news could not be fetched from the API.";
const INVALID_TOKEN_MESSAGE: &str =
    "AJAX could not be processed as nonce couldn't be validated. Please contact the administrator.";
const NO_CACHED_NEWS_MESSAGE: &str =
    "AJAX could not be processed as there are no news items in the memory.";
const EMPTY_PAGE_MESSAGE: &str =
    "AJAX could not be processed as there are no news items in the pagination.";

/// Fields posted by the preference form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferenceSubmission {
    #[serde(default)]
    pub interest: String,
    #[serde(default)]
    pub domains: String,
    #[serde(default)]
    pub date_from: String,
    #[serde(default)]
    pub date_to: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationRequest {
    pub page: usize,
    /// Where the items will be rendered, e.g. `customer-portal` or `widget`.
    #[serde(default)]
    pub section: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationResponse {
    pub code: &'static str,
    pub items: Vec<ArticleRecord>,
    pub page: usize,
    pub total_pages: usize,
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AjaxError {
    pub code: &'static str,
    pub error_message: String,
}

impl AjaxError {
    fn failed(error_message: impl Into<String>) -> Self {
        Self {
            code: AJAX_FAILED_CODE,
            error_message: error_message.into(),
        }
    }
}

impl From<Error> for AjaxError {
    fn from(error: Error) -> Self {
        match error {
            Error::InvalidToken(_) => AjaxError::failed(INVALID_TOKEN_MESSAGE),
            Error::NoCachedNews(_) => AjaxError::failed(NO_CACHED_NEWS_MESSAGE),
            Error::EmptyPage { .. } => AjaxError::failed(EMPTY_PAGE_MESSAGE),
            other => AjaxError::failed(other.to_string()),
        }
    }
}

/// Message shown to the customer, with an optional contact address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub contact_email: Option<String>,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            contact_email: None,
        }
    }

    pub fn with_contact(mut self, email: &str) -> Self {
        if !email.trim().is_empty() {
            self.contact_email = Some(email.trim().to_string());
        }
        self
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.contact_email {
            Some(email) => write!(f, "{} Contact administrator: {}", self.message, email),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "content", rename_all = "snake_case")]
pub enum NewsView {
    Articles(NewsPage),
    Unavailable(Notice),
}

/// Validate the form token, store the trimmed fields and report success.
pub async fn submit_preferences(
    repo: &NewsRepository,
    tokens: &RequestTokens,
    user_id: &str,
    submission: PreferenceSubmission,
) -> Result<Notice> {
    tokens.check(PREFERENCES_ACTION, user_id, &submission.token)?;

    repo.save_preferences(
        user_id,
        submission.interest.trim(),
        submission.domains.trim(),
        submission.date_from.trim(),
        submission.date_to.trim(),
    )
    .await?;

    Ok(Notice::new(PREFERENCES_UPDATED))
}

/// Serve one page of the cached list to the pagination request.
pub fn paginate(
    repo: &NewsRepository,
    tokens: &RequestTokens,
    user_id: &str,
    request: PaginationRequest,
) -> std::result::Result<PaginationResponse, AjaxError> {
    tokens.check(PAGINATE_ACTION, user_id, &request.token)?;

    let page = repo.paginate_for_user(user_id, request.page)?;

    Ok(PaginationResponse {
        code: PAGINATED_CODE,
        items: page.articles,
        page: page.page,
        total_pages: page.total_pages,
        section: request.section,
    })
}

/// First page of the customer's news, fetching on a cold cache.
pub async fn news_view(repo: &NewsRepository, user_id: &str, admin_email: &str) -> Result<NewsView> {
    match repo.first_page(user_id).await? {
        Some(page) => Ok(NewsView::Articles(page)),
        None => Ok(NewsView::Unavailable(
            Notice::new(FETCH_FAILED).with_contact(admin_email),
        )),
    }
}
