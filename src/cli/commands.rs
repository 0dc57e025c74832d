use std::fs;
use std::path::{Path, PathBuf};
use clap_complete::{generate, Shell};
use clap::CommandFactory;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::activity::ActivityLogger;
use crate::cli::{Cli, TokenAction};
use crate::config::{Config, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::error::{Error, Result};
use crate::handlers::{self, NewsView, PaginationRequest, PreferenceSubmission};
use crate::news::ArticleRecord;
use crate::storage::{
    CacheConfig, FilePreferenceStore, NewsCache, PersistentCache, PersistentCacheConfig,
    PreferenceStore, RepositoryFactory,
};
use crate::tokens::{RequestTokens, PAGINATE_ACTION, PREFERENCES_ACTION};

/// Write a default configuration file
pub async fn init(
    api_key: Option<String>,
    endpoint: Option<String>,
    page_size: Option<usize>,
    force: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    info!("Initializing customer-news configuration");

    let config_file = get_config_file(config_path)?;
    if config_file.exists() && !force {
        warn!("Configuration file already exists: {}", config_file.display());
        println!("⚠️  Configuration already exists: {}", config_file.display());
        println!("   Use --force to overwrite it");
        return Ok(());
    }

    if let Some(parent) = config_file.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            info!("Created configuration directory: {}", parent.display());
        }
    }

    let mut config = Config::default();
    if let Some(key) = api_key {
        config.api.api_key = key;
    }
    if let Some(endpoint) = endpoint {
        config.api.api_endpoint = endpoint;
    }
    if let Some(page_size) = page_size {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(Error::Config(format!(
                "Page size must be between {} and {}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, page_size
            )));
        }
        config.api.page_size = page_size;
    }

    fs::write(&config_file, create_default_config(&config))?;
    info!("Created default configuration: {}", config_file.display());

    let data_dir = config.data_dir()?;
    let log_dir = config.activity_log_dir()?;

    println!("✅ customer-news initialized successfully!");
    println!("   Config file: {}", config_file.display());
    println!("   Data directory: {}", data_dir.display());
    println!("   Activity logs: {}", log_dir.display());
    println!();
    println!("Next steps:");
    if config.api.api_key.is_empty() {
        println!("   1. Set api_key in the [api] section (or CUSTOMER_NEWS_API_KEY)");
    } else {
        println!("   1. API key configured");
    }
    println!("   2. Save preferences: customer-news preferences set <user> --interest <keyword>");
    println!("   3. Read the news: customer-news news <user>");

    Ok(())
}

/// Save a customer's preferences through the form handler
pub async fn set_preferences(
    user: String,
    interest: String,
    domains: String,
    date_from: String,
    date_to: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    info!("Saving preferences for user {}", user);

    let config = load_config(config_path)?;
    let repo = RepositoryFactory::from_config(&config)?;
    let tokens = RequestTokens::from_config(&config.security);

    let submission = PreferenceSubmission {
        interest,
        domains,
        date_from,
        date_to,
        token: tokens.issue(PREFERENCES_ACTION, &user),
    };

    let notice = handlers::submit_preferences(&repo, &tokens, &user, submission).await?;
    println!("✅ {}", notice);

    Ok(())
}

pub async fn show_preferences(user: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = FilePreferenceStore::open(config.data_dir()?)?;

    match store.get(&user).await? {
        Some(prefs) => {
            println!("📋 News preferences for customer {}", user);
            println!("   Interest: {}", display_or_dash(&prefs.interest));
            println!("   Domains: {}", display_or_dash(&prefs.domains));
            println!("   From: {}", display_or_dash(&prefs.date_from));
            println!("   To: {}", display_or_dash(&prefs.date_to));
        }
        None => {
            println!("📋 No preferences saved for customer {}", user);
            println!("   News will be requested without filters");
        }
    }

    Ok(())
}

/// Show one page of a customer's news
pub async fn news(
    user: String,
    page: usize,
    section: String,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    info!("Showing news page {} for user {}", page, user);

    let config = load_config(config_path)?;
    let repo = RepositoryFactory::from_config(&config)?;
    let tokens = RequestTokens::from_config(&config.security);

    let first = match handlers::news_view(&repo, &user, &config.site.admin_email).await? {
        NewsView::Articles(first) => first,
        NewsView::Unavailable(notice) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&NewsView::Unavailable(notice))?);
            } else {
                println!("⚠️  {}", notice);
            }
            return Ok(());
        }
    };

    if page <= 1 {
        if json {
            println!("{}", serde_json::to_string_pretty(&NewsView::Articles(first))?);
        } else {
            print_page(&first.articles, first.page, first.total_pages, repo.page_size());
        }
        return Ok(());
    }

    let request = PaginationRequest {
        page,
        section,
        token: tokens.issue(PAGINATE_ACTION, &user),
    };

    match handlers::paginate(&repo, &tokens, &user, request) {
        Ok(response) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_page(&response.items, response.page, response.total_pages, repo.page_size());
            }
            Ok(())
        }
        Err(ajax) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&ajax)?);
                Ok(())
            } else {
                Err(Error::NotFound(ajax.error_message))
            }
        }
    }
}

pub async fn invalidate(user: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let cache = open_cache(&config)?;

    if cache.invalidate(&user)? {
        println!("🗑️  Cached news for customer {} removed", user);
    } else {
        println!("Nothing cached for customer {}", user);
    }

    Ok(())
}

/// Print a customer's activity log
pub async fn show_log(user: String, lines: Option<usize>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let activity = ActivityLogger::new(config.activity_log_dir()?);

    let entries = activity.entries(&user)?;
    if entries.is_empty() {
        println!("No activity logged for customer {}", user);
        return Ok(());
    }

    let skip = lines.map_or(0, |n| entries.len().saturating_sub(n));
    for line in &entries[skip..] {
        println!("{}", line);
    }

    Ok(())
}

pub async fn token(user: String, action: TokenAction, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    if config.security.token_secret.is_empty() {
        warn!("security.token_secret is empty; this token only verifies inside this process");
    }

    let tokens = RequestTokens::from_config(&config.security);
    println!("{}", tokens.issue(action.as_str(), &user));

    Ok(())
}

/// Show configuration and cache status
pub async fn status(config_path: Option<PathBuf>) -> Result<()> {
    info!("Showing status");

    println!("📊 customer-news Status");
    println!("=======================");

    let config_file = get_config_file(config_path.clone())?;
    if !config_file.exists() {
        println!("❌ Configuration: Not initialized");
        println!("   Run 'customer-news init' to initialize");
        return Ok(());
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("✅ Configuration: {}", config_file.display());
            config
        }
        Err(e) => {
            println!("❌ Configuration: {}", e);
            return Ok(());
        }
    };

    println!("   🌐 Endpoint: {}", config.api.api_endpoint);
    println!("   📄 Page size: {}", config.api.page_size);
    println!("   ⏱️  Timeout: {}s", config.api.timeout);
    if config.api.accept_invalid_certs {
        println!("   ⚠️  TLS certificate verification disabled");
    }

    let data_dir = config.data_dir()?;
    let store = FilePreferenceStore::open(&data_dir)?;
    println!("✅ Preferences: {}", store.path().display());
    println!("   👥 Customers: {}", store.len().await?);

    if config.cache.persist {
        let persistent = PersistentCache::new(PersistentCacheConfig {
            cache_dir: config.cache_dir()?,
            ..Default::default()
        })?;
        let cache = open_cache(&config)?;
        println!("✅ Cache: {}", persistent.cache_path().display());
        println!("   📦 Cached customers: {}", cache.len());
        println!("   💾 Snapshot size: {:.2} MB", persistent.cache_size_mb());
        println!("   ⌛ TTL: {}s", config.cache.ttl);
    } else {
        println!("ℹ️  Cache: memory only (persist = false)");
    }

    let log_dir = config.activity_log_dir()?;
    if log_dir.exists() {
        println!("✅ Activity logs: {}", log_dir.display());
    } else {
        println!("❌ Activity logs: Not found");
    }

    Ok(())
}

/// Generate shell completions
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let cmd_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, cmd_name, &mut std::io::stdout());
}

/// Logging section of the config file, if it can be read.
///
/// The API settings are not validated here so logging works even before
/// the key is configured.
pub fn logging_settings(config_path: Option<PathBuf>) -> Config {
    get_config_file(config_path)
        .ok()
        .and_then(|path| fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .unwrap_or_else(Config::default)
}

/// Initialize logging based on verbosity flags and the `[logging]` section
pub fn init_logging(debug: bool, verbose: bool, config: &Config) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let logging = &config.logging;
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_env("CUSTOMER_NEWS_LOG_LEVEL")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let console = (!logging.json_format).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_file(debug)
            .with_line_number(debug)
    });
    let console_json = logging
        .json_format
        .then(|| fmt::layer().json().with_writer(std::io::stderr));

    let mut guard = None;
    let file = if logging.log_to_file {
        let path = resolve_log_file(config)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| Error::Config(format!("Invalid log file: {}", path.display())))?;
        fs::create_dir_all(&dir)?;

        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        Some(fmt::layer().with_writer(writer).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(console_json)
        .with(file)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    debug!("Logging initialized");
    Ok(guard)
}

/// Relative log paths live under the data directory.
fn resolve_log_file(config: &Config) -> Result<PathBuf> {
    let path = PathBuf::from(&config.logging.log_file);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(config.data_dir()?.join(path))
    }
}

/// Get the configuration file path
fn get_config_file(config_path: Option<PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path),
        None => Ok(Config::config_dir()?.join("config.toml")),
    }
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let config_file = get_config_file(config_path)?;
    if !config_file.exists() {
        return Err(Error::NotFound(
            "Configuration file not found. Run 'customer-news init' first.".to_string(),
        ));
    }
    Config::load_with_env(&config_file)
}

fn open_cache(config: &Config) -> Result<NewsCache> {
    let cache_config = CacheConfig {
        max_entries: config.cache.max_entries,
        default_ttl: config.cache.ttl(),
    };
    if config.cache.persist {
        NewsCache::with_persistence(
            cache_config,
            PersistentCacheConfig {
                cache_dir: config.cache_dir()?,
                ..Default::default()
            },
        )
    } else {
        Ok(NewsCache::new(cache_config))
    }
}

fn print_page(articles: &[ArticleRecord], page: usize, total_pages: usize, page_size: usize) {
    println!("📰 Page {} of {}", page, total_pages);
    println!("================");

    let offset = (page.saturating_sub(1)).saturating_mul(page_size);
    for (i, article) in articles.iter().enumerate() {
        println!("\n{}. {}", offset + i + 1, article.to_text().trim_end());
    }

    if page < total_pages {
        println!("\n💡 Next: --page {}", page + 1);
    }
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

/// Quoted TOML string literal for `value`.
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// Create default configuration content
fn create_default_config(config: &Config) -> String {
    format!(r#"# customer-news Configuration File
# Generated on {}

[api]
# Key for the upstream news API
api_key = {}

# Endpoint queried with q, from, to, domains, sortBy and apiKey
api_endpoint = {}

# Articles per page (1-20)
page_size = {}

# Deadline in seconds for one upstream request
timeout = {}

# Skip TLS certificate verification (not recommended)
accept_invalid_certs = false

[cache]
# Seconds a fetched article list stays valid (default: 4 hours)
ttl = {}

# Maximum number of customers kept in the cache
max_entries = {}

# Keep cached news across restarts
persist = true

[logging]
# Log level: error, warn, info, debug, trace
level = {}

# Also write diagnostics to a file under the data directory
log_to_file = false
log_file = {}

# Emit JSON log lines
json_format = false

# Prefix activity log lines with a timestamp
activity_timestamps = true

[security]
# Secret for request tokens; leave empty for a per-process secret
token_secret = ""

# Seconds a request token stays valid at most
token_lifetime = {}

[site]
# Shown to customers when the news cannot be fetched
admin_email = ""
"#,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        toml_string(&config.api.api_key),
        toml_string(&config.api.api_endpoint),
        config.api.page_size,
        config.api.timeout,
        config.cache.ttl,
        config.cache.max_entries,
        toml_string(&config.logging.level),
        toml_string(&config.logging.log_file),
        config.security.token_lifetime,
    )
}
