use customer_news::activity::ActivityLogger;
use customer_news::config::ApiConfig;
use customer_news::news::{NewsClient, UserPreferences};

/// Manual check against the real upstream API.
///
/// Reads CUSTOMER_NEWS_API_KEY (and optionally CUSTOMER_NEWS_API_ENDPOINT)
/// from the environment or a `.env` file.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let api_key = std::env::var("CUSTOMER_NEWS_API_KEY")
        .map_err(|_| "CUSTOMER_NEWS_API_KEY is not set")?;
    let mut config = ApiConfig::default();
    config.api_key = api_key;
    if let Ok(endpoint) = std::env::var("CUSTOMER_NEWS_API_ENDPOINT") {
        config.api_endpoint = endpoint;
    }

    let interest = std::env::args().nth(1).unwrap_or_else(|| "technology".to_string());
    let log_dir = std::env::temp_dir().join("customer-news-check");
    let activity = ActivityLogger::new(&log_dir);
    let client = NewsClient::new(&config, activity.clone())?;

    let preferences = UserPreferences::new("manual-check", interest.as_str(), "", "", "");
    println!("Fetching news for '{}' from {}", interest, config.api_endpoint);

    match client.fetch_news(&preferences).await {
        Ok(articles) => {
            println!("✓ Retrieved {} articles", articles.len());
            for (i, article) in articles.iter().take(3).enumerate() {
                println!("\nArticle {}:", i + 1);
                println!("{}", article.to_text().trim_end());
            }
        }
        Err(e) => {
            println!("✗ Failed to fetch news: {}", e);
        }
    }

    println!("\nActivity log: {}", activity.log_path("manual-check").display());
    for line in activity.entries("manual-check")? {
        println!("  {}", line);
    }

    Ok(())
}
