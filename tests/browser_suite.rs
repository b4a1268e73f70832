//! Browser-driven example suite
//!
//! The two page scenarios run through the full fixture stack: virtual
//! display, recorded video, teardown screenshot. They need Chrome, Xvfb,
//! ffmpeg, and network access, so they are ignored by default:
//!
//! ```sh
//! cargo test --test browser_suite -- --ignored
//! ```

use std::time::Duration;

use anyhow::Result;
use browser_harness::{BrowserSession, HarnessConfig, HarnessSession};

#[tokio::test]
#[ignore = "requires Chrome, Xvfb, ffmpeg, and network access"]
async fn quotes_site_shows_quotes_across_pages() -> Result<()> {
    let _guard = browser_harness::init_logging();
    let session = HarnessSession::start(HarnessConfig::load()).await;
    let case = session.begin("quotes_site_shows_quotes_across_pages");

    let browser = match BrowserSession::launch(session.browser_config()).await {
        Ok(b) => b,
        Err(e) => {
            case.finish_without_browser().await;
            session.shutdown().await;
            return Err(e.into());
        }
    };

    let result = async {
        browser.goto("https://quotes.toscrape.com/").await?;
        browser.wait_for_navigation().await?;
        assert_eq!(browser.title().await?, "Quotes to Scrape");

        browser
            .wait_for_element(".quote", Duration::from_secs(10))
            .await?;
        let quote = browser.text(".quote span.text").await?;
        let author = browser.text(".quote small.author").await?;
        assert!(!quote.is_empty());
        assert!(!author.is_empty());

        browser.click(".next a").await?;
        browser
            .wait_for_element(".quote", Duration::from_secs(10))
            .await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    // Teardown runs regardless of the scenario outcome: screenshot and
    // recorded video exist for passing and failing runs alike.
    case.finish(&browser).await;
    browser.close().await;
    session.shutdown().await;

    result
}

#[tokio::test]
#[ignore = "requires Chrome, Xvfb, ffmpeg, and network access"]
async fn navigation_lands_on_expected_title() -> Result<()> {
    let _guard = browser_harness::init_logging();
    let session = HarnessSession::start(HarnessConfig::load()).await;
    let case = session.begin("navigation_lands_on_expected_title");

    let browser = match BrowserSession::launch(session.browser_config()).await {
        Ok(b) => b,
        Err(e) => {
            case.finish_without_browser().await;
            session.shutdown().await;
            return Err(e.into());
        }
    };

    let result = async {
        browser.goto("https://www.google.com").await?;
        browser.wait_for_navigation().await?;
        let title = browser.title().await?;
        assert!(title.contains("Google"), "unexpected title: {}", title);
        Ok::<_, anyhow::Error>(())
    }
    .await;

    case.finish(&browser).await;
    browser.close().await;
    session.shutdown().await;

    result
}
