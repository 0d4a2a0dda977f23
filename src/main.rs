use tracing::{error, info};

use taolens::browser::BrowserSession;
use taolens::persist::OutputLayout;
use taolens::{load_config, CollectFailure, ProductAssembler};

/// Fallback when no URL is passed on the command line.
const DEFAULT_PRODUCT_URL: &str = "https://item.taobao.com/item.htm?id=853761881909";

/// First non-flag argument is the product URL.
fn parse_url_from_args() -> Option<String> {
    std::env::args().skip(1).find(|a| !a.starts_with("--"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let product_url = match parse_url_from_args() {
        Some(url) => {
            info!("Using URL from command line: {}", url);
            url
        }
        None => {
            info!("No URL given; using default: {}", DEFAULT_PRODUCT_URL);
            DEFAULT_PRODUCT_URL.to_string()
        }
    };

    let cfg = load_config();
    let layout = OutputLayout::timestamped(&cfg.resolve_output_root())?;
    info!("Output folder: {}", layout.root().display());

    let session = BrowserSession::launch(&cfg).await?;

    // Open the storefront first and give the operator a login window; with a
    // warmed-up profile the wait just passes by.
    let login_wait = cfg.resolve_login_wait_secs();
    if login_wait > 0 {
        session
            .login_pause(&cfg.resolve_login_url(), login_wait)
            .await?;
    }

    let assembler = ProductAssembler::new(&session, &cfg);
    let outcome = assembler.scrape(&product_url, &layout).await;

    let exit_code = match outcome {
        Ok(outcome) => {
            layout.write_manifest(&outcome.manifest).await?;
            layout.write_record(&outcome.record).await?;
            layout.write_readable(&outcome.record).await?;
            layout.write_raw_snapshots(&outcome.record).await?;

            info!("--- Scraping Complete ---");
            info!("Styles: {}", outcome.record.styles.len());
            info!("Reviews: {}", outcome.record.details.reviews.len());
            info!("Parameters: {}", outcome.record.details.parameters.len());
            info!(
                "Images: {} main, {} detail",
                outcome.manifest.main.len(),
                outcome.manifest.detail.len()
            );
            if !outcome.record.details.parameters_raw.is_empty() {
                info!(
                    "Raw parameters markup: {} chars",
                    outcome.record.details.parameters_raw.len()
                );
            }
            0
        }
        Err(e @ CollectFailure::OptionPanelMissing { .. }) => {
            error!("{}", e);
            2
        }
        Err(CollectFailure::Session(e)) => {
            error!("Scrape failed: {:#}", e);
            1
        }
    };

    session.shutdown().await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
