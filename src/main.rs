use std::sync::Arc;

use anyhow::Result;
use helios::comparators::{self, ExtremePriceOptions};
use helios::live::{LiveStreamManager, WsLiveFeed};
use helios::logging::get_logger;
use helios::prices::PriceCache;
use helios::settings::{FileSettings, SettingsExt, SettingsStore};
use helios::tibber::ApiClient;
use helios::{clock, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    helios::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Helios energy monitor starting up");

    let settings: Arc<dyn SettingsStore> =
        Arc::new(FileSettings::open(&config.settings_file)?);
    let tz = config.reference_timezone()?;
    let logger = get_logger("daemon");

    // Resolve the home to monitor; an explicit id from config wins
    let bootstrap = ApiClient::new(config.api.clone(), String::new(), settings.clone())?;
    let homes = bootstrap.get_homes().await?.homes;
    let home = if config.home_id.is_empty() {
        homes.into_iter().next()
    } else {
        homes.into_iter().find(|h| h.id == config.home_id)
    };
    let Some(home) = home else {
        return Err(anyhow::anyhow!("No matching home on this account"));
    };
    logger.info(&format!("Monitoring home {}", home.id));

    let api = Arc::new(ApiClient::new(
        config.api.clone(),
        home.id.clone(),
        settings.clone(),
    )?);

    // Live stream, when the home has a real-time meter attached
    let live = if home.has_real_time_consumption() {
        let feed = Arc::new(WsLiveFeed::new(api.clone(), config.api.user_agent.clone()));
        let live_logger = get_logger("measurements");
        Some(LiveStreamManager::start(
            feed,
            config.live.clone(),
            move |measurement| {
                if let Some(power) = measurement.power {
                    live_logger.debug(&format!("Power draw {:.0} W", power));
                }
                if let Some(production) = measurement.power_production
                    && production > 0.0
                {
                    live_logger.debug(&format!("Power production {:.0} W", production));
                }
            },
        ))
    } else {
        logger.warn("Home has no real time consumption; live stream disabled");
        None
    };

    let cache = PriceCache::new(api.clone(), tz, config.prices.clone());
    let mut poll = tokio::time::interval(std::time::Duration::from_secs(config.poll_interval_secs));

    loop {
        tokio::select! {
            _ = poll.tick() => {
                if let Err(e) = poll_prices(&cache, &api, &settings, tz).await {
                    logger.error(&format!("Price poll failed: {}", e));
                    if e.is_fatal_for_device() {
                        logger.error("Account or home is not recoverable; shutting down");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    if let Some(live) = live {
        live.destroy();
    }
    cache.destroy();
    info!("Helios shutdown complete");
    Ok(())
}

async fn poll_prices(
    cache: &PriceCache,
    api: &Arc<ApiClient>,
    settings: &Arc<dyn SettingsStore>,
    tz: chrono_tz::Tz,
) -> helios::Result<()> {
    let logger = get_logger("daemon");
    let now = clock::reference_now(tz);
    let series = cache.get_prices_at(now).await?;
    let snapshot = cache.snapshot(&now);

    if let Some(latest) = snapshot.latest.as_ref() {
        let cheapest_now = comparators::price_extremes(
            &logger,
            &series,
            &snapshot,
            &now,
            &ExtremePriceOptions::default(),
            true,
        );
        logger.info(&format!(
            "Current price {:.4} ({}), cheapest hour of today = {}",
            latest.total,
            latest.level.as_str(),
            cheapest_now
        ));
    } else {
        logger.warn("No price known for the current hour");
    }

    log_daily_consumption(api, settings, &now).await;
    Ok(())
}

// Once per local calendar day, pull yesterday's consumption and record the
// watermark so a restart does not repeat the report.
async fn log_daily_consumption(
    api: &Arc<ApiClient>,
    settings: &Arc<dyn SettingsStore>,
    now: &chrono::DateTime<chrono_tz::Tz>,
) {
    let logger = get_logger("report");
    let today = now.date_naive().to_string();
    if settings.daily_consumption_watermark(api.home_id()) == Some(today.clone()) {
        return;
    }

    match api.get_consumption(1, 24).await {
        Ok(data) => {
            let consumed: f64 = data
                .daily
                .map(|page| {
                    page.nodes
                        .iter()
                        .filter_map(|n| n.consumption)
                        .sum()
                })
                .unwrap_or(0.0);
            logger.info(&format!("Consumption over the last day: {:.2} kWh", consumed));
            if let Err(e) = settings.set_daily_consumption_watermark(api.home_id(), &today) {
                logger.warn(&format!("Could not persist report watermark: {}", e));
            }
        }
        Err(e) => logger.warn(&format!("Could not fetch consumption: {}", e)),
    }
}
