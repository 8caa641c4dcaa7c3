use adfund::external::{
    HttpRateProvider, LocalBlobStore, LogMailer, Mailer, RateProvider, StaticRates, WebhookMailer,
};
use adfund::{api, init_db, Config, FundingConfig, FundingService, Repository, SchedulerService};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let fallback = StaticRates::new(config.fallback_usd_idr_rate);
    let rates: Arc<dyn RateProvider> = match &config.exchange_rate_api_url {
        Some(url) => Arc::new(HttpRateProvider::new(url.clone(), fallback)),
        None => Arc::new(fallback),
    };
    let mailer: Arc<dyn Mailer> = match &config.mail_webhook_url {
        Some(url) => Arc::new(WebhookMailer::new(url.clone())),
        None => Arc::new(LogMailer),
    };
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;

    let funding = FundingService::new(repo)
        .with_config(FundingConfig {
            topup_expiry_ms: i64::try_from(config.topup_expiry.as_millis())
                .context("TOPUP_EXPIRY_HOURS is too large")?,
            admin_email: config.admin_email.clone(),
        })
        .with_rates(rates)
        .with_mailer(mailer)
        .with_blob_store(Arc::new(LocalBlobStore::new(
            config.upload_dir.clone(),
            config.max_upload_bytes,
        )));

    let scheduler = SchedulerService::new(funding.clone(), config.scheduler_interval).spawn();

    let app = api::create_router(
        api::AppState::new(funding).with_max_upload_bytes(config.max_upload_bytes),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    let served = axum::serve(listener, app).await;
    scheduler.abort();
    served.context("server error")
}
