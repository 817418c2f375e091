use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sb_domain::adaptor::{Adaptor, AdaptorContext};
use sb_domain::config::{Config, ConfigSeverity};
use sb_domain::docid::DocIdCodec;
use sb_domain::saml::UnconfiguredSaml;
use sb_feed::{BatchingPusher, DefaultListingErrorHandler, FeedSender, ManifestMaker, PushRunner};
use sb_gateway::api::admin::ConfigAdminAuthenticator;
use sb_gateway::cli::{load_config, Cli, Command, ConfigCommand};
use sb_gateway::fs_adaptor::FsAdaptor;
use sb_gateway::runtime::config_watch::ConfigWatcher;
use sb_gateway::runtime::scheduler;
use sb_gateway::state::AppState;
use sb_journal::status::{IndexerCrawlSource, LastPushSource, RetrieverErrorSource, StatusMonitor};
use sb_journal::Journal;
use sb_sessions::SessionStore;
use sb_unzip::AutoUnzipAdaptor;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building the tokio runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        config: config_path,
        define,
        command,
    } = cli;

    match command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, overrides) = load_config(&config_path, &define)?;
            run_server(Arc::new(config), config_path, overrides).await
        }
        Some(Command::Doctor) => {
            let (config, _overrides) = load_config(&config_path, &define)?;
            let passed = sb_gateway::cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, _overrides) = load_config(&config_path, &define)?;
            if !sb_gateway::cli::config::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _overrides) = load_config(&config_path, &define)?;
            sb_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("searchbridge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sb_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway with the given configuration.
async fn run_server(
    config: Arc<Config>,
    config_path: std::path::PathBuf,
    overrides: Vec<(String, String)>,
) -> anyhow::Result<()> {
    tracing::info!("SearchBridge starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── DocId codec ──────────────────────────────────────────────────
    let fallback_hostname = gethostname::gethostname()
        .to_str()
        .unwrap_or("localhost")
        .to_owned();
    let base = config.server.base_url(&fallback_hostname)?;
    let codec = Arc::new(
        DocIdCodec::new(base.clone(), &config.server.doc_id_path, config.docid.is_url)
            .map_err(|e| anyhow::anyhow!("building docid codec: {e}"))?,
    );
    tracing::info!(base = %base, passthrough = config.docid.is_url, "docid codec ready");

    // ── Journal + status monitor ─────────────────────────────────────
    let journal = Arc::new(Journal::new());
    let monitor = Arc::new(StatusMonitor::new());
    monitor.register(Arc::new(LastPushSource::new(journal.clone())));
    monitor.register(Arc::new(RetrieverErrorSource::new(journal.clone())));
    monitor.register(Arc::new(IndexerCrawlSource::new(journal.clone())));
    tracing::info!("journal + status monitor ready");

    // ── Sessions ─────────────────────────────────────────────────────
    let sessions = Arc::new(SessionStore::new(
        chrono::Duration::minutes(config.sessions.lifetime_minutes as i64),
        chrono::Duration::minutes(config.sessions.cleanup_period_minutes as i64),
    ));
    tracing::info!(
        lifetime_minutes = config.sessions.lifetime_minutes,
        "session store ready"
    );

    // ── Adaptor (filesystem + auto-unzip wrapper) ────────────────────
    let adaptor: Arc<dyn Adaptor> = Arc::new(AutoUnzipAdaptor::new(Arc::new(FsAdaptor::new(
        config.adaptor.content_root.clone(),
    ))));
    tracing::info!(
        root = %config.adaptor.content_root.display(),
        "filesystem adaptor ready (zip members virtualized)"
    );

    // ── Push engine ──────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let gsa_hostname = config
        .gsa
        .hostname
        .as_deref()
        .context("gsa.hostname is required")?;
    let sender = Arc::new(FeedSender::new(gsa_hostname, config.server.secure)?);
    let pusher = Arc::new(BatchingPusher::new(
        sender.clone(),
        ManifestMaker::new(&config),
        codec.clone(),
        journal.clone(),
        config.feed.max_urls,
        shutdown.clone(),
    ));
    let runner = Arc::new(PushRunner::new(
        adaptor.clone(),
        pusher,
        journal.clone(),
        Arc::new(DefaultListingErrorHandler::default()),
        shutdown.clone(),
    ));
    tracing::info!(endpoint = %sender.endpoint(), "push engine ready");

    // ── Indexer whitelist ────────────────────────────────────────────
    let gsa_ips: Vec<std::net::IpAddr> = config
        .server
        .gsa_ips
        .iter()
        .filter_map(|raw| raw.parse().ok())
        .collect();
    tracing::info!(whitelisted = gsa_ips.len(), "indexer whitelist ready");

    // ── Admin gate ───────────────────────────────────────────────────
    let admin_auth = ConfigAdminAuthenticator::new(
        config.admin.username.clone(),
        config.admin.password_sha256.as_deref(),
    );
    if !admin_auth.is_enabled() {
        tracing::warn!(
            "dashboard login DISABLED — set admin.password_sha256 to enable the gate"
        );
    }

    // ── App state ────────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        adaptor: adaptor.clone(),
        codec: codec.clone(),
        journal: journal.clone(),
        monitor,
        sessions,
        runner: runner.clone(),
        saml_idp: Arc::new(UnconfiguredSaml),
        saml_authz: Arc::new(UnconfiguredSaml),
        admin_auth: Arc::new(admin_auth),
        gsa_ips: Arc::new(gsa_ips),
        shutdown: shutdown.clone(),
    };

    // ── Adaptor lifecycle ────────────────────────────────────────────
    adaptor
        .init(&AdaptorContext {
            config: config.clone(),
            codec: codec.clone(),
        })
        .await
        .map_err(|e| anyhow::anyhow!("adaptor init failed: {e}"))?;
    tracing::info!("adaptor initialized");

    // ── Full-push schedule ───────────────────────────────────────────
    let (schedule_tx, schedule_rx) =
        tokio::sync::watch::channel(config.adaptor.full_listing_schedule.clone());
    tokio::spawn(scheduler::run_full_push_schedule(
        runner.clone(),
        schedule_rx,
        shutdown.clone(),
    ));
    tracing::info!(
        schedule = %config.adaptor.full_listing_schedule,
        "full-push scheduler started"
    );

    // ── Incremental poll ─────────────────────────────────────────────
    if adaptor.supports_incremental() {
        tokio::spawn(scheduler::run_incremental_poll(
            runner.clone(),
            Duration::from_millis(config.adaptor.incremental_poll_period_millis),
            shutdown.clone(),
        ));
        tracing::info!(
            period_millis = config.adaptor.incremental_poll_period_millis,
            "incremental poll started"
        );
    }

    // ── Config reload watcher ────────────────────────────────────────
    ConfigWatcher::new(config_path, overrides, (*config).clone())
        .on_change(move |old, new| {
            if old.adaptor.full_listing_schedule != new.adaptor.full_listing_schedule {
                let _ = schedule_tx.send(new.adaptor.full_listing_schedule.clone());
            }
        })
        .spawn(shutdown.clone());
    tracing::info!("config watcher started");

    // ── Shutdown signal ──────────────────────────────────────────────
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    // ── Serve ────────────────────────────────────────────────────────
    sb_gateway::server::serve(state).await?;

    // Listeners are down; give an in-flight push the grace period to
    // observe its cancellation, then tear the adaptor down.
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let deadline = tokio::time::Instant::now() + grace;
    while runner.is_running() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    adaptor.destroy().await;
    tracing::info!("SearchBridge stopped");
    Ok(())
}
