//! Application wiring and lifecycle.

use crate::config::AppConfig;
use crate::discovery::{OracleSettlementSource, SpotStrikeResolver};
use crate::env_config::EnvConfig;
use crate::error::{AppError, AppResult};
use crate::manifest::LaunchManifest;
use rust_decimal::Decimal;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use updown_clock::{WindowClock, WindowClockConfig, WindowEvent};
use updown_core::{ComponentSlots, Size, Symbol};
use updown_exec::{
    validate_credentials, Credentials, ExecutionClient, LiveExecutor, LiveExecutorConfig,
    PaperExecutor, SlippageModel, TradingMode,
};
use updown_feed::clob::{ClobFeedConfig, TokenMap};
use updown_feed::exchange::ExchangeFeedConfig;
use updown_feed::oracle::OracleFeedConfig;
use updown_feed::{MarketStateHandle, MarketStateStore, TickQueue};
use updown_orchestrator::{MarketPriceView, Orchestrator, OrchestratorConfig};
use updown_outcome::SignalOutcomeLogger;
use updown_persistence::{DbConfig, PgGateway};
use updown_registry::{builtin, Registry};
use updown_safety::{
    remove_pidfile, write_pidfile, LastKnownState, SafetyConfig, SafetyMonitor, StateFileWriter,
};

fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
}

/// The wired application.
pub struct Application {
    env: EnvConfig,
    config: AppConfig,
    manifest: LaunchManifest,
    gateway: Option<Arc<PgGateway>>,
    registry: Arc<Registry>,
    market: MarketStateHandle,
    queue: TickQueue,
    token_map: TokenMap,
    safety: Arc<SafetyMonitor>,
    outcomes: Arc<SignalOutcomeLogger>,
    orchestrator: Arc<Orchestrator>,
}

impl Application {
    /// Build everything: gateway, catalog, strategies, adapter,
    /// orchestrator. No background task starts here.
    pub async fn init(env: EnvConfig, config: AppConfig) -> AppResult<Self> {
        let project_root = std::env::current_dir()
            .map_err(|e| AppError::Startup(format!("cannot resolve cwd: {e}")))?;
        let manifest = LaunchManifest::load(Path::new(&config.manifest_path), &project_root)?;

        // Persistence first: the registry loads through it.
        let gateway = match &env.database_url {
            Some(url) => {
                let db_config = DbConfig::new(url.clone())
                    .map_err(|e| AppError::Config(e.to_string()))?;
                let gateway = tokio::time::timeout(
                    Duration::from_millis(config.timing.module_init_timeout_ms),
                    PgGateway::connect(db_config),
                )
                .await
                .map_err(|_| AppError::Startup("database connect timed out".into()))?
                .map_err(|e| AppError::Startup(e.to_string()))?;
                gateway
                    .apply_pending(Path::new(&config.migrations_dir))
                    .await
                    .map_err(|e| AppError::Startup(e.to_string()))?;
                Some(gateway)
            }
            None => {
                warn!("No DATABASE_URL; running without durable state");
                None
            }
        };

        let registry = Arc::new(Registry::new(
            gateway.clone().map(|g| g as Arc<dyn updown_registry::StrategyStore>),
        ));
        let rejections = builtin::install(registry.catalog());
        for rejection in &rejections {
            warn!(error = %rejection, "Built-in component rejected at init");
        }
        registry
            .load_from_store()
            .await
            .map_err(|e| AppError::Startup(e.to_string()))?;

        // Manifest strategies missing from the store get the default
        // composition, so a fresh deployment is runnable.
        for name in &manifest.strategies {
            if registry.find_by_name(name).is_none() {
                info!(strategy = %name, "Composing default strategy");
                registry
                    .create_strategy(
                        name.clone(),
                        ComponentSlots {
                            probability: "prob-spot-lag-v1".into(),
                            entry: "entry-fade-extreme-v1".into(),
                            sizing: "sizing-fixed-fraction-v1".into(),
                            exit: "exit-hold-to-expiry-v1".into(),
                        },
                        json!({
                            "position_size_dollars": manifest.position_size_dollars,
                        }),
                    )
                    .await
                    .map_err(|e| AppError::Startup(e.to_string()))?;
            }
        }
        let known: Vec<String> = registry
            .list_strategies(true)
            .iter()
            .map(|s| s.name.clone())
            .collect();
        manifest.validate(&known)?;

        let market = MarketStateStore::new();
        let queue = TickQueue::new(config.feeds.tick_queue_capacity);
        let token_map: TokenMap = Default::default();
        let price_view = MarketPriceView::new(market.clone());

        let exec: Arc<dyn ExecutionClient> = match env.mode {
            TradingMode::Paper => Arc::new(PaperExecutor::new(
                price_view.clone(),
                SlippageModel {
                    slippage: decimal_from_f64(config.paper_slippage),
                },
                env.starting_capital,
            )),
            TradingMode::Live => {
                let creds = env.credentials.as_ref().ok_or_else(|| {
                    AppError::Credentials("LIVE mode without credentials".into())
                })?;
                let live = LiveExecutor::new(
                    LiveExecutorConfig::default(),
                    Credentials {
                        api_key: creds.api_key.clone(),
                        api_secret: creds.api_secret.clone(),
                        passphrase: creds.passphrase.clone(),
                        private_key: creds.private_key.clone(),
                        funder_address: creds.funder_address.clone(),
                    },
                )
                .map_err(|e| AppError::Credentials(e.to_string()))?;
                Arc::new(live)
            }
        };

        // One balance round-trip proves the credentials work.
        validate_credentials(exec.as_ref(), Duration::from_secs(10))
            .await
            .map_err(|e| AppError::Credentials(e.to_string()))?;

        let safety = Arc::new(SafetyMonitor::new(SafetyConfig {
            max_exposure_dollars: manifest.max_exposure_dollars,
            max_daily_loss_dollars: decimal_from_f64(config.safety.max_daily_loss_dollars),
            max_drawdown_dollars: decimal_from_f64(config.safety.max_drawdown_dollars),
            refresh_interval_ms: config.safety.refresh_interval_ms,
        }));

        let outcomes = Arc::new(SignalOutcomeLogger::new(
            gateway.clone().map(|g| g as Arc<dyn updown_outcome::OutcomeStore>),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            OrchestratorConfig {
                tick_interval_ms: config.timing.tick_interval_ms,
                min_time_remaining_ms: config.timing.min_time_remaining_ms,
                inflight_timeout_ms: config.timing.inflight_timeout_ms,
                venue_min_size: Size::new(decimal_from_f64(config.venue_min_size)),
                mode: env.mode,
                allowed_strategies: manifest.strategies.clone(),
            },
            registry.clone(),
            market.clone(),
            exec.clone(),
            outcomes.clone(),
            safety.clone(),
            price_view,
            gateway
                .clone()
                .map(|g| g as Arc<dyn updown_orchestrator::PositionStore>),
        ));

        Ok(Self {
            env,
            config,
            manifest,
            gateway,
            registry,
            market,
            queue,
            token_map,
            safety,
            outcomes,
            orchestrator,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn outcomes(&self) -> &Arc<SignalOutcomeLogger> {
        &self.outcomes
    }

    fn symbols(&self) -> Vec<Symbol> {
        self.manifest.symbols.iter().map(Symbol::new).collect()
    }

    fn write_state_file(&self, writer: &StateFileWriter) {
        let state = LastKnownState {
            open_positions: self.orchestrator.positions().live_positions(),
            inflight_orders: self.orchestrator.inflight().summaries(),
            last_ticks: self.market.latest_prices(),
            auto_stop_state: self.safety.state(),
            written_at: chrono::Utc::now(),
        };
        if let Err(e) = writer.write(&state) {
            warn!(?e, "Last-known-state write failed");
        }
    }

    /// Run until SIGTERM / ctrl-c.
    pub async fn run(self) -> AppResult<()> {
        info!(mode = %self.env.mode, symbols = ?self.manifest.symbols, "Trading engine starting");
        updown_ws::init_crypto();

        let pidfile = Path::new(&self.config.pidfile_path).to_path_buf();
        write_pidfile(&pidfile).map_err(|e| AppError::Startup(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        let symbols = self.symbols();

        // Price feeds.
        tasks.push(updown_feed::exchange::spawn_exchange_feed(
            ExchangeFeedConfig {
                url: self.config.feeds.exchange_ws_url.clone(),
                symbols: symbols.clone(),
                reconnect_base_delay_ms: self.config.feeds.reconnect_base_delay_ms,
                reconnect_max_delay_ms: self.config.feeds.reconnect_max_delay_ms,
            },
            self.queue.clone(),
            shutdown_rx.clone(),
        ));
        let oracle_config = OracleFeedConfig {
            push_url: self.config.feeds.oracle_push_url.clone(),
            sse_url: self.config.feeds.oracle_sse_url.clone(),
            symbols: symbols.clone(),
            reconnect_base_delay_ms: self.config.feeds.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.config.feeds.reconnect_max_delay_ms,
        };
        tasks.push(updown_feed::oracle::spawn_oracle_push_feed(
            oracle_config.clone(),
            self.queue.clone(),
            shutdown_rx.clone(),
        ));
        tasks.push(updown_feed::oracle::spawn_oracle_sse_feed(
            oracle_config,
            self.queue.clone(),
            shutdown_rx.clone(),
        ));
        tasks.push(updown_feed::clob::spawn_clob_book_feed(
            ClobFeedConfig {
                url: self.config.feeds.clob_ws_url.clone(),
                initial_tokens: Vec::new(),
                reconnect_base_delay_ms: self.config.feeds.reconnect_base_delay_ms,
                reconnect_max_delay_ms: self.config.feeds.reconnect_max_delay_ms,
            },
            self.token_map.clone(),
            self.queue.clone(),
            shutdown_rx.clone(),
        ));

        // Tick ingest into the market state store.
        tasks.push(tokio::spawn(updown_feed::market_state::run_ingest(
            self.market.clone(),
            self.queue.clone(),
            shutdown_rx.clone(),
        )));

        // Window clocks, one per symbol, sharing one event channel.
        let (event_tx, event_rx) = mpsc::channel::<WindowEvent>(256);
        for symbol in &symbols {
            let clock = WindowClock::new(
                WindowClockConfig {
                    tick_interval_ms: self.config.timing.tick_interval_ms,
                    min_time_remaining_ms: self.config.timing.min_time_remaining_ms,
                    settlement_grace_ms: self.config.timing.settlement_grace_ms,
                },
                symbol.clone(),
                Arc::new(SpotStrikeResolver::new(self.market.clone())),
                Arc::new(OracleSettlementSource::new(self.market.clone())),
                event_tx.clone(),
            );
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = clock.run(shutdown).await {
                    error!(?e, "Window clock exited");
                }
            }));
        }
        drop(event_tx);

        // Keep the CLOB token map in step with opened windows, then
        // forward events to the orchestrator.
        let (orch_tx, orch_rx) = mpsc::channel::<WindowEvent>(256);
        {
            let token_map = self.token_map.clone();
            let gateway = self.gateway.clone();
            let mut event_rx = event_rx;
            tasks.push(tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    if let WindowEvent::Open(window) = &event {
                        {
                            let mut tokens = token_map.write();
                            tokens.insert(window.up_token_id.clone(), window.symbol.clone());
                            tokens.insert(window.down_token_id.clone(), window.symbol.clone());
                        }
                        if let Some(gateway) = &gateway {
                            if let Err(e) = gateway.upsert_window(window).await {
                                warn!(?e, "Window persist failed");
                            }
                        }
                    }
                    if orch_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }));
        }

        // Orchestrator: recover positions before the first tick.
        self.orchestrator
            .recover()
            .await
            .map_err(|e| AppError::Startup(e.to_string()))?;
        tasks.push(tokio::spawn(
            self.orchestrator.clone().run(orch_rx, shutdown_rx.clone()),
        ));

        // Safety cadence: evaluate thresholds, persist the state.
        {
            let safety = self.safety.clone();
            let gateway = self.gateway.clone();
            let mut shutdown = shutdown_rx.clone();
            let interval_ms = self.safety.config().refresh_interval_ms;
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            safety.evaluate();
                            if let Some(gateway) = &gateway {
                                if let Err(e) = gateway.save_auto_stop(&safety.state()).await {
                                    warn!(?e, "Auto-stop persist failed");
                                }
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
            }));
        }

        // Main wait loop: drives the last-known-state cadence and
        // listens for termination signals.
        let state_writer = StateFileWriter::new(self.config.state_file_path.clone());
        {
            let mut shutdown = shutdown_rx.clone();
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .map_err(|e| AppError::Startup(format!("cannot install SIGTERM handler: {e}")))?;
            let mut interval = tokio::time::interval(Duration::from_millis(
                self.config.timing.state_update_interval_ms,
            ));
            info!("Engine running");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.write_state_file(&state_writer);
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupt received");
                        break;
                    }
                    _ = term.recv() => {
                        info!("SIGTERM received");
                        break;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        // Graceful shutdown: stop issuing work, flush state, wait
        // bounded for the tasks.
        let _ = shutdown_tx.send(true);
        self.write_state_file(&state_writer);

        let deadline = Duration::from_millis(self.config.timing.graceful_timeout_ms);
        let joined = tokio::time::timeout(deadline, async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;
        if joined.is_err() {
            warn!("Graceful timeout expired with tasks still running");
        }

        self.write_state_file(&state_writer);
        remove_pidfile(&pidfile);
        info!("Trading engine stopped");
        Ok(())
    }
}

/// Deployment preflight: env, database, migrations, manifest.
pub async fn preflight(env: &EnvConfig, config: &AppConfig) -> AppResult<()> {
    let project_root = std::env::current_dir()
        .map_err(|e| AppError::Startup(format!("cannot resolve cwd: {e}")))?;
    let manifest = LaunchManifest::load(Path::new(&config.manifest_path), &project_root)?;

    println!("mode: {}", env.mode);
    println!("symbols: {:?}", manifest.symbols);
    println!("strategies: {:?}", manifest.strategies);

    match &env.database_url {
        Some(url) => {
            let db_config =
                DbConfig::new(url.clone()).map_err(|e| AppError::Config(e.to_string()))?;
            let gateway = PgGateway::connect(db_config)
                .await
                .map_err(|e| AppError::Startup(e.to_string()))?;
            let report = gateway
                .preflight(Path::new(&config.migrations_dir))
                .await
                .map_err(|e| AppError::Startup(e.to_string()))?;
            if report.is_clean() {
                println!("migrations: clean");
            } else {
                println!("migrations missing: {:?}", report.missing);
                println!("migrations extra: {:?}", report.extra);
                return Err(AppError::Startup("migrations preflight failed".into()));
            }
        }
        None => println!("database: not configured (paper mode)"),
    }

    Ok(())
}
