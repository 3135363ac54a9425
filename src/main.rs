use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paygate::application::agent::{PaymentAgent, spawn_agent};
use paygate::application::authorization::AuthorizationEngine;
use paygate::application::reconciliation::{ReconciliationService, spawn_reconciliation};
use paygate::application::sessions::SessionManager;
use paygate::application::settlement::SettlementCoordinator;
use paygate::config::{Config, Profile};
use paygate::domain::ports::{
    IndexedSourceHandle, InvoiceStoreHandle, SettlementLedgerHandle,
};
use paygate::infrastructure::in_memory::{
    InMemoryAuditStore, InMemoryExecutionStore, InMemoryInvoiceStore, InMemoryPolicyStore,
    InMemorySessionStore, LogNotifier,
};
use paygate::infrastructure::stub_ledger::{StubIndexedSource, StubLedger};
use paygate::infrastructure::verifier::build_verifier;
use paygate::interfaces::http::rate_limit::RateLimiter;
use paygate::interfaces::http::{AppState, router};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Invoice settlement core", long_about = None)]
struct Cli {
    /// Address to serve the HTTP surface on
    #[arg(long, env = "PAYGATE_LISTEN", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Deployment profile; selects the proof-verifier variant
    #[arg(long, env = "PAYGATE_PROFILE", value_enum, default_value = "development")]
    profile: Profile,

    /// Globally enable or disable the payment protocol
    #[arg(
        long,
        env = "PAYGATE_PROTOCOL_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    protocol_enabled: bool,

    /// Settlement chain identifier
    #[arg(long, env = "PAYGATE_CHAIN", default_value = "base")]
    chain: String,

    /// Settlement currency
    #[arg(long, env = "PAYGATE_CURRENCY", default_value = "USDC")]
    currency: String,

    /// Settlement recipient address
    #[arg(
        long,
        env = "PAYGATE_RECIPIENT",
        default_value = "0x0000000000000000000000000000000000000001"
    )]
    recipient: String,

    /// Payment session TTL in seconds (60..=3600)
    #[arg(long, env = "PAYGATE_SESSION_TTL", default_value_t = 900)]
    session_ttl: u64,

    /// Agent cycle period in seconds
    #[arg(long, env = "PAYGATE_AGENT_INTERVAL", default_value_t = 60)]
    agent_interval: u64,

    /// Reconciliation/sweep cycle period in seconds
    #[arg(long, env = "PAYGATE_RECONCILE_INTERVAL", default_value_t = 60)]
    reconcile_interval: u64,

    /// Indexed-view staleness threshold in seconds
    #[arg(long, env = "PAYGATE_LAG_THRESHOLD", default_value_t = 300)]
    lag_threshold: u64,

    /// Timeout for external ledger and indexer calls, in seconds
    #[arg(long, env = "PAYGATE_EXTERNAL_TIMEOUT", default_value_t = 10)]
    external_timeout: u64,

    /// Absolute reconciliation tolerance for money fields, in minor units
    #[arg(long, env = "PAYGATE_MONEY_TOLERANCE", default_value_t = 100)]
    money_tolerance: u64,

    /// Confirmation depth required by the ledger-backed verifier
    #[arg(long, env = "PAYGATE_MIN_CONFIRMATIONS", default_value_t = 3)]
    min_confirmations: u32,

    /// Disable the indexed source entirely (reconciliation runs onchain-only)
    #[arg(long, env = "PAYGATE_NO_INDEXER")]
    no_indexer: bool,
}

impl Cli {
    fn into_config(self) -> (Config, String, bool) {
        let config = Config {
            profile: self.profile,
            protocol_enabled: self.protocol_enabled,
            chain: self.chain,
            currency: self.currency,
            recipient: self.recipient,
            session_ttl_secs: self.session_ttl,
            agent_interval_secs: self.agent_interval,
            reconcile_interval_secs: self.reconcile_interval,
            indexed_lag_threshold_secs: self.lag_threshold,
            external_timeout_secs: self.external_timeout,
            money_tolerance: Decimal::from(self.money_tolerance),
            min_confirmations: self.min_confirmations,
            rate_limit_max_requests: 5,
            rate_limit_window_secs: 60,
        };
        (config, self.listen, self.no_indexer)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let (config, listen, no_indexer) = Cli::parse().into_config();
    // Invalid configuration aborts before any store or task exists.
    config.validate().into_diagnostic()?;

    let sessions_store = Arc::new(InMemorySessionStore::new());
    let invoices: InvoiceStoreHandle = Arc::new(InMemoryInvoiceStore::new());
    let policies = Arc::new(InMemoryPolicyStore::new());
    let executions = Arc::new(InMemoryExecutionStore::new());
    let audit = Arc::new(InMemoryAuditStore::new());
    let ledger: SettlementLedgerHandle = Arc::new(StubLedger::new());
    let indexed: Option<IndexedSourceHandle> = if no_indexer {
        None
    } else {
        Some(Arc::new(StubIndexedSource::new()))
    };

    let verifier = build_verifier(config.profile, Arc::clone(&ledger), config.min_confirmations);
    let sessions = Arc::new(SessionManager::new(sessions_store, &config));
    let engine = Arc::new(AuthorizationEngine::new(policies, executions, audit));
    let coordinator = Arc::new(SettlementCoordinator::new(
        Arc::clone(&invoices),
        Arc::clone(&ledger),
        Arc::new(LogNotifier),
        config.external_timeout(),
    ));

    let agent = Arc::new(PaymentAgent::new(
        config.protocol_enabled,
        Arc::clone(&engine),
        Arc::clone(&sessions),
        Arc::clone(&coordinator),
        Arc::clone(&invoices),
        Arc::clone(&ledger),
        verifier,
        config.external_timeout(),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        Arc::clone(&ledger),
        indexed,
        Arc::clone(&sessions),
        config.tolerances(),
        config.indexed_lag_threshold_secs,
        config.external_timeout(),
    ));

    let agent_task = spawn_agent(agent, Duration::from_secs(config.agent_interval_secs));
    let reconcile_task = spawn_reconciliation(
        reconciliation,
        Duration::from_secs(config.reconcile_interval_secs),
    );

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    ));
    let state = AppState {
        config: Arc::new(config),
        sessions,
        engine,
        coordinator,
        invoices,
        rate_limiter,
    };

    let listener = tokio::net::TcpListener::bind(&listen).await.into_diagnostic()?;
    info!(%listen, "paygate listening");
    axum::serve(listener, router(state)).await.into_diagnostic()?;

    agent_task.abort();
    reconcile_task.abort();
    Ok(())
}
