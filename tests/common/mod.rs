#![allow(dead_code)]

use async_trait::async_trait;
use paygate::application::agent::PaymentAgent;
use paygate::application::authorization::{AuthorizationEngine, NewPolicy};
use paygate::application::reconciliation::ReconciliationService;
use paygate::application::sessions::SessionManager;
use paygate::application::settlement::SettlementCoordinator;
use paygate::config::Config;
use paygate::domain::invoice::{Invoice, InvoiceStatus};
use paygate::domain::money::Amount;
use paygate::domain::policy::{ActorKind, Authorization};
use paygate::domain::ports::{
    ExpectedPayment, ProofVerifier, ProofVerifierHandle, Verification,
};
use paygate::domain::session::ProofReference;
use paygate::error::{PaymentError, Result};
use paygate::infrastructure::in_memory::{
    CollectingNotifier, InMemoryAuditStore, InMemoryExecutionStore, InMemoryInvoiceStore,
    InMemoryPolicyStore, InMemorySessionStore,
};
use paygate::infrastructure::stub_ledger::{StubIndexedSource, StubLedger};
use paygate::infrastructure::verifier::StubVerifier;
use paygate::interfaces::http::rate_limit::RateLimiter;
use paygate::interfaces::http::{AppState, router};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Full service stack over in-memory adapters and the stub ledger.
pub struct Harness {
    pub config: Config,
    pub session_store: Arc<InMemorySessionStore>,
    pub invoices: Arc<InMemoryInvoiceStore>,
    pub policies: Arc<InMemoryPolicyStore>,
    pub executions: Arc<InMemoryExecutionStore>,
    pub audit: Arc<InMemoryAuditStore>,
    pub ledger: Arc<StubLedger>,
    pub indexed: Arc<StubIndexedSource>,
    pub notifier: Arc<CollectingNotifier>,
    pub sessions: Arc<SessionManager>,
    pub engine: Arc<AuthorizationEngine>,
    pub coordinator: Arc<SettlementCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let session_store = Arc::new(InMemorySessionStore::new());
        let invoices = Arc::new(InMemoryInvoiceStore::new());
        let policies = Arc::new(InMemoryPolicyStore::new());
        let executions = Arc::new(InMemoryExecutionStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let ledger = Arc::new(StubLedger::new());
        let indexed = Arc::new(StubIndexedSource::new());
        let notifier = Arc::new(CollectingNotifier::new());

        let sessions = Arc::new(SessionManager::new(session_store.clone(), &config));
        let engine = Arc::new(AuthorizationEngine::new(
            policies.clone(),
            executions.clone(),
            audit.clone(),
        ));
        let coordinator = Arc::new(SettlementCoordinator::new(
            invoices.clone(),
            ledger.clone(),
            notifier.clone(),
            config.external_timeout(),
        ));

        Self {
            config,
            session_store,
            invoices,
            policies,
            executions,
            audit,
            ledger,
            indexed,
            notifier,
            sessions,
            engine,
            coordinator,
        }
    }

    pub fn agent(&self) -> PaymentAgent {
        self.agent_with_verifier(Arc::new(StubVerifier))
    }

    pub fn agent_with_verifier(&self, verifier: ProofVerifierHandle) -> PaymentAgent {
        PaymentAgent::new(
            self.config.protocol_enabled,
            Arc::clone(&self.engine),
            Arc::clone(&self.sessions),
            Arc::clone(&self.coordinator),
            self.invoices.clone(),
            self.ledger.clone(),
            verifier,
            self.config.external_timeout(),
        )
    }

    pub fn reconciliation(&self) -> ReconciliationService {
        ReconciliationService::new(
            self.ledger.clone(),
            Some(self.indexed.clone()),
            Arc::clone(&self.sessions),
            self.config.tolerances(),
            self.config.indexed_lag_threshold_secs,
            self.config.external_timeout(),
        )
    }

    pub fn reconciliation_without_indexer(&self) -> ReconciliationService {
        ReconciliationService::new(
            self.ledger.clone(),
            None,
            Arc::clone(&self.sessions),
            self.config.tolerances(),
            self.config.indexed_lag_threshold_secs,
            self.config.external_timeout(),
        )
    }

    pub fn router(&self) -> axum::Router {
        router(AppState {
            config: Arc::new(self.config.clone()),
            sessions: Arc::clone(&self.sessions),
            engine: Arc::clone(&self.engine),
            coordinator: Arc::clone(&self.coordinator),
            invoices: self.invoices.clone(),
            rate_limiter: Arc::new(RateLimiter::new(
                self.config.rate_limit_max_requests,
                Duration::from_secs(self.config.rate_limit_window_secs),
            )),
        })
    }

    pub async fn add_invoice(&self, id: &str, company: &str, amount: u64, status: InvoiceStatus) {
        use paygate::domain::ports::InvoiceStore;
        self.invoices
            .insert(Invoice {
                id: id.to_string(),
                company_id: company.to_string(),
                amount: Amount::from(amount),
                cumulative_paid: Amount::ZERO,
                status,
                currency: self.config.currency.clone(),
                chain: self.config.chain.clone(),
            })
            .await
            .expect("insert invoice");
    }

    pub async fn add_policy(&self, company: &str, daily: u64, monthly: u64, per_invoice: u64) -> Authorization {
        self.engine
            .create_policy(
                NewPolicy {
                    company_id: company.to_string(),
                    max_amount_per_invoice: Amount::from(per_invoice),
                    daily_limit: Amount::from(daily),
                    monthly_limit: Amount::from(monthly),
                    allowed_currencies: HashSet::from([self.config.currency.clone()]),
                    allowed_chains: HashSet::from([self.config.chain.clone()]),
                    allowed_invoice_statuses: HashSet::from([
                        InvoiceStatus::Approved,
                        InvoiceStatus::PartiallyPaid,
                    ]),
                    auto_approve: true,
                },
                ActorKind::Human,
            )
            .await
            .expect("create policy")
    }
}

/// Format-valid proof reference built from one repeated character.
pub fn proof(seed: char) -> String {
    format!("0x{}", seed.to_string().repeat(64))
}

/// Verifier that refuses every proof; exercises the FAILED execution path.
pub struct FailingVerifier;

#[async_trait]
impl ProofVerifier for FailingVerifier {
    async fn verify(
        &self,
        _proof: &ProofReference,
        _expected: &ExpectedPayment,
    ) -> Result<Verification> {
        Err(PaymentError::VerificationFailed(
            "verifier rejected proof".to_string(),
        ))
    }
}
