use super::authorization::{AuthorizationEngine, Decision};
use super::sessions::SessionManager;
use super::settlement::SettlementCoordinator;
use crate::domain::invoice::Invoice;
use crate::domain::money::Amount;
use crate::domain::policy::{Authorization, ExecutionRecord, ExecutionStatus};
use crate::domain::ports::{
    ExpectedPayment, InvoiceStoreHandle, SettlementLedgerHandle, TransferRequest,
};
use crate::domain::session::{ExecutionMode, ProofReference, generate_token};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

/// What happened to one candidate invoice during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvoiceOutcome {
    Skipped,
    Blocked,
    Failed,
    Executed,
}

/// Tally of one agent cycle, mostly for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub policies: usize,
    pub executed: usize,
    pub blocked: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Periodic loop that discovers eligible invoices and pays them within
/// policy bounds.
///
/// Failure isolation is per unit of work: an error on one invoice or one
/// company is logged and recorded, and the rest of the batch continues. A
/// cycle-level failure never prevents the next scheduled tick.
pub struct PaymentAgent {
    protocol_enabled: bool,
    engine: Arc<AuthorizationEngine>,
    sessions: Arc<SessionManager>,
    coordinator: Arc<SettlementCoordinator>,
    invoices: InvoiceStoreHandle,
    ledger: SettlementLedgerHandle,
    verifier: crate::domain::ports::ProofVerifierHandle,
    external_timeout: Duration,
}

impl PaymentAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        protocol_enabled: bool,
        engine: Arc<AuthorizationEngine>,
        sessions: Arc<SessionManager>,
        coordinator: Arc<SettlementCoordinator>,
        invoices: InvoiceStoreHandle,
        ledger: SettlementLedgerHandle,
        verifier: crate::domain::ports::ProofVerifierHandle,
        external_timeout: Duration,
    ) -> Self {
        Self {
            protocol_enabled,
            engine,
            sessions,
            coordinator,
            invoices,
            ledger,
            verifier,
            external_timeout,
        }
    }

    /// Runs one discovery-and-payment pass over all active agent policies.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        if !self.protocol_enabled {
            debug!("payment protocol disabled; agent cycle skipped");
            return Ok(report);
        }

        let policies = self.engine_policies().await?;
        report.policies = policies.len();
        for policy in policies {
            if let Err(err) = self.process_policy(&policy, &mut report).await {
                warn!(policy_id = %policy.id, company_id = %policy.company_id, %err,
                    "policy processing failed; continuing with remaining policies");
            }
        }
        info!(
            policies = report.policies,
            executed = report.executed,
            blocked = report.blocked,
            failed = report.failed,
            "agent cycle complete"
        );
        Ok(report)
    }

    async fn engine_policies(&self) -> Result<Vec<Authorization>> {
        // The engine owns the policy store; the agent only needs the active
        // agent-authorized set.
        self.engine.active_agent_policies().await
    }

    async fn process_policy(
        &self,
        policy: &Authorization,
        report: &mut CycleReport,
    ) -> Result<()> {
        let candidates = self
            .invoices
            .payable_for_company(&policy.company_id, &policy.allowed_invoice_statuses)
            .await?;

        for invoice in candidates {
            match self.process_invoice(policy, &invoice).await {
                Ok(InvoiceOutcome::Executed) => report.executed += 1,
                Ok(InvoiceOutcome::Blocked) => report.blocked += 1,
                Ok(InvoiceOutcome::Failed) => report.failed += 1,
                Ok(InvoiceOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(invoice_id = %invoice.id, %err,
                        "invoice processing failed; continuing with remaining invoices");
                    self.record(policy, &invoice, ExecutionStatus::Failed, Some(err.to_string()), None, None)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn process_invoice(
        &self,
        policy: &Authorization,
        invoice: &Invoice,
    ) -> Result<InvoiceOutcome> {
        let remaining = invoice.remaining();
        if remaining.is_zero() {
            return Ok(InvoiceOutcome::Skipped);
        }

        // Out-of-scope currency or chain is filtered before the policy check
        // so steady-state noise never reaches the audit log.
        if !policy.allows_currency(&invoice.currency) || !policy.allows_chain(&invoice.chain) {
            return Ok(InvoiceOutcome::Skipped);
        }

        let decision = self
            .engine
            .check(
                &policy.company_id,
                &invoice.id,
                invoice.status,
                remaining,
                &invoice.currency,
                &invoice.chain,
            )
            .await?;
        let authorization = match decision {
            Decision::Denied { reason } => {
                self.record(
                    policy,
                    invoice,
                    ExecutionStatus::Blocked,
                    Some(reason.to_string()),
                    None,
                    None,
                )
                .await?;
                return Ok(InvoiceOutcome::Blocked);
            }
            Decision::Allowed { authorization } => authorization,
        };

        let session = self
            .sessions
            .open(
                invoice,
                ExecutionMode::AgentAuthorized,
                Some(authorization.id.clone()),
                serde_json::json!({ "autoApprove": authorization.auto_approve }),
            )
            .await?;

        let proof = match self.move_funds(invoice, remaining, &session.recipient).await {
            Ok(proof) => proof,
            Err(err) => {
                self.record(
                    policy,
                    invoice,
                    ExecutionStatus::Failed,
                    Some(err.to_string()),
                    None,
                    Some(session.id.clone()),
                )
                .await?;
                return Ok(InvoiceOutcome::Failed);
            }
        };

        let expected = ExpectedPayment {
            amount: session.amount_requested,
            currency: session.currency.clone(),
            recipient: session.recipient.clone(),
        };
        if let Err(err) = self.verifier.verify(&proof, &expected).await {
            self.record(
                policy,
                invoice,
                ExecutionStatus::Failed,
                Some(err.to_string()),
                Some(proof.to_string()),
                Some(session.id.clone()),
            )
            .await?;
            return Ok(InvoiceOutcome::Failed);
        }

        let outcome = self.sessions.confirm(&session.id, proof.as_str()).await?;
        if outcome.newly_confirmed {
            // Settle in the session's currency, matching what the proof was
            // verified against.
            self.coordinator
                .confirm_payment(
                    &invoice.id,
                    remaining,
                    &session.currency,
                    &proof,
                    &session.id,
                )
                .await?;
        }

        self.record(
            policy,
            invoice,
            ExecutionStatus::Executed,
            None,
            Some(proof.to_string()),
            Some(session.id),
        )
        .await?;
        Ok(InvoiceOutcome::Executed)
    }

    async fn move_funds(
        &self,
        invoice: &Invoice,
        amount: Amount,
        recipient: &str,
    ) -> Result<ProofReference> {
        let request = TransferRequest {
            invoice_id: invoice.id.clone(),
            amount,
            currency: invoice.currency.clone(),
            chain: invoice.chain.clone(),
            recipient: recipient.to_string(),
        };
        match timeout(self.external_timeout, self.ledger.submit_transfer(&request)).await {
            Ok(result) => result,
            Err(_) => Err(PaymentError::ExecutionFailed(
                "fund transfer timed out".to_string(),
            )),
        }
    }

    async fn record(
        &self,
        policy: &Authorization,
        invoice: &Invoice,
        status: ExecutionStatus,
        reason: Option<String>,
        tx_hash: Option<String>,
        session_id: Option<String>,
    ) -> Result<()> {
        self.engine
            .record_execution(ExecutionRecord {
                id: generate_token(),
                authorization_id: policy.id.clone(),
                invoice_id: invoice.id.clone(),
                amount: invoice.remaining(),
                currency: invoice.currency.clone(),
                chain: invoice.chain.clone(),
                status,
                reason,
                tx_hash,
                session_id,
                created_at: Utc::now(),
            })
            .await
    }
}

/// Spawns the fixed-interval agent loop. Single-flight: the cycle is awaited
/// inline on a `Delay`-behavior interval, so a slow cycle postpones the next
/// tick instead of overlapping it.
pub fn spawn_agent(agent: Arc<PaymentAgent>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = agent.run_cycle().await {
                error!(%err, "agent cycle failed; next tick will retry");
            }
        }
    })
}
