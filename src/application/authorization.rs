use crate::domain::invoice::InvoiceStatus;
use crate::domain::money::Amount;
use crate::domain::policy::{
    ActorKind, AuditAction, AuditLogEntry, Authorization, DenialReason, ExecutionPolicyMode,
    ExecutionRecord, ExecutionStatus, PolicyPatch,
};
use crate::domain::ports::{
    AuditStoreHandle, ExecutionStoreHandle, Page, PolicyStoreHandle,
};
use crate::domain::session::generate_token;
use crate::error::Result;
use chrono::{DateTime, Datelike, NaiveTime, Utc};
use std::collections::HashSet;
use tracing::info;

/// Outcome of a spend-policy check. Denial is an expected steady-state
/// result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed { authorization: Authorization },
    Denied { reason: DenialReason },
}

/// Input for creating a new agent-authorized policy.
#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub company_id: String,
    pub max_amount_per_invoice: Amount,
    pub daily_limit: Amount,
    pub monthly_limit: Amount,
    pub allowed_currencies: HashSet<String>,
    pub allowed_chains: HashSet<String>,
    pub allowed_invoice_statuses: HashSet<InvoiceStatus>,
    pub auto_approve: bool,
}

/// Evaluates spend policy and owns the policy lifecycle plus its audit and
/// execution history.
pub struct AuthorizationEngine {
    policies: PolicyStoreHandle,
    executions: ExecutionStoreHandle,
    audit: AuditStoreHandle,
}

impl AuthorizationEngine {
    pub fn new(
        policies: PolicyStoreHandle,
        executions: ExecutionStoreHandle,
        audit: AuditStoreHandle,
    ) -> Self {
        Self {
            policies,
            executions,
            audit,
        }
    }

    /// Evaluates the checks in strict order, short-circuiting on the first
    /// failure: policy exists, invoice status, currency, chain, per-invoice
    /// cap, daily limit, monthly limit.
    ///
    /// Spend sums read only EXECUTED records at check time; two concurrent
    /// checks can both pass against the same uncommitted spend. Accepted as
    /// eventually consistent since the execution append itself is atomic.
    pub async fn check(
        &self,
        company_id: &str,
        _invoice_id: &str,
        invoice_status: InvoiceStatus,
        amount: Amount,
        currency: &str,
        chain: &str,
    ) -> Result<Decision> {
        let Some(policy) = self.policies.active_for_company(company_id).await? else {
            return Ok(Decision::Denied {
                reason: DenialReason::NoAuthorization,
            });
        };

        if !policy.allows_invoice_status(invoice_status) {
            return Ok(Decision::Denied {
                reason: DenialReason::InvoiceStatusNotAllowed,
            });
        }
        if !policy.allows_currency(currency) {
            return Ok(Decision::Denied {
                reason: DenialReason::CurrencyNotAllowed,
            });
        }
        if !policy.allows_chain(chain) {
            return Ok(Decision::Denied {
                reason: DenialReason::ChainNotAllowed,
            });
        }
        if !policy.within_per_invoice_limit(amount) {
            return Ok(Decision::Denied {
                reason: DenialReason::PerInvoiceLimitExceeded,
            });
        }

        let now = Utc::now();
        let spent_today = self
            .executions
            .executed_total_since(&policy.id, start_of_day(now))
            .await?;
        if !policy.within_daily_limit(spent_today, amount) {
            return Ok(Decision::Denied {
                reason: DenialReason::DailyLimitExceeded,
            });
        }

        let spent_this_month = self
            .executions
            .executed_total_since(&policy.id, start_of_month(now))
            .await?;
        if !policy.within_monthly_limit(spent_this_month, amount) {
            return Ok(Decision::Denied {
                reason: DenialReason::MonthlyLimitExceeded,
            });
        }

        Ok(Decision::Allowed {
            authorization: policy,
        })
    }

    /// Activates a new policy; any prior active policy for the company is
    /// revoked in the same store transaction. Both lifecycle steps are
    /// audited.
    pub async fn create_policy(&self, new: NewPolicy, actor: ActorKind) -> Result<Authorization> {
        let policy = Authorization {
            id: generate_token(),
            company_id: new.company_id,
            mode: ExecutionPolicyMode::AgentAuthorized,
            max_amount_per_invoice: new.max_amount_per_invoice,
            daily_limit: new.daily_limit,
            monthly_limit: new.monthly_limit,
            allowed_currencies: new.allowed_currencies,
            allowed_chains: new.allowed_chains,
            allowed_invoice_statuses: new.allowed_invoice_statuses,
            auto_approve: new.auto_approve,
            active: true,
            created_at: Utc::now(),
            revoked_at: None,
        };
        let revoked = self.policies.create(policy.clone()).await?;

        if let Some(prior) = revoked {
            self.audit_entry(
                &prior.id,
                AuditAction::Revoked,
                ActorKind::System,
                "superseded by new policy".to_string(),
            )
            .await?;
        }
        self.audit_entry(
            &policy.id,
            AuditAction::Created,
            actor,
            format!("policy created for company {}", policy.company_id),
        )
        .await?;
        info!(policy_id = %policy.id, company_id = %policy.company_id, "policy created");
        Ok(policy)
    }

    pub async fn patch_policy(
        &self,
        policy_id: &str,
        patch: PolicyPatch,
        actor: ActorKind,
    ) -> Result<Authorization> {
        let updated = self.policies.patch(policy_id, patch).await?;
        self.audit_entry(policy_id, AuditAction::Updated, actor, "policy updated".to_string())
            .await?;
        Ok(updated)
    }

    pub async fn revoke_policy(&self, policy_id: &str, actor: ActorKind) -> Result<Authorization> {
        let revoked = self.policies.revoke(policy_id).await?;
        self.audit_entry(policy_id, AuditAction::Revoked, actor, "policy revoked".to_string())
            .await?;
        info!(policy_id, "policy revoked");
        Ok(revoked)
    }

    pub async fn get_policy(&self, policy_id: &str) -> Result<Option<Authorization>> {
        self.policies.get(policy_id).await
    }

    pub async fn active_agent_policies(&self) -> Result<Vec<Authorization>> {
        self.policies.active_agent_policies().await
    }

    pub async fn executions(&self, policy_id: &str, page: Page) -> Result<Vec<ExecutionRecord>> {
        self.executions.list(policy_id, page).await
    }

    pub async fn audit_log(&self, policy_id: &str, page: Page) -> Result<Vec<AuditLogEntry>> {
        self.audit.list(policy_id, page).await
    }

    /// Appends one execution record and, for blocked/executed outcomes, the
    /// matching audit entry. Called by the agent loop.
    pub async fn record_execution(&self, record: ExecutionRecord) -> Result<()> {
        let audit_action = match record.status {
            ExecutionStatus::Blocked => Some(AuditAction::Blocked),
            ExecutionStatus::Executed => Some(AuditAction::Executed),
            ExecutionStatus::Failed => None,
        };
        let authorization_id = record.authorization_id.clone();
        let detail = match (&record.reason, record.status) {
            (Some(reason), _) => format!("invoice {}: {}", record.invoice_id, reason),
            (None, _) => format!("invoice {}: amount {}", record.invoice_id, record.amount),
        };
        self.executions.append(record).await?;
        if let Some(action) = audit_action {
            self.audit_entry(&authorization_id, action, ActorKind::Agent, detail)
                .await?;
        }
        Ok(())
    }

    async fn audit_entry(
        &self,
        authorization_id: &str,
        action: AuditAction,
        actor: ActorKind,
        detail: String,
    ) -> Result<()> {
        self.audit
            .append(AuditLogEntry {
                id: generate_token(),
                authorization_id: authorization_id.to_string(),
                action,
                actor,
                detail,
                created_at: Utc::now(),
            })
            .await
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or_else(|| start_of_day(now))
}
