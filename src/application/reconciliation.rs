use super::sessions::SessionManager;
use crate::domain::ports::{IndexedSourceHandle, SettlementLedgerHandle};
use crate::domain::snapshot::{
    ReconciledSnapshot, ReconciliationMode, Tolerances, compare_snapshots,
};
use crate::error::{PaymentError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

/// Compares the authoritative ledger against the lagging indexed view and
/// sweeps expired sessions on the same cadence.
///
/// Mismatches are observability signals only; the authoritative snapshot is
/// always the canonical one returned, whatever the mode.
pub struct ReconciliationService {
    ledger: SettlementLedgerHandle,
    indexed: Option<IndexedSourceHandle>,
    sessions: Arc<SessionManager>,
    tolerances: Tolerances,
    lag_threshold_secs: u64,
    external_timeout: Duration,
}

impl ReconciliationService {
    pub fn new(
        ledger: SettlementLedgerHandle,
        indexed: Option<IndexedSourceHandle>,
        sessions: Arc<SessionManager>,
        tolerances: Tolerances,
        lag_threshold_secs: u64,
        external_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            indexed,
            sessions,
            tolerances,
            lag_threshold_secs,
            external_timeout,
        }
    }

    /// Reads both sources and reconciles them.
    ///
    /// Falls back to onchain-only when the indexed source is absent,
    /// unreachable, or too stale to trust; a stale indexed snapshot is still
    /// attached to the result for visibility.
    pub async fn reconciled_snapshot(&self) -> Result<ReconciledSnapshot> {
        let canonical = match timeout(self.external_timeout, self.ledger.snapshot()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PaymentError::ExecutionFailed(
                    "authoritative snapshot read timed out".to_string(),
                ));
            }
        };

        let Some(indexed_source) = &self.indexed else {
            return Ok(ReconciledSnapshot {
                canonical,
                indexed: None,
                mode: ReconciliationMode::OnchainOnly,
                mismatches: Vec::new(),
            });
        };

        let indexed = match timeout(self.external_timeout, indexed_source.snapshot()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(err)) => {
                warn!(%err, "indexed source unreachable; degrading to onchain-only");
                return Ok(ReconciledSnapshot {
                    canonical,
                    indexed: None,
                    mode: ReconciliationMode::OnchainOnly,
                    mismatches: Vec::new(),
                });
            }
            Err(_) => {
                warn!("indexed source read timed out; degrading to onchain-only");
                return Ok(ReconciledSnapshot {
                    canonical,
                    indexed: None,
                    mode: ReconciliationMode::OnchainOnly,
                    mismatches: Vec::new(),
                });
            }
        };

        if indexed.lag_seconds > self.lag_threshold_secs {
            warn!(
                lag_seconds = indexed.lag_seconds,
                threshold = self.lag_threshold_secs,
                "indexed view too stale to reconcile"
            );
            return Ok(ReconciledSnapshot {
                canonical,
                indexed: Some(indexed),
                mode: ReconciliationMode::OnchainOnly,
                mismatches: Vec::new(),
            });
        }

        let mismatches = compare_snapshots(&canonical, &indexed.snapshot, &self.tolerances);
        Ok(ReconciledSnapshot {
            canonical,
            indexed: Some(indexed),
            mode: ReconciliationMode::Reconciled,
            mismatches,
        })
    }

    /// One periodic pass: sweep expired sessions, then reconcile and log.
    pub async fn run_cycle(&self) -> Result<()> {
        let swept = self.sessions.expire_sessions().await?;
        if swept > 0 {
            info!(swept, "expired sessions swept");
        }

        let result = self.reconciled_snapshot().await?;
        match result.mode {
            ReconciliationMode::Reconciled if !result.mismatches.is_empty() => {
                warn!(
                    mismatches = result.mismatches.len(),
                    fields = ?result.mismatches.iter().map(|m| m.field).collect::<Vec<_>>(),
                    "reconciliation mismatches detected"
                );
            }
            ReconciliationMode::Reconciled => {
                debug!("reconciliation clean");
            }
            ReconciliationMode::OnchainOnly => {
                debug!("reconciliation ran onchain-only");
            }
        }
        Ok(())
    }
}

/// Spawns the reconcile-and-sweep loop with the same single-flight interval
/// discipline as the agent.
pub fn spawn_reconciliation(
    service: Arc<ReconciliationService>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = service.run_cycle().await {
                error!(%err, "reconciliation cycle failed; next tick will retry");
            }
        }
    })
}
