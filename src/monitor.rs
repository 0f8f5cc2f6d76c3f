//! Swap Monitor (C4): the live status loop. One logical task owns a
//! registry of tracked swaps, a WebSocket transport with reconnect/backoff,
//! and a polling fallback; callers only ever talk to it through the
//! `SwapMonitor` handle and an `mpsc` command channel (§5's single-task
//! realization of the JS event loop).

use crate::config::Config;
use crate::error::{Error, Result};
use crate::provider::{ProviderWsClient, SwapProvider, WsEvent};
use crate::swap::{ActionKind, Swap, SwapStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Engine-supplied action callbacks, injected once rather than subclassed
/// (§9 design note), so `SwapMonitor` stays engine-agnostic and a test can
/// substitute a stub without touching real engines.
#[async_trait]
pub trait ActionCallbacks: Send + Sync {
    async fn claim_ark(&self, swap: &Swap) -> Result<String>;
    async fn claim_btc(&self, swap: &Swap) -> Result<String>;
    async fn refund_ark(&self, swap: &Swap) -> Result<String>;
    async fn save_swap(&self, swap: &Swap) -> Result<()>;
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    SwapUpdate {
        id: String,
        old_status: SwapStatus,
        new_status: SwapStatus,
    },
    SwapCompleted {
        id: String,
        status: SwapStatus,
        /// The claim txid, if this completion followed a successful claim.
        txid: Option<String>,
    },
    SwapFailed {
        id: String,
        status: SwapStatus,
    },
    ActionExecuted {
        id: String,
        kind: ActionKind,
        result: std::result::Result<String, String>,
    },
    WebSocketDisconnected,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorStats {
    pub tracked: usize,
    pub processing: usize,
    pub use_polling_fallback: bool,
}

type ActionResult = std::result::Result<String, String>;

enum Command {
    AddSwap(Swap),
    RemoveSwap(String),
    HasSwap(String, oneshot::Sender<bool>),
    IsProcessing(String, oneshot::Sender<bool>),
    GetStats(oneshot::Sender<MonitorStats>),
    TriggerAction(String, ActionKind, oneshot::Sender<ActionResult>),
    ActionDone(String, ActionKind, ActionResult),
    Stop,
}

/// Handle to the background monitor task. Cloning is cheap: it's just two
/// channel senders (§5 concurrency contract — `addSwap`/`removeSwap`/
/// `getStats`/etc. are all logically atomic because they're single commands
/// processed by one task).
#[derive(Clone)]
pub struct SwapMonitor {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<MonitorEvent>,
}

impl SwapMonitor {
    /// Spawns the event loop, seeds it with already-persisted swaps
    /// (restored-swap validation happens lazily at action time via
    /// [`Swap::has_action_material`], never here), and connects the
    /// WebSocket transport.
    pub fn spawn(
        config: Config,
        provider: Arc<dyn SwapProvider>,
        callbacks: Arc<dyn ActionCallbacks>,
        pending: Vec<Swap>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(1024);

        let ws = ProviderWsClient::spawn(
            provider.ws_url().to_string(),
            config.reconnect_delay_ms,
            config.max_reconnect_delay_ms,
        );
        for swap in &pending {
            let _ = ws.subscribe_to_swap(swap.id());
        }

        let handle = Self {
            commands: command_tx.clone(),
            events: event_tx.clone(),
        };

        tokio::spawn(run(config, provider, callbacks, pending, ws, command_tx, command_rx, event_tx));

        handle
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn add_swap(&self, swap: Swap) {
        let _ = self.commands.send(Command::AddSwap(swap));
    }

    pub fn remove_swap(&self, id: impl Into<String>) {
        let _ = self.commands.send(Command::RemoveSwap(id.into()));
    }

    pub async fn has_swap(&self, id: impl Into<String>) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::HasSwap(id.into(), tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn is_processing(&self, id: impl Into<String>) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::IsProcessing(id.into(), tx))
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn get_stats(&self) -> MonitorStats {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::GetStats(tx)).is_err() {
            return MonitorStats::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Waits until `id` reaches a terminal status, resolving with the claim
    /// txid if the terminal action produced one. A second caller arriving
    /// while the same swap's action is already in flight shares that
    /// in-flight future rather than racing a second attempt (§9 resolved
    /// open question).
    pub async fn wait_for_swap_completion(&self, id: &str) -> Result<SwapOutcome> {
        let mut events = self.subscribe_events();
        loop {
            match events.recv().await {
                Ok(MonitorEvent::SwapCompleted { id: event_id, status, txid }) if event_id == id => {
                    return Ok(SwapOutcome { status, txid });
                }
                Ok(MonitorEvent::SwapFailed { id: event_id, status, .. }) if event_id == id => {
                    return Err(terminal_error(status));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::Internal(anyhow::anyhow!("manager stopped")));
                }
            }
        }
    }

    /// Runs an action manually (e.g. a restored swap whose autonomous
    /// action was skipped for missing material, now supplied by the
    /// caller). Shares an already in-flight action for the same swap rather
    /// than starting a second one.
    pub async fn trigger_action(&self, id: impl Into<String>, kind: ActionKind) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::TriggerAction(id.into(), kind, tx))
            .map_err(|_| Error::Internal(anyhow::anyhow!("manager stopped")))?;
        rx.await
            .map_err(|_| Error::Internal(anyhow::anyhow!("manager stopped")))?
            .map_err(Error::TransactionFailed)
    }

    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }
}

#[derive(Debug, Clone)]
pub struct SwapOutcome {
    pub status: SwapStatus,
    pub txid: Option<String>,
}

fn terminal_error(status: SwapStatus) -> Error {
    match status {
        SwapStatus::InvoiceExpired => Error::InvoiceExpired,
        SwapStatus::SwapExpired => Error::SwapExpired,
        SwapStatus::TransactionRefunded => Error::TransactionRefunded,
        other => Error::TransactionFailed(format!("swap reached terminal failure status {other:?}")),
    }
}

struct Registry {
    entries: HashMap<String, Swap>,
    processing: HashMap<String, ActionKind>,
    waiters: HashMap<(String, ActionKind), Vec<oneshot::Sender<ActionResult>>>,
    /// Txid of the most recent successful claim per swap id, folded into
    /// the terminal `SwapCompleted` event so `waitForSwapCompletion` can
    /// return it without racing the action and the status update.
    claim_txids: HashMap<String, String>,
}

#[allow(clippy::too_many_arguments)]
async fn run(
    config: Config,
    provider: Arc<dyn SwapProvider>,
    callbacks: Arc<dyn ActionCallbacks>,
    pending: Vec<Swap>,
    ws: ProviderWsClient,
    self_commands: mpsc::UnboundedSender<Command>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<MonitorEvent>,
) {
    let mut registry = Registry {
        entries: pending.into_iter().map(|s| (s.id().to_string(), s)).collect(),
        processing: HashMap::new(),
        waiters: HashMap::new(),
        claim_txids: HashMap::new(),
    };

    let mut ws_events = ws.subscribe_events();
    let mut use_polling_fallback = false;
    let mut poll_failures: u32 = 0;
    let mut poll_timer = tokio::time::interval(std::time::Duration::from_millis(config.poll_interval_ms));
    poll_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(Command::AddSwap(swap)) => {
                        let id = swap.id().to_string();
                        let _ = ws.subscribe_to_swap(&id);
                        registry.entries.insert(id, swap);
                    }
                    Some(Command::RemoveSwap(id)) => {
                        registry.entries.remove(&id);
                        registry.processing.remove(&id);
                    }
                    Some(Command::HasSwap(id, reply)) => {
                        let _ = reply.send(registry.entries.contains_key(&id));
                    }
                    Some(Command::IsProcessing(id, reply)) => {
                        let _ = reply.send(registry.processing.contains_key(&id));
                    }
                    Some(Command::GetStats(reply)) => {
                        let _ = reply.send(MonitorStats {
                            tracked: registry.entries.len(),
                            processing: registry.processing.len(),
                            use_polling_fallback,
                        });
                    }
                    Some(Command::TriggerAction(id, kind, reply)) => {
                        try_start_action(&mut registry, &callbacks, &self_commands, id, kind, Some(reply));
                    }
                    Some(Command::ActionDone(id, kind, result)) => {
                        registry.processing.remove(&id);
                        if matches!(kind, ActionKind::ClaimArk | ActionKind::ClaimBtc) {
                            if let Ok(txid) = &result {
                                registry.claim_txids.insert(id.clone(), txid.clone());
                            }
                        }
                        if let Some(waiters) = registry.waiters.remove(&(id.clone(), kind)) {
                            for waiter in waiters {
                                let _ = waiter.send(result.clone());
                            }
                        }
                        let _ = events.send(MonitorEvent::ActionExecuted { id, kind, result });
                    }
                    Some(Command::Stop) | None => return,
                }
            }

            ws_event = ws_events.recv() => {
                match ws_event {
                    Ok(WsEvent::Connected) => {
                        use_polling_fallback = false;
                        poll_failures = 0;
                        reconcile_once(&provider, &mut registry, &callbacks, &events, &self_commands).await;
                    }
                    Ok(WsEvent::Disconnected) => {
                        use_polling_fallback = true;
                        let _ = events.send(MonitorEvent::WebSocketDisconnected);
                    }
                    Ok(WsEvent::Update(update)) => {
                        apply_status(
                            &mut registry,
                            &callbacks,
                            &events,
                            &self_commands,
                            &update.id,
                            update.status,
                        ).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }

            _ = poll_timer.tick(), if use_polling_fallback => {
                let ids: Vec<String> = registry.entries.keys().cloned().collect();
                let mut any_failed = false;
                for id in ids {
                    match provider.get_swap_status(&id).await {
                        Ok(response) => {
                            apply_status(&mut registry, &callbacks, &events, &self_commands, &id, response.status).await;
                        }
                        Err(e) => {
                            any_failed = true;
                            tracing::warn!(id = %id, error = %e, "poll fallback request failed");
                        }
                    }
                }
                if any_failed {
                    poll_failures += 1;
                    let delay = config.poll_retry_delay_ms.saturating_mul(1u64 << poll_failures.min(10));
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                } else {
                    poll_failures = 0;
                }
            }
        }
    }
}

/// Runs the reconciliation sweep that follows every fresh WS open: one
/// polling pass over every registered id, so events missed during the
/// outage are caught and (per the resolved open question) re-emitted to
/// subscribers through the normal dedup-and-emit path.
async fn reconcile_once(
    provider: &Arc<dyn SwapProvider>,
    registry: &mut Registry,
    callbacks: &Arc<dyn ActionCallbacks>,
    events: &broadcast::Sender<MonitorEvent>,
    self_commands: &mpsc::UnboundedSender<Command>,
) {
    let ids: Vec<String> = registry.entries.keys().cloned().collect();
    for id in ids {
        if let Ok(response) = provider.get_swap_status(&id).await {
            apply_status(registry, callbacks, events, self_commands, &id, response.status).await;
        }
    }
}

/// The per-status state machine step (§4.4): dedupe, persist, emit, maybe
/// act, maybe retire.
async fn apply_status(
    registry: &mut Registry,
    callbacks: &Arc<dyn ActionCallbacks>,
    events: &broadcast::Sender<MonitorEvent>,
    self_commands: &mpsc::UnboundedSender<Command>,
    id: &str,
    new_status: SwapStatus,
) {
    let Some(swap) = registry.entries.get_mut(id) else {
        // Server pushed for an id we don't track; ignore defensively.
        return;
    };

    let old_status = swap.status();
    if old_status == new_status {
        return;
    }
    swap.common_mut().status = new_status;

    if let Err(e) = callbacks.save_swap(swap).await {
        tracing::error!(id, error = %e, "failed to persist swap status update");
    }

    let _ = events.send(MonitorEvent::SwapUpdate {
        id: id.to_string(),
        old_status,
        new_status,
    });

    if let Some(action) = new_status.actionable(swap.kind()) {
        if swap.has_action_material(action) {
            try_start_action(registry, callbacks, self_commands, id.to_string(), action, None);
        } else {
            tracing::warn!(id, ?action, "restored swap missing material for autonomous action, skipping");
        }
    }

    if new_status.is_terminal() {
        registry.entries.remove(id);
        registry.processing.remove(id);
        let event = if matches!(
            new_status,
            SwapStatus::InvoiceSettled | SwapStatus::TransactionClaimed | SwapStatus::TransactionRefunded
        ) {
            MonitorEvent::SwapCompleted {
                id: id.to_string(),
                status: new_status,
                txid: registry.claim_txids.remove(id),
            }
        } else {
            MonitorEvent::SwapFailed { id: id.to_string(), status: new_status }
        };
        let _ = events.send(event);
    }
}

/// Starts (or joins) an autonomous/manual action for `id`. If one is already
/// in flight for the same `kind`, the new caller's reply channel is
/// registered as an additional waiter instead of spawning a second attempt.
/// If a *different* action is in flight, this trigger is a no-op (per the
/// "repeated autonomous triggers while an action is in flight are no-ops"
/// rule) and resolves immediately with an error rather than being queued
/// behind a kind that may never run again.
fn try_start_action(
    registry: &mut Registry,
    callbacks: &Arc<dyn ActionCallbacks>,
    self_commands: &mpsc::UnboundedSender<Command>,
    id: String,
    kind: ActionKind,
    reply: Option<oneshot::Sender<ActionResult>>,
) {
    if let Some(&processing_kind) = registry.processing.get(&id) {
        if processing_kind == kind {
            if let Some(reply) = reply {
                registry.waiters.entry((id, kind)).or_default().push(reply);
            }
        } else if let Some(reply) = reply {
            let _ = reply.send(Err(format!(
                "{processing_kind:?} is already in flight for this swap; {kind:?} is a no-op"
            )));
        }
        return;
    }

    let Some(swap) = registry.entries.get(&id).cloned() else {
        if let Some(reply) = reply {
            let _ = reply.send(Err("unknown swap".to_string()));
        }
        return;
    };

    registry.processing.insert(id.clone(), kind);
    if let Some(reply) = reply {
        registry.waiters.entry((id.clone(), kind)).or_default().push(reply);
    }
    let callbacks = callbacks.clone();
    let self_commands = self_commands.clone();

    tokio::spawn(async move {
        let result = match kind {
            ActionKind::ClaimArk => callbacks.claim_ark(&swap).await,
            ActionKind::ClaimBtc => callbacks.claim_btc(&swap).await,
            ActionKind::RefundArk => callbacks.refund_ark(&swap).await,
        }
        .map_err(|e| e.to_string());

        let _ = self_commands.send(Command::ActionDone(id, kind, result));
    });
}
