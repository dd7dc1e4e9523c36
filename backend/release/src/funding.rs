//! Funding observer for the generated bot wallet.
//!
//! Two sources feed the same observation: a fixed-interval `balanceOf` poll,
//! and ERC-20 `Transfer` logs naming the bot wallet as recipient, each of
//! which triggers an immediate re-poll. Both end up in [`ObservedBalance`],
//! whose satisfied latch guarantees the funded signal fires once.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{TokenReader, TransferWatcher};

/// How often the transfer log watcher looks for new inbound transfers.
pub const TRANSFER_WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// One-shot signal raised the first time the balance reaches the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Funded;

#[derive(Debug, Clone, Serialize)]
pub struct ObservedBalance {
    target: U256,
    latest: Option<U256>,
    satisfied: bool,
}

impl ObservedBalance {
    pub fn new(target: U256) -> Self {
        Self {
            target,
            latest: None,
            satisfied: false,
        }
    }

    /// Record a balance reading. Returns `Some(Funded)` only for the first
    /// reading at or above the target.
    pub fn observe(&mut self, balance: U256) -> Option<Funded> {
        self.latest = Some(balance);
        if !self.satisfied && balance >= self.target {
            self.satisfied = true;
            return Some(Funded);
        }
        None
    }

    /// The funded signal has fired.
    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    /// The most recent reading is still at or above the target.
    pub fn holds(&self) -> bool {
        self.latest.is_some_and(|b| b >= self.target)
    }

    pub fn latest(&self) -> Option<U256> {
        self.latest
    }

    pub fn target(&self) -> U256 {
        self.target
    }

    /// Progress towards the target in basis points, capped at 10 000.
    pub fn progress_bps(&self) -> u32 {
        let latest = self.latest.unwrap_or(U256::ZERO);
        if self.target.is_zero() || latest >= self.target {
            return 10_000;
        }
        let bps = latest * U256::from(10_000u64) / self.target;
        bps.as_limbs()[0] as u32
    }

    /// Amount still missing, floored at zero.
    pub fn remaining(&self) -> U256 {
        self.target
            .saturating_sub(self.latest.unwrap_or(U256::ZERO))
    }
}

/// What prompted a balance reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Interval,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub balance: U256,
    pub trigger: Trigger,
}

/// Handles for one running observer.
pub struct FundingObserver {
    pub token: Arc<dyn TokenReader>,
    pub watcher: Arc<dyn TransferWatcher>,
    pub address: Address,
    pub poll_interval: Duration,
    pub watch_interval: Duration,
}

impl FundingObserver {
    /// Poll until `cancel` fires or the receiving side goes away.
    pub async fn run(self, sink: mpsc::Sender<Observation>, cancel: CancellationToken) {
        info!("Funding observer starting for bot wallet {}", self.address);

        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(8);
        tokio::spawn(watch_transfers(
            self.watcher.clone(),
            self.address,
            self.watch_interval,
            notify_tx,
            cancel.clone(),
        ));

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => Trigger::Interval,
                Some(()) = notify_rx.recv() => {
                    ticker.reset();
                    Trigger::Transfer
                }
            };

            match self.token.balance_of(self.address).await {
                Ok(balance) => {
                    debug!("Bot wallet balance {balance} ({trigger:?})");
                    if sink.send(Observation { balance, trigger }).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Balance poll failed: {e}"),
            }
        }

        info!("Funding observer stopped for bot wallet {}", self.address);
    }
}

async fn watch_transfers(
    watcher: Arc<dyn TransferWatcher>,
    to: Address,
    interval: Duration,
    notify: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    let mut next_block = watcher.latest_block().await.ok();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; logs are first queried one
    // interval after the starting block is pinned.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let from_block = match next_block {
            Some(block) => block,
            None => match watcher.latest_block().await {
                Ok(block) => block,
                Err(e) => {
                    warn!("Could not read latest block for transfer watch: {e}");
                    continue;
                }
            },
        };

        match watcher.transfers_to(to, from_block).await {
            Ok((logs, resume_at)) => {
                next_block = Some(resume_at);
                for log in &logs {
                    info!(
                        "Inbound transfer of {} from {} to {} at block {} (tx {:?})",
                        log.amount, log.from, log.to, log.block_number, log.tx_hash
                    );
                }
                if !logs.is_empty() {
                    // A full channel already holds a pending re-poll.
                    let _ = notify.try_send(());
                }
            }
            Err(e) => {
                next_block = Some(from_block);
                warn!("Transfer log query failed: {e}");
            }
        }
    }
}
