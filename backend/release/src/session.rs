//! The wizard session task.
//!
//! One task owns the [`Wizard`]. API requests reach it as [`SessionCommand`]s
//! and collaborator results come back as internal events, so every state
//! change goes through [`Wizard::apply`] and nothing holds a lock across an
//! await. Effects are executed by spawning short-lived tasks; the funding
//! observer and the receipt watcher are tied to cancellation tokens so they
//! never outlive the session.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::chain::TxStatus;
use crate::context::AppContext;
use crate::errors::{ReleaseError, Result};
use crate::funding::{FundingObserver, Observation, TRANSFER_WATCH_INTERVAL};
use crate::keygen::{self, ExportFile, GeneratedWallet, KdfParams, KeygenError};
use crate::wizard::{Effect, RegistrationIntent, Wizard, WizardError, WizardEvent, WizardView};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

pub enum SessionCommand {
    Snapshot {
        reply: oneshot::Sender<WizardView>,
    },
    Connect {
        reply: oneshot::Sender<WizardView>,
    },
    Apply {
        event: WizardEvent,
        reply: oneshot::Sender<std::result::Result<WizardView, WizardError>>,
    },
    GenerateWallet {
        reply: oneshot::Sender<std::result::Result<WizardView, WizardError>>,
    },
    ExportWallet {
        passphrase: Option<Zeroizing<String>>,
        plaintext: bool,
        reply: oneshot::Sender<Result<ExportFile>>,
    },
}

/// Cloneable front door to the session task.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn snapshot(&self) -> Result<WizardView> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    pub async fn connect(&self) -> Result<WizardView> {
        self.request(|reply| SessionCommand::Connect { reply }).await
    }

    pub async fn input_identifier(&self, raw: String) -> Result<WizardView> {
        self.apply(WizardEvent::IdentifierInput(raw)).await
    }

    pub async fn generate_wallet(&self) -> Result<WizardView> {
        Ok(self
            .request(|reply| SessionCommand::GenerateWallet { reply })
            .await??)
    }

    pub async fn export_wallet(
        &self,
        passphrase: Option<Zeroizing<String>>,
        plaintext: bool,
    ) -> Result<ExportFile> {
        self.request(|reply| SessionCommand::ExportWallet {
            passphrase,
            plaintext,
            reply,
        })
        .await?
    }

    pub async fn set_confirmation(&self, text: String) -> Result<WizardView> {
        self.apply(WizardEvent::ConfirmationInput(text)).await
    }

    pub async fn release(&self) -> Result<WizardView> {
        self.apply(WizardEvent::SubmitRequested).await
    }

    async fn apply(&self, event: WizardEvent) -> Result<WizardView> {
        Ok(self
            .request(|reply| SessionCommand::Apply { event, reply })
            .await??)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| ReleaseError::SessionClosed)?;
        rx.await.map_err(|_| ReleaseError::SessionClosed)
    }
}

pub struct Session {
    ctx: Arc<AppContext>,
    wizard: Wizard,
    commands: mpsc::Receiver<SessionCommand>,
    events_tx: mpsc::UnboundedSender<WizardEvent>,
    events: mpsc::UnboundedReceiver<WizardEvent>,
    observations_tx: mpsc::Sender<Observation>,
    observations: mpsc::Receiver<Observation>,
    funding_cancel: Option<CancellationToken>,
    shutdown: CancellationToken,
}

impl Session {
    /// Start the session task. It runs until `shutdown` is cancelled.
    pub fn spawn(ctx: Arc<AppContext>, shutdown: CancellationToken) -> SessionHandle {
        let (commands_tx, commands) = mpsc::channel(32);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (observations_tx, observations) = mpsc::channel(16);

        let session = Session {
            wizard: Wizard::new(ctx.config.chain_id, ctx.config.funding_target),
            ctx,
            commands,
            events_tx,
            events,
            observations_tx,
            observations,
            funding_cancel: None,
            shutdown,
        };
        tokio::spawn(session.run());

        SessionHandle {
            commands: commands_tx,
        }
    }

    async fn run(mut self) {
        info!(
            "Release session started: chain {}, registry {}",
            self.ctx.config.chain_id, self.ctx.config.contract_address
        );

        let mut wallet_ticker = tokio::time::interval(self.ctx.poll_interval());
        wallet_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = wallet_ticker.tick() => self.refresh_wallet(),
                Some(command) = self.commands.recv() => self.handle_command(command),
                Some(event) = self.events.recv() => self.dispatch_internal(event),
                Some(observation) = self.observations.recv() => {
                    debug!("Balance observation via {:?}", observation.trigger);
                    self.dispatch_internal(WizardEvent::BalanceObserved(observation.balance));
                }
            }
        }

        self.stop_funding();
        info!("Release session stopped at step {}", self.wizard.step().number());
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.wizard.view());
            }
            SessionCommand::Connect { reply } => {
                self.connect_wallet();
                let _ = reply.send(self.wizard.view());
            }
            SessionCommand::Apply { event, reply } => {
                let result = self.dispatch(event).map(|()| self.wizard.view());
                let _ = reply.send(result);
            }
            SessionCommand::GenerateWallet { reply } => {
                let result = self
                    .dispatch(WizardEvent::WalletGenerated(keygen::generate()))
                    .map(|()| self.wizard.view());
                let _ = reply.send(result);
            }
            SessionCommand::ExportWallet {
                passphrase,
                plaintext,
                reply,
            } => self.export_wallet(passphrase, plaintext, reply),
        }
    }

    fn dispatch(&mut self, event: WizardEvent) -> std::result::Result<(), WizardError> {
        let effects = self.wizard.apply(event)?;
        for effect in effects {
            self.run_effect(effect);
        }
        Ok(())
    }

    /// Collaborator results are never rejected by the reducer; a rejection
    /// here is a bug.
    fn dispatch_internal(&mut self, event: WizardEvent) {
        if let Err(e) = self.dispatch(event) {
            error!("Internal wizard event rejected: {e}");
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::CheckExists(memory_hash) => self.check_exists(memory_hash),
            Effect::PrepareWallet(address) => {
                let prepare = self.ctx.prepare.clone();
                tokio::spawn(async move { prepare.notify(address).await });
            }
            Effect::WatchFunding(address) => self.watch_funding(address),
            Effect::StopFunding => self.stop_funding(),
            Effect::SubmitRegistration { from, intent } => self.submit(from, intent),
            Effect::AwaitReceipt(tx_hash) => self.await_receipt(tx_hash),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Effect runners
    // ─────────────────────────────────────────────────────────

    fn refresh_wallet(&self) {
        let wallet = self.ctx.wallet.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match wallet.status().await {
                Ok(status) => WizardEvent::WalletStatus(status),
                Err(e) => WizardEvent::WalletUnavailable(e.to_string()),
            };
            let _ = events.send(event);
        });
    }

    fn connect_wallet(&self) {
        let wallet = self.ctx.wallet.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match wallet.connect().await {
                Ok(account) => {
                    info!("Wallet connected: {account}");
                    match wallet.status().await {
                        Ok(status) => WizardEvent::WalletStatus(status),
                        Err(e) => WizardEvent::WalletUnavailable(e.to_string()),
                    }
                }
                Err(e) => {
                    warn!("Wallet connection failed: {e}");
                    WizardEvent::WalletUnavailable(e.to_string())
                }
            };
            let _ = events.send(event);
        });
    }

    fn check_exists(&self, memory_hash: B256) {
        let registry = self.ctx.registry.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match registry.soul_exists(memory_hash).await {
                Ok(exists) => WizardEvent::ExistenceResolved {
                    memory_hash,
                    exists,
                },
                Err(e) => WizardEvent::ExistenceFailed {
                    memory_hash,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn watch_funding(&mut self, address: Address) {
        self.stop_funding();
        let cancel = self.shutdown.child_token();
        let observer = FundingObserver {
            token: self.ctx.token.clone(),
            watcher: self.ctx.transfers.clone(),
            address,
            poll_interval: self.ctx.poll_interval(),
            watch_interval: TRANSFER_WATCH_INTERVAL,
        };
        tokio::spawn(observer.run(self.observations_tx.clone(), cancel.clone()));
        self.funding_cancel = Some(cancel);
    }

    fn stop_funding(&mut self) {
        if let Some(cancel) = self.funding_cancel.take() {
            cancel.cancel();
        }
    }

    fn submit(&self, from: Address, intent: RegistrationIntent) {
        let writer = self.ctx.writer.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match writer.submit_registration(from, &intent).await {
                Ok(tx_hash) => WizardEvent::SubmissionSent(tx_hash),
                Err(e) => WizardEvent::SubmissionFailed(e.to_string()),
            };
            let _ = events.send(event);
        });
    }

    fn await_receipt(&self, tx_hash: B256) {
        let writer = self.ctx.writer.clone();
        let events = self.events_tx.clone();
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            let wait = async {
                loop {
                    match writer.transaction_status(tx_hash).await {
                        Ok(TxStatus::Success) => return WizardEvent::TransactionConfirmed(tx_hash),
                        Ok(TxStatus::Reverted) => {
                            return WizardEvent::SubmissionFailed(format!(
                                "transaction {tx_hash} reverted"
                            ))
                        }
                        Ok(TxStatus::Pending) => {}
                        Err(e) => warn!("Receipt lookup for {tx_hash} failed: {e}"),
                    }
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
            };

            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                result = tokio::time::timeout(RECEIPT_TIMEOUT, wait) => match result {
                    Ok(event) => event,
                    Err(_) => WizardEvent::SubmissionFailed(format!(
                        "no receipt for {tx_hash} after {}s",
                        RECEIPT_TIMEOUT.as_secs()
                    )),
                },
            };
            let _ = events.send(event);
        });
    }

    /// Plaintext exports are answered inline. Encrypted exports run the KDF on
    /// the blocking pool and reply from there, so the session keeps serving
    /// commands and events meanwhile.
    fn export_wallet(
        &self,
        passphrase: Option<Zeroizing<String>>,
        plaintext: bool,
        reply: oneshot::Sender<Result<ExportFile>>,
    ) {
        let Some(wallet) = self.wizard.bot_wallet().cloned() else {
            let _ = reply.send(Err(ReleaseError::NoBotWallet));
            return;
        };

        if plaintext {
            let _ = reply.send(self.export_plaintext(&wallet));
            return;
        }

        let kdf = self.ctx.config.keystore_kdf;
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                let passphrase = passphrase.unwrap_or_else(|| Zeroizing::new(String::new()));
                export_encrypted(&wallet, &passphrase, &kdf)
            })
            .await
            .unwrap_or_else(|e| Err(KeygenError::EncryptionFailed(e.to_string()).into()));
            let _ = reply.send(result);
        });
    }

    fn export_plaintext(&self, wallet: &GeneratedWallet) -> Result<ExportFile> {
        if !self.ctx.config.allow_plaintext_export {
            return Err(ReleaseError::PlaintextExportDisabled);
        }
        warn!("Exporting plaintext key for {}", wallet.address());
        Ok(ExportFile {
            file_name: keygen::export_file_name(wallet.address(), false),
            contents: serde_json::to_value(keygen::export_plaintext(wallet))?,
        })
    }
}

fn export_encrypted(wallet: &GeneratedWallet, passphrase: &str, kdf: &KdfParams) -> Result<ExportFile> {
    let keystore = keygen::export_encrypted(wallet, passphrase, kdf)?;
    // The blob must open with the same passphrase before it is handed out.
    if keygen::decrypt_keystore(&keystore, passphrase)?.address() != wallet.address() {
        return Err(KeygenError::InvalidKeystore("address mismatch".to_string()).into());
    }
    Ok(ExportFile {
        file_name: keygen::export_file_name(wallet.address(), true),
        contents: serde_json::to_value(keystore)?,
    })
}
