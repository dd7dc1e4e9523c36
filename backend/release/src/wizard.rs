//! # Release wizard
//!
//! The five-step flow that takes a connected owner wallet to a registered
//! feral soul:
//!
//! ```text
//! ConnectWallet ──► SubmitIdentifier ──► GenerateWallet ──► FundWallet ──► ConfirmRelease ──► Released
//!       ▲                  │                    │                │               │
//!       └──────────────────┴────────────────────┴────────────────┴───────────────┘
//!                        wallet disconnected / wrong network
//! ```
//!
//! [`Wizard`] is a pure reducer. Every input arrives as a [`WizardEvent`];
//! [`Wizard::apply`] updates state, re-evaluates the guards in order and
//! returns the [`Effect`]s the session must perform. No I/O happens here.
//!
//! Guards advance one step at a time, so a reconnect after a reset walks
//! back through every step whose guard still holds instead of jumping.
//! The reset to `ConnectWallet` keeps the identifier, the generated wallet
//! and the funding observation; only `Released` is immune to it.

use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::WalletStatus;
use crate::funding::ObservedBalance;
use crate::identifier::{self, Identifier, IdentifierError};
use crate::keygen::GeneratedWallet;

/// Literal the user must type before the registration is sent.
pub const CONFIRMATION_PHRASE: &str = "CONFIRM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ConnectWallet,
    SubmitIdentifier,
    GenerateWallet,
    FundWallet,
    ConfirmRelease,
    Released,
}

impl Step {
    /// 1-based position shown in the step indicator; `Released` is past the end.
    pub fn number(self) -> u8 {
        match self {
            Self::ConnectWallet => 1,
            Self::SubmitIdentifier => 2,
            Self::GenerateWallet => 3,
            Self::FundWallet => 4,
            Self::ConfirmRelease => 5,
            Self::Released => 6,
        }
    }
}

/// Registry uniqueness check for the current identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExistenceCheck {
    Pending,
    Available,
    Registered,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Submission {
    Idle,
    /// Handed to the wallet, no transaction hash yet.
    Pending,
    /// Broadcast, waiting for a receipt.
    Sent { tx_hash: B256 },
    Failed { reason: String },
    Confirmed { tx_hash: B256 },
}

impl Submission {
    pub fn in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Sent { .. })
    }

    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            Self::Sent { tx_hash } | Self::Confirmed { tx_hash } => Some(*tx_hash),
            _ => None,
        }
    }
}

/// Arguments of the `registerFeral` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationIntent {
    /// keccak256 of the identifier's hash segment.
    pub memory_hash: B256,
    pub bot_wallet: Address,
    pub arweave_id: String,
    pub initial_funds: U256,
}

#[derive(Debug, Clone)]
pub enum WizardEvent {
    WalletStatus(WalletStatus),
    WalletUnavailable(String),
    IdentifierInput(String),
    ExistenceResolved { memory_hash: B256, exists: bool },
    ExistenceFailed { memory_hash: B256, reason: String },
    WalletGenerated(GeneratedWallet),
    BalanceObserved(U256),
    ConfirmationInput(String),
    SubmitRequested,
    SubmissionSent(B256),
    SubmissionFailed(String),
    TransactionConfirmed(B256),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CheckExists(B256),
    PrepareWallet(Address),
    WatchFunding(Address),
    StopFunding,
    SubmitRegistration {
        from: Address,
        intent: RegistrationIntent,
    },
    AwaitReceipt(B256),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("not available at step {actual:?}, requires {required:?}")]
    WrongStep { required: Step, actual: Step },
    #[error("a bot wallet was already generated for this session")]
    WalletAlreadyGenerated,
    #[error("type CONFIRM to confirm the release")]
    ConfirmationMismatch,
    #[error("a registration is already in flight")]
    SubmissionInFlight,
    #[error("bot wallet balance is below the funding target")]
    NotFunded,
    #[error("no wallet connected")]
    NotConnected,
    #[error("soul already released")]
    AlreadyReleased,
}

/// User-facing status lines for the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    ConnectWallet,
    WalletUnavailable { reason: String },
    WrongNetwork { expected: u64, actual: u64 },
    WalletConnected,
    EnterIdentifier,
    InvalidIdentifier { reason: String },
    CheckingIdentifier,
    IdentifierAvailable,
    AlreadyRegistered,
    ExistenceCheckFailed { reason: String },
    GenerateWallet,
    WaitingForFunds,
    FundsConfirmed,
    Irreversible,
    SubmissionPending,
    SubmissionFailed { reason: String },
    Released,
}

/// Read-only picture of the wizard for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub step: Step,
    pub step_number: u8,
    pub required_chain_id: u64,
    pub wallet: Option<WalletStatus>,
    pub identifier_input: String,
    pub identifier: Option<Identifier>,
    pub existence: Option<ExistenceCheck>,
    pub bot_wallet: Option<Address>,
    pub funding: ObservedBalance,
    pub confirmation_matches: bool,
    pub can_submit: bool,
    pub submission: Submission,
    pub notices: Vec<Notice>,
}

#[derive(Debug)]
pub struct Wizard {
    step: Step,
    required_chain_id: u64,
    wallet_status: Option<WalletStatus>,
    wallet_error: Option<String>,
    identifier_input: String,
    identifier: Option<Identifier>,
    identifier_error: Option<IdentifierError>,
    existence: Option<ExistenceCheck>,
    bot_wallet: Option<GeneratedWallet>,
    funding: ObservedBalance,
    watching_funds: bool,
    confirmation: String,
    submission: Submission,
}

impl Wizard {
    pub fn new(required_chain_id: u64, funding_target: U256) -> Self {
        Self {
            step: Step::ConnectWallet,
            required_chain_id,
            wallet_status: None,
            wallet_error: None,
            identifier_input: String::new(),
            identifier: None,
            identifier_error: None,
            existence: None,
            bot_wallet: None,
            funding: ObservedBalance::new(funding_target),
            watching_funds: false,
            confirmation: String::new(),
            submission: Submission::Idle,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    #[cfg(test)]
    pub fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    pub fn bot_wallet(&self) -> Option<&GeneratedWallet> {
        self.bot_wallet.as_ref()
    }

    #[cfg(test)]
    pub fn funding(&self) -> &ObservedBalance {
        &self.funding
    }

    #[cfg(test)]
    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    /// Apply one event. On `Err` the state is left untouched.
    pub fn apply(&mut self, event: WizardEvent) -> Result<Vec<Effect>, WizardError> {
        let mut effects = Vec::new();

        match event {
            WizardEvent::WalletStatus(status) => {
                self.wallet_status = Some(status);
                self.wallet_error = None;
            }
            WizardEvent::WalletUnavailable(reason) => {
                self.wallet_status = None;
                self.wallet_error = Some(reason);
            }
            WizardEvent::IdentifierInput(raw) => {
                self.require_step(Step::SubmitIdentifier)?;
                self.input_identifier(raw, &mut effects);
            }
            WizardEvent::ExistenceResolved {
                memory_hash,
                exists,
            } => {
                if self.current_hash() == Some(memory_hash) {
                    self.existence = Some(if exists {
                        ExistenceCheck::Registered
                    } else {
                        ExistenceCheck::Available
                    });
                } else {
                    debug!("Ignoring stale existence result for {memory_hash}");
                }
            }
            WizardEvent::ExistenceFailed {
                memory_hash,
                reason,
            } => {
                if self.current_hash() == Some(memory_hash) {
                    warn!("Existence check failed for {memory_hash}: {reason}");
                    self.existence = Some(ExistenceCheck::Failed { reason });
                }
            }
            WizardEvent::WalletGenerated(wallet) => {
                if self.bot_wallet.is_some() {
                    return Err(WizardError::WalletAlreadyGenerated);
                }
                self.require_step(Step::GenerateWallet)?;
                info!("Bot wallet generated: {}", wallet.address());
                effects.push(Effect::PrepareWallet(wallet.address()));
                self.bot_wallet = Some(wallet);
            }
            WizardEvent::BalanceObserved(balance) => {
                if self.funding.observe(balance).is_some() {
                    info!(
                        "Funding target reached: {balance} >= {}",
                        self.funding.target()
                    );
                }
            }
            WizardEvent::ConfirmationInput(text) => {
                self.require_step(Step::ConfirmRelease)?;
                if self.submission.in_flight() {
                    return Err(WizardError::SubmissionInFlight);
                }
                self.confirmation = text;
            }
            WizardEvent::SubmitRequested => {
                let (from, intent) = self.check_submit()?;
                info!(
                    "Submitting registration for {} (bot wallet {})",
                    intent.memory_hash, intent.bot_wallet
                );
                self.submission = Submission::Pending;
                effects.push(Effect::SubmitRegistration { from, intent });
            }
            WizardEvent::SubmissionSent(tx_hash) => {
                if self.submission == Submission::Pending {
                    info!("Registration broadcast: {tx_hash}");
                    self.submission = Submission::Sent { tx_hash };
                    effects.push(Effect::AwaitReceipt(tx_hash));
                }
            }
            WizardEvent::SubmissionFailed(reason) => {
                if self.submission.in_flight() {
                    warn!("Registration failed: {reason}");
                    self.submission = Submission::Failed { reason };
                    self.confirmation.clear();
                }
            }
            WizardEvent::TransactionConfirmed(tx_hash) => {
                if self.submission == (Submission::Sent { tx_hash }) {
                    self.submission = Submission::Confirmed { tx_hash };
                }
            }
        }

        self.evaluate(&mut effects);
        Ok(effects)
    }

    /// Whether the release button should be enabled.
    pub fn can_submit(&self) -> bool {
        self.check_submit().is_ok()
    }

    pub fn view(&self) -> WizardView {
        WizardView {
            step: self.step,
            step_number: self.step.number(),
            required_chain_id: self.required_chain_id,
            wallet: self.wallet_status,
            identifier_input: self.identifier_input.clone(),
            identifier: self.identifier.clone(),
            existence: self.existence.clone(),
            bot_wallet: self.bot_wallet.as_ref().map(GeneratedWallet::address),
            funding: self.funding.clone(),
            confirmation_matches: self.confirmation == CONFIRMATION_PHRASE,
            can_submit: self.can_submit(),
            submission: self.submission.clone(),
            notices: self.notices(),
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        let mut notices = Vec::new();
        match self.step {
            Step::ConnectWallet => match (&self.wallet_status, &self.wallet_error) {
                (_, Some(reason)) => notices.push(Notice::WalletUnavailable {
                    reason: reason.clone(),
                }),
                (Some(status), None) if status.account.is_some() => {
                    notices.push(Notice::WrongNetwork {
                        expected: self.required_chain_id,
                        actual: status.chain_id,
                    })
                }
                _ => notices.push(Notice::ConnectWallet),
            },
            Step::SubmitIdentifier => {
                if let Some(err) = &self.identifier_error {
                    notices.push(Notice::InvalidIdentifier {
                        reason: err.to_string(),
                    });
                } else {
                    match &self.existence {
                        None => notices.push(Notice::EnterIdentifier),
                        Some(ExistenceCheck::Pending) => notices.push(Notice::CheckingIdentifier),
                        Some(ExistenceCheck::Available) => {
                            notices.push(Notice::IdentifierAvailable)
                        }
                        Some(ExistenceCheck::Registered) => notices.push(Notice::AlreadyRegistered),
                        Some(ExistenceCheck::Failed { reason }) => {
                            notices.push(Notice::ExistenceCheckFailed {
                                reason: reason.clone(),
                            })
                        }
                    }
                }
            }
            Step::GenerateWallet => notices.push(Notice::GenerateWallet),
            Step::FundWallet => notices.push(Notice::WaitingForFunds),
            Step::ConfirmRelease => {
                notices.push(Notice::FundsConfirmed);
                match &self.submission {
                    Submission::Pending | Submission::Sent { .. } => {
                        notices.push(Notice::SubmissionPending)
                    }
                    Submission::Failed { reason } => notices.push(Notice::SubmissionFailed {
                        reason: reason.clone(),
                    }),
                    _ => notices.push(Notice::Irreversible),
                }
            }
            Step::Released => notices.push(Notice::Released),
        }
        if self.step > Step::ConnectWallet && self.step < Step::Released {
            notices.insert(0, Notice::WalletConnected);
        }
        notices
    }

    // ─────────────────────────────────────────────────────────
    // Guards
    // ─────────────────────────────────────────────────────────

    fn network_ok(&self) -> bool {
        self.wallet_status
            .is_some_and(|s| s.account.is_some() && s.chain_id == self.required_chain_id)
    }

    fn connected_account(&self) -> Option<Address> {
        self.wallet_status
            .filter(|s| s.chain_id == self.required_chain_id)
            .and_then(|s| s.account)
    }

    fn current_hash(&self) -> Option<B256> {
        self.identifier.as_ref().map(Identifier::registration_hash)
    }

    fn require_step(&self, required: Step) -> Result<(), WizardError> {
        if self.step == Step::Released {
            return Err(WizardError::AlreadyReleased);
        }
        if self.step != required {
            return Err(WizardError::WrongStep {
                required,
                actual: self.step,
            });
        }
        Ok(())
    }

    fn check_submit(&self) -> Result<(Address, RegistrationIntent), WizardError> {
        self.require_step(Step::ConfirmRelease)?;
        if self.submission.in_flight() {
            return Err(WizardError::SubmissionInFlight);
        }
        if self.confirmation != CONFIRMATION_PHRASE {
            return Err(WizardError::ConfirmationMismatch);
        }
        if !self.funding.holds() {
            return Err(WizardError::NotFunded);
        }
        let from = self.connected_account().ok_or(WizardError::NotConnected)?;
        let (identifier, bot_wallet) = match (&self.identifier, &self.bot_wallet) {
            (Some(identifier), Some(wallet)) => (identifier, wallet),
            _ => {
                return Err(WizardError::WrongStep {
                    required: Step::ConfirmRelease,
                    actual: self.step,
                })
            }
        };

        Ok((
            from,
            RegistrationIntent {
                memory_hash: identifier.registration_hash(),
                bot_wallet: bot_wallet.address(),
                arweave_id: identifier.content_id.clone(),
                initial_funds: self.funding.target(),
            },
        ))
    }

    fn input_identifier(&mut self, raw: String, effects: &mut Vec<Effect>) {
        match identifier::parse(&raw) {
            Ok(parsed) => {
                let changed = self.identifier.as_ref() != Some(&parsed);
                let retry = matches!(self.existence, Some(ExistenceCheck::Failed { .. }));
                if changed || retry || self.existence.is_none() {
                    self.existence = Some(ExistenceCheck::Pending);
                    effects.push(Effect::CheckExists(parsed.registration_hash()));
                }
                self.identifier = Some(parsed);
                self.identifier_error = None;
            }
            Err(err) => {
                debug!("Rejected identifier input: {err}");
                self.identifier = None;
                self.existence = None;
                self.identifier_error = Some(err);
            }
        }
        self.identifier_input = raw;
    }

    fn next_step(&self) -> Option<Step> {
        match self.step {
            Step::ConnectWallet => self.network_ok().then_some(Step::SubmitIdentifier),
            Step::SubmitIdentifier => (self.identifier.is_some()
                && self.existence == Some(ExistenceCheck::Available))
            .then_some(Step::GenerateWallet),
            Step::GenerateWallet => self.bot_wallet.is_some().then_some(Step::FundWallet),
            Step::FundWallet => self.funding.is_satisfied().then_some(Step::ConfirmRelease),
            Step::ConfirmRelease => matches!(self.submission, Submission::Confirmed { .. })
                .then_some(Step::Released),
            Step::Released => None,
        }
    }

    fn evaluate(&mut self, effects: &mut Vec<Effect>) {
        if self.step > Step::ConnectWallet && self.step < Step::Released && !self.network_ok() {
            warn!(
                "Wallet disconnected or on the wrong network at step {}; returning to step 1",
                self.step.number()
            );
            self.step = Step::ConnectWallet;
        }

        while let Some(next) = self.next_step() {
            info!("Wizard step {} → {}", self.step.number(), next.number());
            self.step = next;
            self.on_enter(next, effects);
        }
    }

    fn on_enter(&mut self, step: Step, effects: &mut Vec<Effect>) {
        match step {
            Step::FundWallet if !self.watching_funds => {
                if let Some(wallet) = &self.bot_wallet {
                    effects.push(Effect::WatchFunding(wallet.address()));
                    self.watching_funds = true;
                }
            }
            Step::Released if self.watching_funds => {
                effects.push(Effect::StopFunding);
                self.watching_funds = false;
            }
            _ => {}
        }
    }
}
