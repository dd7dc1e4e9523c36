//! Release wizard flows, driven through the reducer directly and through a
//! live session wired to in-memory collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::abi::FeralSoul;
use crate::chain::{
    RegistryReader, RegistryWriter, TokenReader, TransferLog, TransferWatcher, TxStatus,
    WalletConnector, WalletStatus,
};
use crate::config::Config;
use crate::context::AppContext;
use crate::errors::{ReleaseError, Result};
use crate::keygen::{self, KdfParams};
use crate::prepare::PrepareClient;
use crate::session::{Session, SessionHandle};
use crate::units::parse_units;
use crate::wizard::{
    Effect, ExistenceCheck, Notice, Step, Submission, Wizard, WizardError, WizardEvent, WizardView,
};

const CHAIN_ID: u64 = 8453;

fn usdc(amount: &str) -> U256 {
    parse_units(amount, 6).unwrap()
}

fn owner() -> Address {
    Address::repeat_byte(0x11)
}

fn connected(chain_id: u64) -> WizardEvent {
    WizardEvent::WalletStatus(WalletStatus {
        account: Some(owner()),
        chain_id,
    })
}

fn new_wizard() -> Wizard {
    Wizard::new(CHAIN_ID, usdc("11"))
}

fn deadbeef_hash() -> B256 {
    keccak256([0xdeu8, 0xad, 0xbe, 0xef])
}

/// Walk a fresh wizard to the confirmation step; returns the bot wallet.
fn wizard_at_confirm() -> (Wizard, Address) {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();
    w.apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap();
    w.apply(WizardEvent::ExistenceResolved {
        memory_hash: deadbeef_hash(),
        exists: false,
    })
    .unwrap();
    let wallet = keygen::generate();
    let bot = wallet.address();
    w.apply(WizardEvent::WalletGenerated(wallet)).unwrap();
    w.apply(WizardEvent::BalanceObserved(usdc("11"))).unwrap();
    assert_eq!(w.step(), Step::ConfirmRelease);
    (w, bot)
}

fn submit_count(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::SubmitRegistration { .. }))
        .count()
}

// ─────────────────────────────────────────────────────────
// Reducer
// ─────────────────────────────────────────────────────────

#[test]
fn connect_on_required_chain_advances() {
    let mut w = new_wizard();
    assert_eq!(w.step(), Step::ConnectWallet);
    assert_eq!(w.notices(), vec![Notice::ConnectWallet]);

    w.apply(connected(CHAIN_ID)).unwrap();
    assert_eq!(w.step(), Step::SubmitIdentifier);
    assert_eq!(
        w.notices(),
        vec![Notice::WalletConnected, Notice::EnterIdentifier]
    );
}

#[test]
fn wrong_network_blocks_step_one() {
    let mut w = new_wizard();
    w.apply(connected(1)).unwrap();
    assert_eq!(w.step(), Step::ConnectWallet);
    assert_eq!(
        w.notices(),
        vec![Notice::WrongNetwork {
            expected: CHAIN_ID,
            actual: 1
        }]
    );
}

#[test]
fn identifier_rejected_before_connecting() {
    let mut w = new_wizard();
    let err = w
        .apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap_err();
    assert_eq!(
        err,
        WizardError::WrongStep {
            required: Step::SubmitIdentifier,
            actual: Step::ConnectWallet
        }
    );
    assert!(w.identifier().is_none());
}

#[test]
fn scenario_valid_identifier_reaches_wallet_generation() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();

    let effects = w
        .apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap();
    assert_eq!(effects, vec![Effect::CheckExists(deadbeef_hash())]);

    let id = w.identifier().unwrap();
    assert_eq!(id.content_id, "abc123");
    assert_eq!(id.hash_hex, "0xdeadbeef");
    assert_eq!(w.step(), Step::SubmitIdentifier);
    assert!(w.notices().contains(&Notice::CheckingIdentifier));

    w.apply(WizardEvent::ExistenceResolved {
        memory_hash: deadbeef_hash(),
        exists: false,
    })
    .unwrap();
    assert_eq!(w.step(), Step::GenerateWallet);
}

#[test]
fn scenario_malformed_identifier_stays_on_step_two() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();

    let effects = w
        .apply(WizardEvent::IdentifierInput("onlyonepart".into()))
        .unwrap();
    assert!(effects.is_empty());
    assert_eq!(w.step(), Step::SubmitIdentifier);
    assert!(w.identifier().is_none());

    let view = w.view();
    assert_eq!(view.identifier_input, "onlyonepart");
    assert!(matches!(
        view.notices.last(),
        Some(Notice::InvalidIdentifier { .. })
    ));
}

#[test]
fn registered_identifier_blocks_progress() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();
    w.apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap();
    w.apply(WizardEvent::ExistenceResolved {
        memory_hash: deadbeef_hash(),
        exists: true,
    })
    .unwrap();

    assert_eq!(w.step(), Step::SubmitIdentifier);
    assert_eq!(w.view().existence, Some(ExistenceCheck::Registered));
    assert!(w.notices().contains(&Notice::AlreadyRegistered));
}

#[test]
fn stale_existence_result_is_ignored() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();
    w.apply(WizardEvent::IdentifierInput("abc::0x01".into()))
        .unwrap();
    let effects = w
        .apply(WizardEvent::IdentifierInput("abc::0x02".into()))
        .unwrap();
    let current = keccak256([0x02u8]);
    assert_eq!(effects, vec![Effect::CheckExists(current)]);

    // The answer for the first edit arrives late.
    w.apply(WizardEvent::ExistenceResolved {
        memory_hash: keccak256([0x01u8]),
        exists: false,
    })
    .unwrap();
    assert_eq!(w.step(), Step::SubmitIdentifier);
    assert_eq!(w.view().existence, Some(ExistenceCheck::Pending));

    w.apply(WizardEvent::ExistenceResolved {
        memory_hash: current,
        exists: false,
    })
    .unwrap();
    assert_eq!(w.step(), Step::GenerateWallet);
}

#[test]
fn failed_existence_check_retries_on_resubmit() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();
    w.apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap();
    w.apply(WizardEvent::ExistenceFailed {
        memory_hash: deadbeef_hash(),
        reason: "rpc timeout".into(),
    })
    .unwrap();
    assert_eq!(w.step(), Step::SubmitIdentifier);
    assert!(matches!(
        w.view().existence,
        Some(ExistenceCheck::Failed { .. })
    ));

    let effects = w
        .apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap();
    assert_eq!(effects, vec![Effect::CheckExists(deadbeef_hash())]);
}

#[test]
fn unchanged_identifier_is_not_rechecked() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();
    w.apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap();
    let effects = w
        .apply(WizardEvent::IdentifierInput(" abc123 :: 0xdeadbeef ".into()))
        .unwrap();
    assert!(effects.is_empty());
}

#[test]
fn wallet_generation_starts_funding_watch() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();
    w.apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap();
    w.apply(WizardEvent::ExistenceResolved {
        memory_hash: deadbeef_hash(),
        exists: false,
    })
    .unwrap();

    let wallet = keygen::generate();
    let bot = wallet.address();
    let effects = w.apply(WizardEvent::WalletGenerated(wallet)).unwrap();
    assert_eq!(
        effects,
        vec![Effect::PrepareWallet(bot), Effect::WatchFunding(bot)]
    );
    assert_eq!(w.step(), Step::FundWallet);

    let err = w
        .apply(WizardEvent::WalletGenerated(keygen::generate()))
        .unwrap_err();
    assert_eq!(err, WizardError::WalletAlreadyGenerated);
    assert_eq!(w.view().bot_wallet, Some(bot));
}

#[test]
fn wallet_generation_requires_step_three() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();
    let err = w
        .apply(WizardEvent::WalletGenerated(keygen::generate()))
        .unwrap_err();
    assert!(matches!(err, WizardError::WrongStep { .. }));
    assert!(w.bot_wallet().is_none());
}

#[test]
fn funding_below_target_waits() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();
    w.apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap();
    w.apply(WizardEvent::ExistenceResolved {
        memory_hash: deadbeef_hash(),
        exists: false,
    })
    .unwrap();
    w.apply(WizardEvent::WalletGenerated(keygen::generate()))
        .unwrap();

    for balance in ["0", "5", "10.99"] {
        w.apply(WizardEvent::BalanceObserved(usdc(balance))).unwrap();
        assert_eq!(w.step(), Step::FundWallet);
    }
    w.apply(WizardEvent::BalanceObserved(usdc("11"))).unwrap();
    assert_eq!(w.step(), Step::ConfirmRelease);
    assert!(w.notices().contains(&Notice::FundsConfirmed));
}

#[test]
fn scenario_wrong_case_confirmation_keeps_submit_disabled() {
    let (mut w, _) = wizard_at_confirm();
    w.apply(WizardEvent::ConfirmationInput("confirm".into()))
        .unwrap();

    let view = w.view();
    assert!(!view.confirmation_matches);
    assert!(!view.can_submit);
    assert_eq!(
        w.apply(WizardEvent::SubmitRequested).unwrap_err(),
        WizardError::ConfirmationMismatch
    );
    assert_eq!(*w.submission(), Submission::Idle);
}

#[test]
fn double_submit_sends_exactly_one_registration() {
    let (mut w, bot) = wizard_at_confirm();
    w.apply(WizardEvent::ConfirmationInput("CONFIRM".into()))
        .unwrap();
    assert!(w.can_submit());

    let effects = w.apply(WizardEvent::SubmitRequested).unwrap();
    assert_eq!(submit_count(&effects), 1);
    match &effects[0] {
        Effect::SubmitRegistration { from, intent } => {
            assert_eq!(*from, owner());
            assert_eq!(intent.memory_hash, deadbeef_hash());
            assert_eq!(intent.bot_wallet, bot);
            assert_eq!(intent.arweave_id, "abc123");
            assert_eq!(intent.initial_funds, usdc("11"));
        }
        other => panic!("unexpected effect {other:?}"),
    }

    assert_eq!(
        w.apply(WizardEvent::SubmitRequested).unwrap_err(),
        WizardError::SubmissionInFlight
    );
    assert!(!w.can_submit());

    let tx = B256::repeat_byte(0x77);
    let effects = w.apply(WizardEvent::SubmissionSent(tx)).unwrap();
    assert_eq!(effects, vec![Effect::AwaitReceipt(tx)]);
    assert_eq!(
        w.apply(WizardEvent::SubmitRequested).unwrap_err(),
        WizardError::SubmissionInFlight
    );
    assert_eq!(
        w.apply(WizardEvent::ConfirmationInput("CONFIRM".into()))
            .unwrap_err(),
        WizardError::SubmissionInFlight
    );
}

#[test]
fn confirmed_transaction_releases_and_stops_funding() {
    let (mut w, _) = wizard_at_confirm();
    w.apply(WizardEvent::ConfirmationInput("CONFIRM".into()))
        .unwrap();
    w.apply(WizardEvent::SubmitRequested).unwrap();
    let tx = B256::repeat_byte(0x77);
    w.apply(WizardEvent::SubmissionSent(tx)).unwrap();

    // A confirmation for some other hash changes nothing.
    w.apply(WizardEvent::TransactionConfirmed(B256::repeat_byte(0x01)))
        .unwrap();
    assert_eq!(w.step(), Step::ConfirmRelease);

    let effects = w.apply(WizardEvent::TransactionConfirmed(tx)).unwrap();
    assert_eq!(effects, vec![Effect::StopFunding]);
    assert_eq!(w.step(), Step::Released);
    assert_eq!(w.notices(), vec![Notice::Released]);
    assert_eq!(w.submission().tx_hash(), Some(tx));

    // Terminal: no further submission and no reset on disconnect.
    assert_eq!(
        w.apply(WizardEvent::SubmitRequested).unwrap_err(),
        WizardError::AlreadyReleased
    );
    w.apply(WizardEvent::WalletUnavailable("locked".into()))
        .unwrap();
    assert_eq!(w.step(), Step::Released);
}

#[test]
fn failed_submission_clears_phrase_and_allows_retry() {
    let (mut w, _) = wizard_at_confirm();
    w.apply(WizardEvent::ConfirmationInput("CONFIRM".into()))
        .unwrap();
    w.apply(WizardEvent::SubmitRequested).unwrap();
    w.apply(WizardEvent::SubmissionFailed("user rejected".into()))
        .unwrap();

    assert_eq!(w.step(), Step::ConfirmRelease);
    let view = w.view();
    assert!(!view.confirmation_matches);
    assert!(matches!(view.submission, Submission::Failed { .. }));
    assert!(view
        .notices
        .iter()
        .any(|n| matches!(n, Notice::SubmissionFailed { .. })));
    assert_eq!(
        w.apply(WizardEvent::SubmitRequested).unwrap_err(),
        WizardError::ConfirmationMismatch
    );

    w.apply(WizardEvent::ConfirmationInput("CONFIRM".into()))
        .unwrap();
    let effects = w.apply(WizardEvent::SubmitRequested).unwrap();
    assert_eq!(submit_count(&effects), 1);
}

#[test]
fn balance_drop_after_funding_blocks_submit() {
    let (mut w, _) = wizard_at_confirm();
    w.apply(WizardEvent::BalanceObserved(usdc("3"))).unwrap();
    assert_eq!(w.step(), Step::ConfirmRelease);

    w.apply(WizardEvent::ConfirmationInput("CONFIRM".into()))
        .unwrap();
    assert_eq!(
        w.apply(WizardEvent::SubmitRequested).unwrap_err(),
        WizardError::NotFunded
    );

    w.apply(WizardEvent::BalanceObserved(usdc("11"))).unwrap();
    assert!(w.can_submit());
}

#[test]
fn disconnect_resets_to_step_one_and_keeps_progress() {
    let (mut w, bot) = wizard_at_confirm();

    w.apply(WizardEvent::WalletUnavailable("locked".into()))
        .unwrap();
    assert_eq!(w.step(), Step::ConnectWallet);
    assert_eq!(w.identifier().map(|i| i.content_id.as_str()), Some("abc123"));
    assert_eq!(w.bot_wallet().map(|b| b.address()), Some(bot));
    assert!(w.funding().is_satisfied());
    assert!(matches!(
        w.notices().as_slice(),
        [Notice::WalletUnavailable { .. }]
    ));

    // Reconnecting walks back through every satisfied guard; the funding
    // watch is still running so it is not started twice.
    let effects = w.apply(connected(CHAIN_ID)).unwrap();
    assert!(effects.is_empty());
    assert_eq!(w.step(), Step::ConfirmRelease);
}

#[test]
fn switching_network_mid_flow_resets() {
    let mut w = new_wizard();
    w.apply(connected(CHAIN_ID)).unwrap();
    w.apply(WizardEvent::IdentifierInput("abc123::0xdeadbeef".into()))
        .unwrap();
    w.apply(connected(1)).unwrap();
    assert_eq!(w.step(), Step::ConnectWallet);

    // The in-flight check still lands once the user is back.
    w.apply(WizardEvent::ExistenceResolved {
        memory_hash: deadbeef_hash(),
        exists: false,
    })
    .unwrap();
    assert_eq!(w.step(), Step::ConnectWallet);
    w.apply(connected(CHAIN_ID)).unwrap();
    assert_eq!(w.step(), Step::GenerateWallet);
}

// ─────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────

/// In-memory chain whose collaborators can be switched to fail at runtime.
struct MockChain {
    submissions: AtomicUsize,
    tx_hash: B256,
    wallet_down: AtomicBool,
    exists_fails: AtomicBool,
    submit_fails: AtomicBool,
    balance_fails: AtomicBool,
    receipt: Mutex<TxStatus>,
}

impl MockChain {
    fn new() -> Self {
        MockChain {
            submissions: AtomicUsize::new(0),
            tx_hash: B256::repeat_byte(0x77),
            wallet_down: AtomicBool::new(false),
            exists_fails: AtomicBool::new(false),
            submit_fails: AtomicBool::new(false),
            balance_fails: AtomicBool::new(false),
            receipt: Mutex::new(TxStatus::Success),
        }
    }

    fn set_receipt(&self, status: TxStatus) {
        *self.receipt.lock().unwrap() = status;
    }
}

fn rpc_down() -> ReleaseError {
    ReleaseError::Rpc {
        code: -32603,
        message: "upstream unavailable".into(),
    }
}

#[async_trait]
impl WalletConnector for MockChain {
    async fn connect(&self) -> Result<Address> {
        if self.wallet_down.load(Ordering::SeqCst) {
            return Err(ReleaseError::NotConnected);
        }
        Ok(owner())
    }

    async fn status(&self) -> Result<WalletStatus> {
        if self.wallet_down.load(Ordering::SeqCst) {
            return Err(ReleaseError::NotConnected);
        }
        Ok(WalletStatus {
            account: Some(owner()),
            chain_id: CHAIN_ID,
        })
    }
}

#[async_trait]
impl RegistryReader for MockChain {
    async fn soul_exists(&self, _memory_hash: B256) -> Result<bool> {
        if self.exists_fails.load(Ordering::SeqCst) {
            return Err(rpc_down());
        }
        Ok(false)
    }

    async fn feral_status(&self, _memory_hash: B256) -> Result<Option<FeralSoul>> {
        Ok(None)
    }
}

#[async_trait]
impl RegistryWriter for MockChain {
    async fn submit_registration(
        &self,
        _from: Address,
        _intent: &crate::wizard::RegistrationIntent,
    ) -> Result<B256> {
        if self.submit_fails.load(Ordering::SeqCst) {
            return Err(ReleaseError::Rpc {
                code: 4001,
                message: "User rejected the request".into(),
            });
        }
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(self.tx_hash)
    }

    async fn transaction_status(&self, _tx_hash: B256) -> Result<TxStatus> {
        Ok(*self.receipt.lock().unwrap())
    }
}

#[async_trait]
impl TokenReader for MockChain {
    async fn balance_of(&self, _owner: Address) -> Result<U256> {
        if self.balance_fails.load(Ordering::SeqCst) {
            return Err(rpc_down());
        }
        Ok(usdc("11"))
    }
}

#[async_trait]
impl TransferWatcher for MockChain {
    async fn latest_block(&self) -> Result<u64> {
        Ok(0)
    }

    async fn transfers_to(&self, _to: Address, from_block: u64) -> Result<(Vec<TransferLog>, u64)> {
        Ok((vec![], from_block))
    }
}

fn spawn_session(chain: Arc<MockChain>, config: Config) -> (SessionHandle, CancellationToken) {
    let ctx = Arc::new(AppContext {
        config,
        wallet: chain.clone(),
        registry: chain.clone(),
        writer: chain.clone(),
        token: chain.clone(),
        transfers: chain,
        prepare: PrepareClient::new(Client::new(), None),
    });
    let shutdown = CancellationToken::new();
    let handle = Session::spawn(ctx, shutdown.clone());
    (handle, shutdown)
}

fn mock_session() -> (SessionHandle, Arc<MockChain>, CancellationToken) {
    let chain = Arc::new(MockChain::new());
    let (handle, shutdown) = spawn_session(chain.clone(), Config::for_tests());
    (handle, chain, shutdown)
}

async fn wait_for(handle: &SessionHandle, ready: impl Fn(&WizardView) -> bool) -> WizardView {
    for _ in 0..200 {
        let view = handle.snapshot().await.unwrap();
        if ready(&view) {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("wizard never reached the expected state");
}

/// Connect, pass the identifier check and generate the bot wallet.
async fn reach_funding(handle: &SessionHandle) -> Address {
    handle.connect().await.unwrap();
    wait_for(handle, |v| v.step == Step::SubmitIdentifier).await;
    handle
        .input_identifier("abc123::0xdeadbeef".into())
        .await
        .unwrap();
    wait_for(handle, |v| v.step == Step::GenerateWallet).await;
    handle.generate_wallet().await.unwrap().bot_wallet.unwrap()
}

async fn reach_confirmation(handle: &SessionHandle) {
    reach_funding(handle).await;
    wait_for(handle, |v| v.step == Step::ConfirmRelease).await;
    handle.set_confirmation("CONFIRM".into()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn session_runs_the_full_release() {
    let (handle, chain, shutdown) = mock_session();

    handle.connect().await.unwrap();
    wait_for(&handle, |v| v.step == Step::SubmitIdentifier).await;

    handle
        .input_identifier("abc123::0xdeadbeef".into())
        .await
        .unwrap();
    wait_for(&handle, |v| v.step == Step::GenerateWallet).await;

    assert!(matches!(
        handle
            .export_wallet(Some(Zeroizing::new("pw".to_string())), false)
            .await,
        Err(ReleaseError::NoBotWallet)
    ));

    let view = handle.generate_wallet().await.unwrap();
    let bot = view.bot_wallet.unwrap();
    let view = wait_for(&handle, |v| v.step == Step::ConfirmRelease).await;
    assert_eq!(view.funding.latest(), Some(usdc("11")));

    let file = handle
        .export_wallet(Some(Zeroizing::new("correct horse".to_string())), false)
        .await
        .unwrap();
    assert!(file.file_name.ends_with("-encrypted.json"));
    let keystore: keygen::Keystore = serde_json::from_value(file.contents).unwrap();
    let restored = keygen::decrypt_keystore(&keystore, "correct horse").unwrap();
    assert_eq!(restored.address(), bot);
    assert!(matches!(
        handle.export_wallet(None, true).await,
        Err(ReleaseError::PlaintextExportDisabled)
    ));

    handle.set_confirmation("CONFIRM".into()).await.unwrap();
    let (first, second) = tokio::join!(handle.release(), handle.release());
    assert_eq!(
        [first.is_ok(), second.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count(),
        1
    );

    let view = wait_for(&handle, |v| v.step == Step::Released).await;
    assert_eq!(
        view.submission,
        Submission::Confirmed {
            tx_hash: chain.tx_hash
        }
    );
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 1);

    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn unavailable_wallet_is_reported_until_it_recovers() {
    let chain = Arc::new(MockChain::new());
    chain.wallet_down.store(true, Ordering::SeqCst);
    let (handle, shutdown) = spawn_session(chain.clone(), Config::for_tests());

    handle.connect().await.unwrap();
    let view = wait_for(&handle, |v| {
        v.notices
            .iter()
            .any(|n| matches!(n, Notice::WalletUnavailable { .. }))
    })
    .await;
    assert_eq!(view.step, Step::ConnectWallet);
    assert!(view.wallet.is_none());

    chain.wallet_down.store(false, Ordering::SeqCst);
    handle.connect().await.unwrap();
    let view = wait_for(&handle, |v| v.step == Step::SubmitIdentifier).await;
    assert!(!view
        .notices
        .iter()
        .any(|n| matches!(n, Notice::WalletUnavailable { .. })));

    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn failed_existence_lookup_blocks_until_resubmitted() {
    let (handle, chain, shutdown) = mock_session();
    chain.exists_fails.store(true, Ordering::SeqCst);

    handle.connect().await.unwrap();
    wait_for(&handle, |v| v.step == Step::SubmitIdentifier).await;
    handle
        .input_identifier("abc123::0xdeadbeef".into())
        .await
        .unwrap();
    let view = wait_for(&handle, |v| {
        matches!(v.existence, Some(ExistenceCheck::Failed { .. }))
    })
    .await;
    assert_eq!(view.step, Step::SubmitIdentifier);
    assert!(view
        .notices
        .iter()
        .any(|n| matches!(n, Notice::ExistenceCheckFailed { .. })));

    chain.exists_fails.store(false, Ordering::SeqCst);
    handle
        .input_identifier("abc123::0xdeadbeef".into())
        .await
        .unwrap();
    let view = wait_for(&handle, |v| v.step == Step::GenerateWallet).await;
    assert_eq!(view.existence, Some(ExistenceCheck::Available));

    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_clears_phrase_and_retries() {
    let (handle, chain, shutdown) = mock_session();
    reach_confirmation(&handle).await;
    chain.submit_fails.store(true, Ordering::SeqCst);

    handle.release().await.unwrap();
    let view = wait_for(&handle, |v| {
        matches!(v.submission, Submission::Failed { .. })
    })
    .await;
    assert_eq!(view.step, Step::ConfirmRelease);
    assert!(!view.confirmation_matches);
    assert!(!view.can_submit);
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 0);

    chain.submit_fails.store(false, Ordering::SeqCst);
    handle.set_confirmation("CONFIRM".into()).await.unwrap();
    handle.release().await.unwrap();
    wait_for(&handle, |v| v.step == Step::Released).await;
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 1);

    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn reverted_transaction_fails_and_can_be_retried() {
    let (handle, chain, shutdown) = mock_session();
    reach_confirmation(&handle).await;
    chain.set_receipt(TxStatus::Reverted);

    handle.release().await.unwrap();
    let view = wait_for(&handle, |v| {
        matches!(v.submission, Submission::Failed { .. })
    })
    .await;
    assert_eq!(view.step, Step::ConfirmRelease);
    assert!(!view.confirmation_matches);

    chain.set_receipt(TxStatus::Success);
    handle.set_confirmation("CONFIRM".into()).await.unwrap();
    handle.release().await.unwrap();
    wait_for(&handle, |v| v.step == Step::Released).await;
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 2);

    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn missing_receipt_times_out() {
    let (handle, chain, shutdown) = mock_session();
    reach_confirmation(&handle).await;
    chain.set_receipt(TxStatus::Pending);

    handle.release().await.unwrap();
    wait_for(&handle, |v| matches!(v.submission, Submission::Sent { .. })).await;

    tokio::time::sleep(Duration::from_secs(301)).await;
    let view = wait_for(&handle, |v| {
        matches!(v.submission, Submission::Failed { .. })
    })
    .await;
    assert_eq!(view.step, Step::ConfirmRelease);
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 1);

    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn balance_errors_hold_funding_until_reads_recover() {
    let (handle, chain, shutdown) = mock_session();
    chain.balance_fails.store(true, Ordering::SeqCst);
    reach_funding(&handle).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    let view = handle.snapshot().await.unwrap();
    assert_eq!(view.step, Step::FundWallet);
    assert_eq!(view.funding.latest(), None);

    chain.balance_fails.store(false, Ordering::SeqCst);
    let view = wait_for(&handle, |v| v.step == Step::ConfirmRelease).await;
    assert_eq!(view.funding.latest(), Some(usdc("11")));

    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn encrypted_export_does_not_stall_the_session() {
    let chain = Arc::new(MockChain::new());
    let mut config = Config::for_tests();
    config.keystore_kdf = KdfParams::default();
    let (handle, shutdown) = spawn_session(chain, config);
    let bot = reach_funding(&handle).await;

    let exporting = tokio::spawn({
        let handle = handle.clone();
        async move {
            handle
                .export_wallet(Some(Zeroizing::new("correct horse".to_string())), false)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let view = tokio::time::timeout(Duration::from_millis(100), handle.snapshot())
        .await
        .expect("session stalled while exporting")
        .unwrap();
    assert_eq!(view.bot_wallet, Some(bot));

    let file = exporting.await.unwrap().unwrap();
    let keystore: keygen::Keystore = serde_json::from_value(file.contents).unwrap();
    assert_eq!(keystore.crypto.kdf_params, KdfParams::default());

    shutdown.cancel();
}

#[tokio::test]
async fn closed_session_reports_error() {
    let (handle, _chain, shutdown) = mock_session();
    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(matches!(
        handle.snapshot().await,
        Err(ReleaseError::SessionClosed)
    ));
}
