//! A scripted chain client for testing

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use crate::client::{BlockHeader, ChainClient, ClientError, HeadSubscription, SubscriptionError};

/// The gas price a new mock reports, 1 gwei
pub const MOCK_GAS_PRICE: u128 = 1_000_000_000;
/// How often the wait helpers poll the mock's state
const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ---------
// | State |
// ---------

/// A sender feeding the currently open head subscription
type HeadSender = UnboundedSender<Result<BlockHeader, SubscriptionError>>;

/// The mutable state behind a mock client
struct MockState {
    /// The chain id, or the error reading it returns
    chain_id: Result<u64, String>,
    /// The code at every address
    code: Bytes,
    /// An error returned by code probes
    code_error: Option<String>,
    /// The return data of every call
    call_result: Bytes,
    /// An error returned by calls
    call_error: Option<String>,
    /// The calldata of the most recent call
    last_call: Option<Bytes>,
    /// The suggested gas price
    gas_price: u128,
    /// An error returned by gas price requests
    gas_price_error: Option<String>,
    /// A delay applied to every gas price request
    gas_price_delay: Option<Duration>,
    /// Whether gas price requests panic
    gas_price_panics: bool,
    /// The number of upcoming subscribe attempts that fail
    failing_subscriptions: usize,
    /// The number of subscribe attempts made
    subscribe_attempts: usize,
    /// The number of subscriptions successfully opened
    subscriptions: usize,
    /// The sender feeding the latest opened subscription
    head_tx: Option<HeadSender>,
}

// ---------------
// | Mock Client |
// ---------------

/// A chain client whose responses are scripted by the test
///
/// Clones share state, so a test can keep a handle after moving the client
/// into an oracle.
#[derive(Clone)]
pub struct MockChainClient {
    /// The shared state
    state: Arc<Mutex<MockState>>,
}

impl MockChainClient {
    /// Create a mock for a non-rollup chain reporting `MOCK_GAS_PRICE`
    pub fn new(chain_id: u64) -> Self {
        let state = MockState {
            chain_id: Ok(chain_id),
            code: Bytes::new(),
            code_error: None,
            call_result: Bytes::new(),
            call_error: None,
            last_call: None,
            gas_price: MOCK_GAS_PRICE,
            gas_price_error: None,
            gas_price_delay: None,
            gas_price_panics: false,
            failing_subscriptions: 0,
            subscribe_attempts: 0,
            subscriptions: 0,
            head_tx: None,
        };

        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Lock the shared state
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -------------
    // | Scripting |
    // -------------

    /// Make chain id reads fail
    pub fn fail_chain_id(&self, err: &str) {
        self.state().chain_id = Err(err.to_string());
    }

    /// Set the code returned for every address
    pub fn set_code(&self, code: Bytes) {
        self.state().code = code;
    }

    /// Make code probes fail
    pub fn fail_code_probe(&self, err: &str) {
        self.state().code_error = Some(err.to_string());
    }

    /// Set the return data of every call
    pub fn set_call_result(&self, ret: Bytes) {
        let mut state = self.state();
        state.call_result = ret;
        state.call_error = None;
    }

    /// Make calls fail
    pub fn fail_call(&self, err: &str) {
        self.state().call_error = Some(err.to_string());
    }

    /// The calldata of the most recent call
    pub fn last_call(&self) -> Option<Bytes> {
        self.state().last_call.clone()
    }

    /// Set the suggested gas price and clear any gas price error
    pub fn set_gas_price(&self, gas_price: u128) {
        let mut state = self.state();
        state.gas_price = gas_price;
        state.gas_price_error = None;
    }

    /// Make gas price requests fail
    pub fn fail_gas_price(&self, err: &str) {
        self.state().gas_price_error = Some(err.to_string());
    }

    /// Delay every gas price request
    pub fn set_gas_price_delay(&self, delay: Duration) {
        self.state().gas_price_delay = Some(delay);
    }

    /// Make gas price requests panic
    pub fn panic_on_gas_price(&self) {
        self.state().gas_price_panics = true;
    }

    /// Make the next `n` subscribe attempts fail
    pub fn fail_next_subscriptions(&self, n: usize) {
        self.state().failing_subscriptions = n;
    }

    // ------------------
    // | Head Scripting |
    // ------------------

    /// Deliver a header to the open subscription
    ///
    /// Returns whether a live subscription received it.
    pub fn push_header(&self, number: u64) -> bool {
        let header = BlockHeader { number, hash: B256::with_last_byte(number as u8), timestamp: number };
        self.push(Ok(header))
    }

    /// Deliver a subscription-level error to the open subscription
    pub fn push_error(&self, err: SubscriptionError) -> bool {
        self.push(Err(err))
    }

    /// Close the notification channel of the open subscription
    pub fn close_subscription(&self) {
        self.state().head_tx = None;
    }

    /// Send an item to the open subscription
    fn push(&self, item: Result<BlockHeader, SubscriptionError>) -> bool {
        match &self.state().head_tx {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    // -----------
    // | Getters |
    // -----------

    /// The number of subscribe attempts made
    pub fn subscribe_attempts(&self) -> usize {
        self.state().subscribe_attempts
    }

    /// The number of subscriptions successfully opened
    pub fn subscription_count(&self) -> usize {
        self.state().subscriptions
    }

    /// Wait until at least `n` subscriptions have been opened
    ///
    /// Returns false if the timeout elapses first.
    pub async fn wait_for_subscriptions(&self, n: usize, timeout: Duration) -> bool {
        let poll = async {
            while self.subscription_count() < n {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.is_ok()
    }
}

// ---------------------------
// | Chain Client Trait Impl |
// ---------------------------

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> Result<u64, ClientError> {
        self.state().chain_id.clone().map_err(ClientError::Rpc)
    }

    async fn code_at(&self, _address: Address) -> Result<Bytes, ClientError> {
        let state = self.state();
        match &state.code_error {
            Some(e) => Err(ClientError::Rpc(e.clone())),
            None => Ok(state.code.clone()),
        }
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        let mut state = self.state();
        state.last_call = Some(data);
        match &state.call_error {
            Some(e) => Err(ClientError::Rpc(e.clone())),
            None => Ok(state.call_result.clone()),
        }
    }

    async fn suggest_gas_price(&self) -> Result<u128, ClientError> {
        let delay = self.state().gas_price_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        if state.gas_price_panics {
            drop(state);
            panic!("mock gas price request panicked");
        }

        match &state.gas_price_error {
            Some(e) => Err(ClientError::Rpc(e.clone())),
            None => Ok(state.gas_price),
        }
    }

    async fn subscribe_new_heads(&self) -> Result<HeadSubscription, ClientError> {
        let mut state = self.state();
        state.subscribe_attempts += 1;
        if state.failing_subscriptions > 0 {
            state.failing_subscriptions -= 1;
            return Err(ClientError::Subscription("mock subscription refused".to_string()));
        }

        let (tx, rx) = unbounded_channel();
        state.head_tx = Some(tx);
        state.subscriptions += 1;

        let heads = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });
        Ok(Box::pin(heads))
    }
}
