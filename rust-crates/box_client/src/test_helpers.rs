use crate::{
    chain::ContractReader,
    error::ProviderError,
    inventory::BoxRecord,
    provider::{
        Subscription,
        TxReceipt,
        TxRequest,
        WalletNotification,
        WalletProvider,
    },
};
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U256,
};
use alloy_sol_types::SolCall;
use box_abi::{
    MysteryBoxNFT,
    test_helpers::{
        box_minted_log,
        box_opened_log,
    },
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::{
    mpsc,
    watch,
};

pub const MINTED_AT_BASE: u64 = 1_700_000_000;
pub const OPENED_AT_BASE: u64 = 1_700_500_000;

fn revert(reason: &str) -> ProviderError {
    ProviderError::Rpc {
        code: Some(3),
        message: format!("execution reverted: {reason}"),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub balance_of: usize,
    pub total_supply: usize,
    pub owner_of: usize,
    pub get_box: usize,
    pub box_price: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.balance_of + self.total_supply + self.owner_of + self.get_box + self.box_price
    }
}

#[derive(Debug)]
struct Token {
    owner: Address,
    record: BoxRecord,
}

#[derive(Debug)]
struct ChainState {
    price: U256,
    max_supply: u64,
    paused: bool,
    code: Bytes,
    tokens: Vec<Token>,
    failing_owner_of: HashSet<u64>,
    failing_get_box: HashSet<u64>,
    fail_balance_of: bool,
    calls: CallCounts,
}

/// In-memory box contract. Token ids start at 1 and are assigned in mint
/// order.
#[derive(Clone, Debug)]
pub struct FakeChain {
    address: Address,
    state: Arc<Mutex<ChainState>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChain {
    pub const DEFAULT_PRICE: U256 = U256::from_limbs([100_000_000_000_000, 0, 0, 0]);

    pub fn new() -> Self {
        Self {
            address: Address::repeat_byte(0xc0),
            state: Arc::new(Mutex::new(ChainState {
                price: Self::DEFAULT_PRICE,
                max_supply: 0,
                paused: false,
                code: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
                tokens: Vec::new(),
                failing_owner_of: HashSet::new(),
                failing_get_box: HashSet::new(),
                fail_balance_of: false,
                calls: CallCounts::default(),
            })),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn mint(&self, owner: Address) -> u64 {
        let mut state = self.state.lock().unwrap();
        let token_id = state.tokens.len() as u64 + 1;
        state.tokens.push(Token {
            owner,
            record: BoxRecord {
                minted_at: MINTED_AT_BASE + token_id,
                ..BoxRecord::default()
            },
        });
        token_id
    }

    pub fn open(&self, token_id: u64, rarity: u8, variant_id: u32) {
        let mut state = self.state.lock().unwrap();
        let token = &mut state.tokens[(token_id - 1) as usize];
        token.record.is_opened = true;
        token.record.rarity = rarity;
        token.record.variant_id = variant_id;
        token.record.opened_at = OPENED_AT_BASE + token_id;
    }

    /// Overwrite the stored record, e.g. to simulate an inconsistent node.
    pub fn set_record(&self, token_id: u64, record: BoxRecord) {
        self.state.lock().unwrap().tokens[(token_id - 1) as usize].record = record;
    }

    pub fn transfer(&self, token_id: u64, to: Address) {
        self.state.lock().unwrap().tokens[(token_id - 1) as usize].owner = to;
    }

    pub fn owner(&self, token_id: u64) -> Option<Address> {
        let state = self.state.lock().unwrap();
        state
            .tokens
            .get((token_id as usize).wrapping_sub(1))
            .map(|t| t.owner)
    }

    pub fn record(&self, token_id: u64) -> Option<BoxRecord> {
        let state = self.state.lock().unwrap();
        state
            .tokens
            .get((token_id as usize).wrapping_sub(1))
            .map(|t| t.record)
    }

    pub fn price(&self) -> U256 {
        self.state.lock().unwrap().price
    }

    pub fn set_price(&self, price: U256) {
        self.state.lock().unwrap().price = price;
    }

    pub fn set_max_supply(&self, max_supply: u64) {
        self.state.lock().unwrap().max_supply = max_supply;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().unwrap().paused = paused;
    }

    pub fn set_code(&self, code: Bytes) {
        self.state.lock().unwrap().code = code;
    }

    pub fn fail_owner_of(&self, token_id: u64) {
        self.state.lock().unwrap().failing_owner_of.insert(token_id);
    }

    pub fn fail_get_box(&self, token_id: u64) {
        self.state.lock().unwrap().failing_get_box.insert(token_id);
    }

    pub fn fail_balance_of(&self, fail: bool) {
        self.state.lock().unwrap().fail_balance_of = fail;
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls = CallCounts::default();
    }
}

impl ContractReader for FakeChain {
    fn address(&self) -> Address {
        self.address
    }

    async fn name(&self) -> Result<String, ProviderError> {
        Ok("Mystery Box NFT".to_string())
    }

    async fn symbol(&self) -> Result<String, ProviderError> {
        Ok("MBX".to_string())
    }

    async fn box_price(&self) -> Result<U256, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.box_price += 1;
        Ok(state.price)
    }

    async fn max_supply(&self) -> Result<U256, ProviderError> {
        Ok(U256::from(self.state.lock().unwrap().max_supply))
    }

    async fn mint_paused(&self) -> Result<bool, ProviderError> {
        Ok(self.state.lock().unwrap().paused)
    }

    async fn total_supply(&self) -> Result<U256, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.total_supply += 1;
        Ok(U256::from(state.tokens.len()))
    }

    async fn balance_of(&self, owner: Address) -> Result<U256, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.balance_of += 1;
        if state.fail_balance_of {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }
        let balance = state.tokens.iter().filter(|t| t.owner == owner).count();
        Ok(U256::from(balance))
    }

    async fn owner_of(&self, token_id: u64) -> Result<Address, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.owner_of += 1;
        if state.failing_owner_of.contains(&token_id) {
            return Err(ProviderError::Transport("request timed out".to_string()));
        }
        state
            .tokens
            .get((token_id as usize).wrapping_sub(1))
            .map(|t| t.owner)
            .ok_or_else(|| revert("ERC721NonexistentToken"))
    }

    async fn get_box(&self, token_id: u64) -> Result<BoxRecord, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.get_box += 1;
        if state.failing_get_box.contains(&token_id) {
            return Err(ProviderError::Transport("request timed out".to_string()));
        }
        state
            .tokens
            .get((token_id as usize).wrapping_sub(1))
            .map(|t| t.record)
            .ok_or_else(|| revert("Box does not exist"))
    }

    async fn code(&self) -> Result<Bytes, ProviderError> {
        Ok(self.state.lock().unwrap().code.clone())
    }
}

#[derive(Debug)]
struct WalletState {
    accounts: Vec<Address>,
    authorized: bool,
    chain_id: u64,
    known_chains: HashSet<u64>,
    reject_connect: bool,
    switch_error: Option<ProviderError>,
    reject_signatures: bool,
    send_error: Option<ProviderError>,
    suppress_events: bool,
    revert_all: bool,
    next_reveal: (u8, u32),
    tx_counter: u8,
    sent: Vec<TxRequest>,
    switch_requests: Vec<u64>,
    receipts: HashMap<B256, TxReceipt>,
    subscribers: Vec<mpsc::UnboundedSender<WalletNotification>>,
}

/// Scripted wallet. When attached to a [`FakeChain`] it executes `mintBox` and
/// `openBox` against it and produces receipts with the matching event logs.
#[derive(Clone, Debug)]
pub struct FakeWallet {
    chain: Option<FakeChain>,
    state: Arc<Mutex<WalletState>>,
    receipt_gate: watch::Sender<bool>,
    switch_gate: watch::Sender<bool>,
}

impl FakeWallet {
    pub fn new(chain_id: u64) -> Self {
        let (receipt_gate, _) = watch::channel(true);
        let (switch_gate, _) = watch::channel(true);
        Self {
            chain: None,
            state: Arc::new(Mutex::new(WalletState {
                accounts: Vec::new(),
                authorized: false,
                chain_id,
                known_chains: HashSet::from([chain_id]),
                reject_connect: false,
                switch_error: None,
                reject_signatures: false,
                send_error: None,
                suppress_events: false,
                revert_all: false,
                next_reveal: (0, 1),
                tx_counter: 0,
                sent: Vec::new(),
                switch_requests: Vec::new(),
                receipts: HashMap::new(),
                subscribers: Vec::new(),
            })),
            receipt_gate,
            switch_gate,
        }
    }

    pub fn with_chain(mut self, chain: FakeChain) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn with_account(self, account: Address) -> Self {
        self.state.lock().unwrap().accounts.push(account);
        self
    }

    pub fn authorized(self) -> Self {
        self.state.lock().unwrap().authorized = true;
        self
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.state.lock().unwrap().accounts = accounts;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state.lock().unwrap().chain_id = chain_id;
    }

    pub fn add_known_chain(&self, chain_id: u64) {
        self.state.lock().unwrap().known_chains.insert(chain_id);
    }

    pub fn reject_connect(&self) {
        self.state.lock().unwrap().reject_connect = true;
    }

    pub fn reject_switch(&self) {
        self.fail_switch_with(ProviderError::UserRejected);
    }

    pub fn fail_switch_with(&self, err: ProviderError) {
        self.state.lock().unwrap().switch_error = Some(err);
    }

    pub fn reject_signatures(&self, reject: bool) {
        self.state.lock().unwrap().reject_signatures = reject;
    }

    pub fn fail_sends_with(&self, error: ProviderError) {
        self.state.lock().unwrap().send_error = Some(error);
    }

    pub fn suppress_events(&self, suppress: bool) {
        self.state.lock().unwrap().suppress_events = suppress;
    }

    /// Mined transactions come back with a failed status.
    pub fn revert_transactions(&self, revert: bool) {
        self.state.lock().unwrap().revert_all = revert;
    }

    pub fn set_next_reveal(&self, rarity: u8, variant_id: u32) {
        self.state.lock().unwrap().next_reveal = (rarity, variant_id);
    }

    /// Receipts stay unavailable until [`FakeWallet::release_receipts`].
    pub fn hold_receipts(&self) {
        self.receipt_gate.send_replace(false);
    }

    pub fn release_receipts(&self) {
        self.receipt_gate.send_replace(true);
    }

    /// Network switch requests stay unanswered until
    /// [`FakeWallet::release_switch`].
    pub fn hold_switch(&self) {
        self.switch_gate.send_replace(false);
    }

    pub fn release_switch(&self) {
        self.switch_gate.send_replace(true);
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn switch_requests(&self) -> Vec<u64> {
        self.state.lock().unwrap().switch_requests.clone()
    }

    pub fn notify(&self, notification: WalletNotification) {
        let mut state = self.state.lock().unwrap();
        state
            .subscribers
            .retain(|subscriber| subscriber.send(notification.clone()).is_ok());
    }

    fn execute(&self, from: Address, tx: &TxRequest) -> (bool, Vec<alloy_primitives::Log>) {
        let Some(chain) = self.chain.as_ref() else {
            return (true, Vec::new());
        };
        let (suppress, revert_all, (rarity, variant_id)) = {
            let state = self.state.lock().unwrap();
            (state.suppress_events, state.revert_all, state.next_reveal)
        };
        if revert_all {
            return (false, Vec::new());
        }
        if tx.to != chain.address() {
            return (true, Vec::new());
        }

        if tx.input.starts_with(&MysteryBoxNFT::mintBoxCall::SELECTOR) {
            if tx.value != chain.price() {
                return (false, Vec::new());
            }
            let token_id = chain.mint(from);
            let logs = if suppress {
                Vec::new()
            } else {
                vec![box_minted_log(chain.address(), token_id, from)]
            };
            return (true, logs);
        }

        if let Ok(call) = MysteryBoxNFT::openBoxCall::abi_decode(&tx.input) {
            let token_id: u64 = call.tokenId.saturating_to();
            let openable = chain.owner(token_id) == Some(from)
                && chain.record(token_id).is_some_and(|r| !r.is_opened);
            if !openable {
                return (false, Vec::new());
            }
            chain.open(token_id, rarity, variant_id);
            let logs = if suppress {
                Vec::new()
            } else {
                vec![box_opened_log(
                    chain.address(),
                    token_id,
                    from,
                    rarity,
                    variant_id,
                )]
            };
            return (true, logs);
        }

        (false, Vec::new())
    }
}

impl WalletProvider for FakeWallet {
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let state = self.state.lock().unwrap();
        if state.authorized {
            Ok(state.accounts.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_connect {
            return Err(ProviderError::UserRejected);
        }
        state.authorized = true;
        Ok(state.accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.state.lock().unwrap().switch_requests.push(chain_id);
        let mut gate = self.switch_gate.subscribe();
        gate.wait_for(|released| *released)
            .await
            .map_err(|_| ProviderError::Transport("wallet dropped".to_string()))?;
        {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.switch_error.clone() {
                return Err(err);
            }
            if !state.known_chains.contains(&chain_id) {
                return Err(ProviderError::UnrecognizedChain(Some(chain_id)));
            }
            state.chain_id = chain_id;
        }
        self.notify(WalletNotification::ChainChanged(chain_id));
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state.lock().unwrap().subscribers.push(sender);
        Subscription::new(receiver, None)
    }

    async fn send_transaction(
        &self,
        from: Address,
        tx: TxRequest,
    ) -> Result<B256, ProviderError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.reject_signatures {
                return Err(ProviderError::UserRejected);
            }
            if let Some(error) = state.send_error.clone() {
                return Err(error);
            }
            state.sent.push(tx.clone());
        }

        let (success, logs) = self.execute(from, &tx);
        let mut state = self.state.lock().unwrap();
        state.tx_counter += 1;
        let tx_hash = B256::with_last_byte(state.tx_counter);
        let block_number = u64::from(state.tx_counter);
        state.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                success,
                block_number: Some(block_number),
                logs,
            },
        );
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, ProviderError> {
        let mut gate = self.receipt_gate.subscribe();
        gate.wait_for(|released| *released)
            .await
            .map_err(|_| ProviderError::Transport("wallet dropped".to_string()))?;
        self.state
            .lock()
            .unwrap()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| ProviderError::Transport("unknown transaction".to_string()))
    }
}
