use crate::error::ProviderError;
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    Log,
    U256,
};
use std::future::Future;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletNotification {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// A live feed of wallet notifications. Dropping or cancelling it stops the
/// task that feeds it.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<WalletNotification>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<WalletNotification>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { receiver, task }
    }

    pub async fn next(&mut self) -> Option<WalletNotification> {
        self.receiver.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub logs: Vec<Log>,
}

/// The wallet boundary: account access, network selection, notifications and
/// transaction submission.
pub trait WalletProvider {
    /// Accounts already authorized for this client. Never prompts.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, ProviderError>>;

    fn request_accounts(
        &self,
    ) -> impl Future<Output = Result<Vec<Address>, ProviderError>>;

    fn chain_id(&self) -> impl Future<Output = Result<u64, ProviderError>>;

    fn switch_chain(
        &self,
        chain_id: u64,
    ) -> impl Future<Output = Result<(), ProviderError>>;

    fn subscribe(&self) -> Subscription;

    fn send_transaction(
        &self,
        from: Address,
        tx: TxRequest,
    ) -> impl Future<Output = Result<B256, ProviderError>>;

    /// Resolves once the transaction is mined.
    fn wait_for_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<TxReceipt, ProviderError>>;
}
