use crate::{
    chain::{
        ChainReadClient,
        ContractReader,
    },
    error::{
        ClientError,
        classify_submission,
    },
    inventory::Rarity,
    provider::{
        TxReceipt,
        TxRequest,
        WalletProvider,
    },
    reconciler::{
        OwnershipReconciler,
        Reconciliation,
    },
    session::SessionContext,
};
use alloy_primitives::{
    B256,
    U256,
};
use alloy_sol_types::SolCall;
use box_abi::{
    BoxEvent,
    MysteryBoxNFT,
    decode_box_events,
};
use std::cell::RefCell;
use tracing::{
    error,
    info,
    warn,
};


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxKind {
    Mint,
    Open,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxPhase {
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransaction {
    pub kind: TxKind,
    pub target_token_id: Option<u64>,
    pub hash: Option<B256>,
    pub phase: TxPhase,
}

/// In-flight transactions, at most one per kind and target.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: RefCell<Vec<PendingTransaction>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(
        &self,
        kind: TxKind,
        target_token_id: Option<u64>,
    ) -> Result<PendingGuard<'_>, ClientError> {
        let mut entries = self.entries.borrow_mut();
        if entries
            .iter()
            .any(|e| e.kind == kind && e.target_token_id == target_token_id)
        {
            return Err(ClientError::AlreadyPending);
        }
        entries.push(PendingTransaction {
            kind,
            target_token_id,
            hash: None,
            phase: TxPhase::Submitting,
        });
        Ok(PendingGuard {
            registry: self,
            kind,
            target_token_id,
        })
    }

    pub fn is_pending(&self, kind: TxKind, target_token_id: Option<u64>) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|e| e.kind == kind && e.target_token_id == target_token_id)
    }

    pub fn get(
        &self,
        kind: TxKind,
        target_token_id: Option<u64>,
    ) -> Option<PendingTransaction> {
        self.entries
            .borrow()
            .iter()
            .find(|e| e.kind == kind && e.target_token_id == target_token_id)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<PendingTransaction> {
        self.entries.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// Removes its registry entry when dropped, whatever the outcome.
pub struct PendingGuard<'a> {
    registry: &'a PendingRegistry,
    kind: TxKind,
    target_token_id: Option<u64>,
}

impl PendingGuard<'_> {
    fn update(&self, phase: TxPhase, hash: Option<B256>) {
        let mut entries = self.registry.entries.borrow_mut();
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.kind == self.kind && e.target_token_id == self.target_token_id)
        {
            entry.phase = phase;
            if hash.is_some() {
                entry.hash = hash;
            }
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .entries
            .borrow_mut()
            .retain(|e| !(e.kind == self.kind && e.target_token_id == self.target_token_id));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintSettlement {
    pub tx_hash: B256,
    /// `None` when the receipt carried no decodable `BoxMinted` event.
    pub token_id: Option<u64>,
    pub refreshed: bool,
}

impl MintSettlement {
    pub fn soft_failure(&self) -> Option<ClientError> {
        match self.token_id {
            Some(_) => None,
            None => Some(ClientError::DecodeInconsistency {
                tx_hash: self.tx_hash,
                event: "BoxMinted",
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenedBox {
    pub rarity: Rarity,
    pub variant_id: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenSettlement {
    pub tx_hash: B256,
    pub token_id: u64,
    pub opened: Option<OpenedBox>,
    pub refreshed: bool,
}

impl OpenSettlement {
    pub fn soft_failure(&self) -> Option<ClientError> {
        match self.opened {
            Some(_) => None,
            None => Some(ClientError::DecodeInconsistency {
                tx_hash: self.tx_hash,
                event: "BoxOpened",
            }),
        }
    }
}

/// Drives mint and open through submit, confirmation, event extraction and
/// the follow-up reconciliation.
pub struct TransactionOrchestrator<R> {
    chain: ChainReadClient<R>,
    pending: PendingRegistry,
}

impl<R: ContractReader> TransactionOrchestrator<R> {
    pub fn new(chain: ChainReadClient<R>) -> Self {
        Self {
            chain,
            pending: PendingRegistry::new(),
        }
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    pub async fn mint<W: WalletProvider>(
        &self,
        wallet: &W,
        context: &SessionContext,
        reconciler: &OwnershipReconciler<R>,
    ) -> Result<MintSettlement, ClientError> {
        let guard = self.pending.begin(TxKind::Mint, None)?;
        let receipt = match self.submit_mint(wallet, context, &guard).await {
            Ok(receipt) => receipt,
            Err(err) => {
                guard.update(TxPhase::Failed, None);
                error!(error = %err, "mint failed");
                return Err(err);
            }
        };
        guard.update(TxPhase::Confirmed, None);

        let token_id = decode_box_events(&receipt.logs, self.chain.address())
            .into_iter()
            .find_map(|event| match event {
                BoxEvent::Minted { token_id, .. } => Some(token_id.saturating_to::<u64>()),
                BoxEvent::Opened { .. } => None,
            });
        match token_id {
            Some(token_id) => info!(tx_hash = %receipt.tx_hash, token_id, "box minted"),
            None => warn!(
                tx_hash = %receipt.tx_hash,
                "mint confirmed without a decodable BoxMinted event"
            ),
        }

        let refreshed = self.refresh(reconciler, context).await;
        Ok(MintSettlement {
            tx_hash: receipt.tx_hash,
            token_id,
            refreshed,
        })
    }

    async fn submit_mint<W: WalletProvider>(
        &self,
        wallet: &W,
        context: &SessionContext,
        guard: &PendingGuard<'_>,
    ) -> Result<TxReceipt, ClientError> {
        let price = self.chain.unit_price().await?;
        let tx = TxRequest {
            to: self.chain.address(),
            value: price,
            input: MysteryBoxNFT::mintBoxCall {}.abi_encode().into(),
        };
        info!(account = %context.account, %price, "submitting mint");
        self.submit(wallet, context, tx, guard).await
    }

    pub async fn open<W: WalletProvider>(
        &self,
        wallet: &W,
        context: &SessionContext,
        token_id: u64,
        reconciler: &OwnershipReconciler<R>,
    ) -> Result<OpenSettlement, ClientError> {
        let guard = self.pending.begin(TxKind::Open, Some(token_id))?;
        let receipt = match self.submit_open(wallet, context, token_id, &guard).await {
            Ok(receipt) => receipt,
            Err(err) => {
                guard.update(TxPhase::Failed, None);
                error!(error = %err, token_id, "open failed");
                return Err(err);
            }
        };
        guard.update(TxPhase::Confirmed, None);

        let opened = decode_box_events(&receipt.logs, self.chain.address())
            .into_iter()
            .find_map(|event| match event {
                BoxEvent::Opened {
                    token_id: opened_id,
                    rarity,
                    metadata_id,
                    ..
                } if opened_id == U256::from(token_id) => Some((rarity, metadata_id)),
                _ => None,
            });
        let opened = match opened {
            Some((rarity, variant_id)) => match Rarity::from_ordinal(rarity) {
                Some(rarity) => {
                    info!(tx_hash = %receipt.tx_hash, token_id, %rarity, variant_id, "box opened");
                    Some(OpenedBox { rarity, variant_id })
                }
                None => {
                    warn!(tx_hash = %receipt.tx_hash, token_id, rarity, "BoxOpened carried an unknown rarity");
                    None
                }
            },
            None => {
                warn!(
                    tx_hash = %receipt.tx_hash,
                    token_id,
                    "open confirmed without a decodable BoxOpened event"
                );
                None
            }
        };

        let refreshed = self.refresh(reconciler, context).await;
        Ok(OpenSettlement {
            tx_hash: receipt.tx_hash,
            token_id,
            opened,
            refreshed,
        })
    }

    async fn submit_open<W: WalletProvider>(
        &self,
        wallet: &W,
        context: &SessionContext,
        token_id: u64,
        guard: &PendingGuard<'_>,
    ) -> Result<TxReceipt, ClientError> {
        let owner = self.chain.owner_of(token_id).await?;
        if owner != context.account {
            return Err(ClientError::NotOpenable {
                token_id,
                reason: "not owned by the connected account".to_string(),
            });
        }
        let mystery_box = self.chain.box_record(token_id).await?;
        if mystery_box.is_opened() {
            return Err(ClientError::NotOpenable {
                token_id,
                reason: "already opened".to_string(),
            });
        }

        let tx = TxRequest {
            to: self.chain.address(),
            value: U256::ZERO,
            input: MysteryBoxNFT::openBoxCall {
                tokenId: U256::from(token_id),
            }
            .abi_encode()
            .into(),
        };
        info!(account = %context.account, token_id, "submitting open");
        self.submit(wallet, context, tx, guard).await
    }

    async fn submit<W: WalletProvider>(
        &self,
        wallet: &W,
        context: &SessionContext,
        tx: TxRequest,
        guard: &PendingGuard<'_>,
    ) -> Result<TxReceipt, ClientError> {
        let tx_hash = wallet
            .send_transaction(context.account, tx)
            .await
            .map_err(classify_submission)?;
        guard.update(TxPhase::AwaitingConfirmation, Some(tx_hash));
        info!(%tx_hash, "transaction submitted, awaiting confirmation");

        let receipt = wallet
            .wait_for_receipt(tx_hash)
            .await
            .map_err(classify_submission)?;
        if !receipt.success {
            return Err(ClientError::RemoteRejected("transaction reverted".to_string()));
        }
        Ok(receipt)
    }

    async fn refresh(
        &self,
        reconciler: &OwnershipReconciler<R>,
        context: &SessionContext,
    ) -> bool {
        match reconciler.reconcile(context.account).await {
            Ok(Reconciliation::Adopted { .. }) => true,
            Ok(Reconciliation::Discarded { generation }) => {
                warn!(
                    generation = generation.value(),
                    "inventory refresh after confirmation was superseded"
                );
                false
            }
            Err(err) => {
                warn!(error = %err, "inventory refresh after confirmation failed");
                false
            }
        }
    }
}
