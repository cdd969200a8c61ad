use crate::{
    chain::{
        ChainReadClient,
        ContractReader,
    },
    error::ClientError,
    inventory::Inventory,
};
use alloy_primitives::Address;
use futures::stream::{
    self,
    StreamExt,
};
use std::cell::RefCell;
use tracing::{
    debug,
    info,
    warn,
};


/// Epoch token for reconciliation passes. Larger is newer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassTicket {
    pub generation: Generation,
    pub account: Address,
}

#[derive(Debug, Default)]
struct StoreState {
    account: Option<Address>,
    issued: Generation,
    /// Passes at or below this generation belong to a previous session.
    floor: Generation,
    adopted: Option<Generation>,
    inventory: Option<Inventory>,
}

/// The adopted inventory for the active account, guarded by generation
/// tickets so that only the newest completed pass wins.
#[derive(Debug, Default)]
pub struct InventoryStore {
    state: RefCell<StoreState>,
}

impl InventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self) -> Option<Address> {
        self.state.borrow().account
    }

    pub fn inventory(&self) -> Option<Inventory> {
        self.state.borrow().inventory.clone()
    }

    pub fn current_generation(&self) -> Generation {
        self.state.borrow().issued
    }

    pub fn adopted_generation(&self) -> Option<Generation> {
        self.state.borrow().adopted
    }

    /// Point the store at `account`. Switching accounts drops the adopted
    /// inventory and invalidates every outstanding pass.
    pub fn activate(&self, account: Address) {
        let mut state = self.state.borrow_mut();
        if state.account == Some(account) {
            return;
        }
        state.account = Some(account);
        Self::start_epoch(&mut state);
    }

    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.account = None;
        Self::start_epoch(&mut state);
    }

    fn start_epoch(state: &mut StoreState) {
        state.issued = state.issued.next();
        state.floor = state.issued;
        state.adopted = None;
        state.inventory = None;
    }

    pub fn begin_pass(&self, account: Address) -> PassTicket {
        let mut state = self.state.borrow_mut();
        state.issued = state.issued.next();
        PassTicket {
            generation: state.issued,
            account,
        }
    }

    /// Adopt a completed pass. Returns `false` when the pass is stale: a newer
    /// one was already adopted, or the session moved on since it started.
    pub fn adopt(&self, ticket: PassTicket, mut inventory: Inventory) -> bool {
        let mut state = self.state.borrow_mut();
        if state.account != Some(ticket.account) || inventory.account() != ticket.account
        {
            return false;
        }
        if ticket.generation <= state.floor {
            return false;
        }
        if state
            .adopted
            .is_some_and(|adopted| adopted >= ticket.generation)
        {
            return false;
        }

        if let Some(previous) = state.inventory.as_ref() {
            for earlier in previous.boxes().iter().filter(|b| b.is_opened()) {
                if let Some(fresh) = inventory.get_mut(earlier.token_id)
                    && !fresh.is_opened()
                {
                    warn!(
                        token_id = earlier.token_id,
                        "scan reported an opened box as unopened; keeping reveal"
                    );
                    fresh.reveal = earlier.reveal;
                }
            }
        }

        state.adopted = Some(ticket.generation);
        state.inventory = Some(inventory);
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedToken {
    pub token_id: u64,
    pub error: ClientError,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanReport {
    pub inventory: Inventory,
    pub skipped: Vec<SkippedToken>,
    pub total_supply: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    Adopted {
        generation: Generation,
        boxes: usize,
        skipped: Vec<SkippedToken>,
    },
    Discarded {
        generation: Generation,
    },
}

pub struct OwnershipReconciler<R> {
    chain: ChainReadClient<R>,
    store: InventoryStore,
}

impl<R: ContractReader> OwnershipReconciler<R> {
    pub fn new(chain: ChainReadClient<R>) -> Self {
        Self {
            chain,
            store: InventoryStore::new(),
        }
    }

    pub fn store(&self) -> &InventoryStore {
        &self.store
    }

    /// Rebuild the inventory of `account` from scratch. A single token that
    /// fails to load is skipped; failing to read the balance or the supply
    /// fails the whole scan.
    pub async fn scan(&self, account: Address) -> Result<ScanReport, ClientError> {
        let balance = self.chain.balance_of(account).await?;
        if balance == 0 {
            return Ok(ScanReport {
                inventory: Inventory::new(account),
                skipped: Vec::new(),
                total_supply: 0,
            });
        }

        let total_supply = self.chain.total_minted().await?;
        let chain = &self.chain;
        let (inventory, skipped) = stream::iter(1..=total_supply)
            .fold(
                (Inventory::new(account), Vec::new()),
                |(mut inventory, mut skipped), token_id| async move {
                    let owned = match chain.owner_of(token_id).await {
                        Ok(owner) => owner == account,
                        Err(error) => {
                            debug!(token_id, %error, "skipping token: owner lookup failed");
                            skipped.push(SkippedToken { token_id, error });
                            false
                        }
                    };
                    if owned {
                        match chain.box_record(token_id).await {
                            Ok(mystery_box) => inventory.push(mystery_box),
                            Err(error) => {
                                debug!(token_id, %error, "skipping token: box record unavailable");
                                skipped.push(SkippedToken { token_id, error });
                            }
                        }
                    }
                    (inventory, skipped)
                },
            )
            .await;

        if inventory.len() as u64 != balance {
            debug!(
                balance,
                found = inventory.len(),
                skipped = skipped.len(),
                "scan found a different number of boxes than the balance"
            );
        }

        Ok(ScanReport {
            inventory,
            skipped,
            total_supply,
        })
    }

    /// Scan `account` and adopt the result unless a newer pass won meanwhile.
    pub async fn reconcile(&self, account: Address) -> Result<Reconciliation, ClientError> {
        let ticket = self.store.begin_pass(account);
        let report = self.scan(account).await?;
        let boxes = report.inventory.len();
        if self.store.adopt(ticket, report.inventory) {
            info!(
                generation = ticket.generation.value(),
                %account,
                boxes,
                skipped = report.skipped.len(),
                "inventory reconciled"
            );
            Ok(Reconciliation::Adopted {
                generation: ticket.generation,
                boxes,
                skipped: report.skipped,
            })
        } else {
            warn!(
                generation = ticket.generation.value(),
                %account,
                "discarding stale reconciliation pass"
            );
            Ok(Reconciliation::Discarded {
                generation: ticket.generation,
            })
        }
    }
}
