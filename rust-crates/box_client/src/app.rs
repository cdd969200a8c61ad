use crate::{
    catalog::{
        self,
        CatalogView,
    },
    chain::{
        ChainReadClient,
        ContractInfo,
        ContractReader,
    },
    error::ClientError,
    inventory::Inventory,
    orchestrator::{
        MintSettlement,
        OpenSettlement,
        PendingRegistry,
        TransactionOrchestrator,
    },
    provider::{
        Subscription,
        WalletNotification,
        WalletProvider,
    },
    reconciler::{
        OwnershipReconciler,
        Reconciliation,
    },
    session::{
        Session,
        SessionContext,
        SessionEvent,
        WalletSession,
    },
};
use std::cell::RefCell;
use tracing::{
    error,
    info,
    warn,
};


const MAX_ERRORS: usize = 50;

/// Owns every component for the lifetime of a session and routes user and
/// wallet triggers between them.
pub struct AppController<W, R> {
    session: WalletSession<W>,
    chain: ChainReadClient<R>,
    reconciler: OwnershipReconciler<R>,
    orchestrator: TransactionOrchestrator<R>,
    contract_info: RefCell<Option<ContractInfo>>,
    status: RefCell<String>,
    errors: RefCell<Vec<String>>,
    last_error: RefCell<Option<String>>,
}

impl<W, R> AppController<W, R>
where
    W: WalletProvider,
    R: ContractReader + Clone,
{
    pub fn new(session: WalletSession<W>, chain: ChainReadClient<R>) -> Self {
        Self {
            session,
            reconciler: OwnershipReconciler::new(chain.clone()),
            orchestrator: TransactionOrchestrator::new(chain.clone()),
            chain,
            contract_info: RefCell::new(None),
            status: RefCell::new("Disconnected".to_string()),
            errors: RefCell::new(Vec::new()),
            last_error: RefCell::new(None),
        }
    }

    pub fn session(&self) -> Session {
        self.session.session()
    }

    pub fn wallet_session(&self) -> &WalletSession<W> {
        &self.session
    }

    pub fn chain(&self) -> &ChainReadClient<R> {
        &self.chain
    }

    pub fn inventory(&self) -> Option<Inventory> {
        self.reconciler.store().inventory()
    }

    pub fn pending(&self) -> &PendingRegistry {
        self.orchestrator.pending()
    }

    pub fn contract_info(&self) -> Option<ContractInfo> {
        self.contract_info.borrow().clone()
    }

    pub fn status(&self) -> String {
        self.status.borrow().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    fn set_status(&self, message: impl Into<String>) {
        let message = message.into();
        info!(status = %message);
        *self.status.borrow_mut() = message;
    }

    fn push_errors(&self, items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        *self.last_error.borrow_mut() = items.last().cloned();
        let mut errors = self.errors.borrow_mut();
        errors.extend(items);
        if errors.len() > MAX_ERRORS {
            let drain = errors.len() - MAX_ERRORS;
            errors.drain(0..drain);
        }
    }

    /// Called as each user action starts, so the catalog only shows errors
    /// raised by the latest action.
    fn clear_last_error(&self) {
        self.last_error.borrow_mut().take();
    }

    fn fail<T>(&self, err: ClientError) -> Result<T, ClientError> {
        self.push_errors(vec![err.to_string()]);
        Err(err)
    }

    /// Resume an authorized session if there is one, otherwise ask the wallet
    /// for access.
    pub async fn start(&self) -> Result<SessionContext, ClientError> {
        self.clear_last_error();
        match self.session.resume().await {
            Ok(Some(context)) => {
                self.on_connected(context).await;
                Ok(context)
            }
            Ok(None) => self.connect().await,
            Err(err) => self.fail(err),
        }
    }

    pub async fn connect(&self) -> Result<SessionContext, ClientError> {
        self.clear_last_error();
        self.set_status("Connecting wallet");
        match self.session.connect().await {
            Ok(context) => {
                self.on_connected(context).await;
                Ok(context)
            }
            Err(err) => {
                self.set_status("Wallet not connected");
                self.fail(err)
            }
        }
    }

    async fn on_connected(&self, context: SessionContext) {
        self.reconciler.store().activate(context.account);
        self.set_status(format!("Connected as {}", context.account));
        self.load_contract_info().await;
        self.reconcile(context).await;
    }

    pub fn disconnect(&self) {
        self.clear_last_error();
        self.session.disconnect();
        self.reconciler.store().clear();
        self.set_status("Disconnected");
    }

    pub fn subscribe(&self) -> Result<Subscription, ClientError> {
        self.session.subscribe()
    }

    pub async fn load_contract_info(&self) -> Option<ContractInfo> {
        match self.chain.contract_info().await {
            Ok(info) => {
                *self.contract_info.borrow_mut() = Some(info.clone());
                Some(info)
            }
            Err(err) => {
                warn!(error = %err, "failed to load contract info");
                self.push_errors(vec![format!("Failed to load contract info: {err}")]);
                None
            }
        }
    }

    async fn reconcile(&self, context: SessionContext) -> bool {
        match self.reconciler.reconcile(context.account).await {
            Ok(Reconciliation::Adopted { boxes, skipped, .. }) => {
                if !skipped.is_empty() {
                    warn!(skipped = skipped.len(), "some boxes could not be loaded");
                }
                self.set_status(format!("Loaded {boxes} boxes"));
                true
            }
            Ok(Reconciliation::Discarded { generation }) => {
                warn!(
                    generation = generation.value(),
                    "box refresh superseded by a session change"
                );
                false
            }
            Err(err) => {
                self.push_errors(vec![format!("Failed to load boxes: {err}")]);
                false
            }
        }
    }

    /// Manual reconciliation of the active account.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.clear_last_error();
        let (_, context) = match self.session.active() {
            Ok(active) => active,
            Err(err) => return self.fail(err),
        };
        self.load_contract_info().await;
        if self.reconcile(context).await {
            Ok(())
        } else {
            Err(ClientError::RemoteUnavailable("failed to load boxes".to_string()))
        }
    }

    pub async fn mint(&self) -> Result<MintSettlement, ClientError> {
        self.clear_last_error();
        let (wallet, context) = match self.session.active() {
            Ok(active) => active,
            Err(err) => return self.fail(err),
        };
        self.set_status("Minting box");
        match self.orchestrator.mint(wallet, &context, &self.reconciler).await {
            Ok(settlement) => {
                match settlement.token_id {
                    Some(token_id) => self.set_status(format!("Minted box #{token_id}")),
                    None => self.set_status("Mint confirmed"),
                }
                if let Some(soft) = settlement.soft_failure() {
                    self.push_errors(vec![soft.to_string()]);
                }
                self.load_contract_info().await;
                Ok(settlement)
            }
            Err(err) => {
                self.set_status("Mint failed");
                self.fail(err)
            }
        }
    }

    pub async fn open(&self, token_id: u64) -> Result<OpenSettlement, ClientError> {
        self.clear_last_error();
        let (wallet, context) = match self.session.active() {
            Ok(active) => active,
            Err(err) => return self.fail(err),
        };
        self.set_status(format!("Opening box #{token_id}"));
        match self
            .orchestrator
            .open(wallet, &context, token_id, &self.reconciler)
            .await
        {
            Ok(settlement) => {
                match settlement.opened {
                    Some(opened) => self.set_status(format!(
                        "Box #{token_id} revealed {} (variant {})",
                        opened.rarity, opened.variant_id
                    )),
                    None => self.set_status(format!("Box #{token_id} opened")),
                }
                if let Some(soft) = settlement.soft_failure() {
                    self.push_errors(vec![soft.to_string()]);
                }
                Ok(settlement)
            }
            Err(err) => {
                self.set_status(format!("Opening box #{token_id} failed"));
                self.fail(err)
            }
        }
    }

    /// Route a wallet notification through the session state machine and
    /// rebuild whatever it invalidated.
    pub async fn handle_notification(
        &self,
        notification: WalletNotification,
    ) -> SessionEvent {
        let event = self.session.handle_notification(notification);
        match &event {
            SessionEvent::Unchanged => {}
            SessionEvent::AccountSwitched(context) => {
                self.reconciler.store().activate(context.account);
                self.set_status(format!("Switched to {}", context.account));
                self.reconcile(*context).await;
            }
            SessionEvent::WrongNetwork { account } => {
                self.reconciler.store().clear();
                self.set_status(format!("{account} is on the wrong network"));
            }
            SessionEvent::Disconnected => {
                self.reconciler.store().clear();
                self.set_status("Wallet disconnected");
            }
            SessionEvent::ReloadRequired { chain_id } => {
                info!(chain_id, "reloading after chain change");
                self.reload().await;
            }
        }
        event
    }

    /// Drop every derived state and start over from a non-prompting resume.
    pub async fn reload(&self) {
        self.reconciler.store().clear();
        *self.contract_info.borrow_mut() = None;
        self.set_status("Reloading");
        match self.session.resume().await {
            Ok(Some(context)) => self.on_connected(context).await,
            Ok(None) => self.set_status("Disconnected"),
            Err(err) => {
                self.set_status("Wallet not connected");
                self.push_errors(vec![err.to_string()]);
            }
        }
    }

    pub fn catalog(&self) -> CatalogView {
        let info = self.contract_info();
        let inventory = self.inventory();
        let last_error = self.last_error.borrow();
        catalog::build(
            &self.session(),
            info.as_ref(),
            inventory.as_ref(),
            self.pending(),
            last_error.as_deref(),
        )
    }
}
