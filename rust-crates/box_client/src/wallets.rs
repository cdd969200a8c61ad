use crate::{
    error::ProviderError,
    provider::{
        Subscription,
        TxReceipt,
        TxRequest,
        WalletNotification,
        WalletProvider,
    },
};
use alloy_network::{
    EthereumWallet,
    ReceiptResponse,
    TransactionBuilder,
};
use alloy_primitives::{
    Address,
    B256,
    utils::format_ether,
};
use alloy_provider::{
    DynProvider,
    Provider,
    ProviderBuilder,
};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::DeploymentEnv;
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fs,
    io::{
        self,
        BufRead,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{
    debug,
    info,
    warn,
};
use url::Url;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeystoreDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl KeystoreDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_keystore_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".foundry").join("keystores"))
}

pub fn resolve_keystore_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_keystore_dir(),
    }
}

/// Every regular file in `dir` is treated as a keystore, named after its file
/// stem. A missing directory is an empty listing.
pub fn list_keystores(dir: &Path) -> Result<Vec<KeystoreDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut keystores = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read keystore directory")? {
        let entry = entry.wrap_err("Failed to read keystore entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid keystore filename {:?}", path))?
            .to_owned();
        if name.starts_with('.') {
            continue;
        }
        keystores.push(KeystoreDescriptor::new(name, path));
    }
    keystores.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(keystores)
}

pub fn find_keystore(dir: &Path, name: &str) -> Result<KeystoreDescriptor> {
    let keystores = list_keystores(dir)?;
    keystores
        .into_iter()
        .find(|k| k.name == name)
        .ok_or_else(|| {
            eyre!("Keystore '{name}' not found in {}", dir.to_string_lossy())
        })
}

pub fn unlock_keystore(descriptor: &KeystoreDescriptor) -> Result<PrivateKeySigner> {
    let prompt = format!("Enter password for keystore '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read keystore password")?;

    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for keystore '{}'", descriptor.name))?;

    PrivateKeySigner::from_slice(&secret).map_err(|_| {
        eyre!(
            "Keystore '{}' contained unsupported key material",
            descriptor.name
        )
    })
}

/// A chain the keystore wallet knows how to reach.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: Url,
}

impl Network {
    pub fn new(chain_id: u64, name: impl Into<String>, rpc_url: Url) -> Self {
        Self {
            chain_id,
            name: name.into(),
            rpc_url,
        }
    }

    /// The deployment environments at their default endpoints, with `selected`
    /// pointed at `rpc_url` instead.
    pub fn known(selected: DeploymentEnv, rpc_url: &Url) -> Vec<Network> {
        DeploymentEnv::ALL
            .iter()
            .filter_map(|env| {
                let url = if *env == selected {
                    rpc_url.clone()
                } else {
                    Url::parse(env.default_rpc_url()).ok()?
                };
                Some(Network::new(env.chain_id(), env.to_string(), url))
            })
            .collect()
    }
}

struct WalletState {
    network: Network,
    provider: DynProvider,
    authorized: bool,
}

/// A local keystore account behind the wallet boundary. Access requests,
/// network switches and signatures are confirmed on the terminal unless
/// `auto_approve` is set.
#[derive(Clone)]
pub struct KeystoreWallet {
    signer: PrivateKeySigner,
    networks: Arc<Vec<Network>>,
    state: Arc<Mutex<WalletState>>,
    auto_approve: bool,
    poll_interval: Duration,
}

impl KeystoreWallet {
    pub fn new(
        signer: PrivateKeySigner,
        networks: Vec<Network>,
        initial: Network,
        auto_approve: bool,
    ) -> Self {
        let provider = connect(&signer, &initial.rpc_url);
        Self {
            signer,
            networks: Arc::new(networks),
            state: Arc::new(Mutex::new(WalletState {
                network: initial,
                provider,
                authorized: false,
            })),
            auto_approve,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn network(&self) -> Network {
        self.state().network.clone()
    }

    /// The node connection of the currently selected network.
    pub fn provider(&self) -> DynProvider {
        self.state().provider.clone()
    }

    fn state(&self) -> MutexGuard<'_, WalletState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn confirm(&self, question: String) -> Result<(), ProviderError> {
        if self.auto_approve {
            debug!(%question, "auto-approved");
            return Ok(());
        }
        let approved = tokio::task::spawn_blocking(move || ask(&question))
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        if approved {
            Ok(())
        } else {
            Err(ProviderError::UserRejected)
        }
    }
}

fn connect(signer: &PrivateKeySigner, rpc_url: &Url) -> DynProvider {
    ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer.clone()))
        .connect_http(rpc_url.clone())
        .erased()
}

fn ask(question: &str) -> io::Result<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "{question} [y/N] ")?;
    stdout.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

impl WalletProvider for KeystoreWallet {
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        if self.state().authorized {
            Ok(vec![self.address()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        if !self.state().authorized {
            self.confirm(format!("Connect account {} to mystery-box?", self.address()))
                .await?;
            self.state().authorized = true;
            info!(account = %self.address(), "account authorized");
        }
        Ok(vec![self.address()])
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let provider = self.provider();
        Ok(provider.get_chain_id().await?)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        let network = self
            .networks
            .iter()
            .find(|network| network.chain_id == chain_id)
            .cloned()
            .ok_or(ProviderError::UnrecognizedChain(Some(chain_id)))?;
        self.confirm(format!(
            "Switch wallet to {} (chain {chain_id})?",
            network.name
        ))
        .await?;
        let provider = connect(&self.signer, &network.rpc_url);
        info!(chain_id, url = %network.rpc_url, "wallet network switched");
        let mut state = self.state();
        state.network = network;
        state.provider = provider;
        Ok(())
    }

    /// Polls the node for chain id changes. The key never changes, so account
    /// notifications are not produced.
    fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = self.state.clone();
        let interval = self.poll_interval;
        let task = tokio::spawn(async move {
            let mut last = None;
            loop {
                let provider = state
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .provider
                    .clone();
                match provider.get_chain_id().await {
                    Ok(chain_id) => {
                        if last.is_some_and(|last| last != chain_id)
                            && sender
                                .send(WalletNotification::ChainChanged(chain_id))
                                .is_err()
                        {
                            break;
                        }
                        last = Some(chain_id);
                    }
                    Err(err) => warn!(error = %err, "chain id poll failed"),
                }
                tokio::time::sleep(interval).await;
            }
        });
        Subscription::new(receiver, Some(task))
    }

    async fn send_transaction(
        &self,
        from: Address,
        tx: TxRequest,
    ) -> Result<B256, ProviderError> {
        if from != self.address() {
            return Err(ProviderError::Rpc {
                code: None,
                message: format!("account {from} is not managed by this wallet"),
            });
        }
        self.confirm(format!(
            "Sign transaction to {} sending {} ETH?",
            tx.to,
            format_ether(tx.value)
        ))
        .await?;
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(tx.to)
            .with_value(tx.value)
            .with_input(tx.input);
        let provider = self.provider();
        let pending = provider.send_transaction(request).await?;
        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, "transaction submitted");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, ProviderError> {
        let provider = self.provider();
        loop {
            if let Some(receipt) = provider.get_transaction_receipt(tx_hash).await? {
                return Ok(TxReceipt {
                    tx_hash: receipt.transaction_hash,
                    success: receipt.status(),
                    block_number: receipt.block_number,
                    logs: receipt
                        .inner
                        .logs()
                        .iter()
                        .map(|log| log.inner.clone())
                        .collect(),
                });
            }
            debug!(tx_hash = %tx_hash, "receipt not available yet");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
