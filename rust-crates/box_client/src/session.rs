use crate::{
    error::{
        ClientError,
        ProviderError,
        classify_session,
    },
    provider::{
        Subscription,
        WalletNotification,
        WalletProvider,
    },
};
use alloy_primitives::Address;
use tokio::sync::watch;
use tracing::{
    info,
    warn,
};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    WrongNetwork,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub status: SessionStatus,
}

impl Session {
    pub fn disconnected() -> Self {
        Self {
            account: None,
            chain_id: None,
            status: SessionStatus::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    pub fn context(&self) -> Option<SessionContext> {
        match (self.status, self.account, self.chain_id) {
            (SessionStatus::Connected, Some(account), Some(chain_id)) => {
                Some(SessionContext { account, chain_id })
            }
            _ => None,
        }
    }
}

/// Read-only view of a connected session, handed to the other components for
/// the duration of one operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub account: Address,
    pub chain_id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Unchanged,
    AccountSwitched(SessionContext),
    /// The lead account changed while the wallet sits on the wrong network.
    WrongNetwork { account: Address },
    Disconnected,
    /// The chain changed underneath the session; every derived state must be
    /// rebuilt from a fresh `resume`.
    ReloadRequired { chain_id: u64 },
}

pub struct WalletSession<W> {
    provider: Option<W>,
    required_chain_id: u64,
    state: watch::Sender<Session>,
}

impl<W: WalletProvider> WalletSession<W> {
    pub fn new(provider: Option<W>, required_chain_id: u64) -> Self {
        let (state, _) = watch::channel(Session::disconnected());
        Self {
            provider,
            required_chain_id,
            state,
        }
    }

    pub fn required_chain_id(&self) -> u64 {
        self.required_chain_id
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Observe every transition, including intermediate ones.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn provider(&self) -> Result<&W, ClientError> {
        self.provider.as_ref().ok_or(ClientError::NoProviderDetected)
    }

    /// The provider together with the connected session, or `NotConnected`.
    pub fn active(&self) -> Result<(&W, SessionContext), ClientError> {
        let provider = self.provider()?;
        let context = self.session().context().ok_or(ClientError::NotConnected)?;
        Ok((provider, context))
    }

    fn publish(&self, session: Session) {
        self.state.send_replace(session);
    }

    pub async fn connect(&self) -> Result<SessionContext, ClientError> {
        let provider = self.provider()?;
        self.publish(Session {
            status: SessionStatus::Connecting,
            ..Session::disconnected()
        });

        let accounts = match provider.request_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                self.publish(Session::disconnected());
                warn!(?err, "wallet refused account access");
                return Err(classify_session(err));
            }
        };
        let Some(account) = accounts.first().copied() else {
            self.publish(Session::disconnected());
            return Err(ClientError::UserRejected);
        };
        self.establish(provider, account).await
    }

    /// Pick up an account the wallet already authorized, without prompting.
    pub async fn resume(&self) -> Result<Option<SessionContext>, ClientError> {
        let provider = self.provider()?;
        let accounts = provider.accounts().await.map_err(classify_session)?;
        match accounts.first().copied() {
            Some(account) => self.establish(provider, account).await.map(Some),
            None => {
                self.publish(Session::disconnected());
                Ok(None)
            }
        }
    }

    async fn establish(
        &self,
        provider: &W,
        account: Address,
    ) -> Result<SessionContext, ClientError> {
        let expected = self.required_chain_id;
        let actual = match provider.chain_id().await {
            Ok(chain_id) => chain_id,
            Err(err) => {
                self.publish(Session::disconnected());
                return Err(classify_session(err));
            }
        };
        if actual == expected {
            return Ok(self.connected(account, actual));
        }

        self.publish(Session {
            account: Some(account),
            chain_id: Some(actual),
            status: SessionStatus::WrongNetwork,
        });
        warn!(expected, actual, "wallet is on the wrong network, requesting switch");

        match provider.switch_chain(expected).await {
            Ok(()) => {}
            Err(ProviderError::UnrecognizedChain(_)) => {
                return Err(ClientError::UnsupportedNetwork { chain_id: expected });
            }
            Err(err) => {
                warn!(?err, "network switch failed");
                return Err(ClientError::NetworkMismatch { expected, actual });
            }
        }

        let switched = provider.chain_id().await.map_err(classify_session)?;
        if switched != expected {
            self.publish(Session {
                account: Some(account),
                chain_id: Some(switched),
                status: SessionStatus::WrongNetwork,
            });
            return Err(ClientError::NetworkMismatch {
                expected,
                actual: switched,
            });
        }
        Ok(self.connected(account, switched))
    }

    fn connected(&self, account: Address, chain_id: u64) -> SessionContext {
        self.publish(Session {
            account: Some(account),
            chain_id: Some(chain_id),
            status: SessionStatus::Connected,
        });
        info!(%account, chain_id, "wallet connected");
        SessionContext { account, chain_id }
    }

    pub fn disconnect(&self) {
        self.publish(Session::disconnected());
        info!("wallet disconnected");
    }

    pub fn subscribe(&self) -> Result<Subscription, ClientError> {
        Ok(self.provider()?.subscribe())
    }

    pub fn handle_notification(&self, notification: WalletNotification) -> SessionEvent {
        let current = self.session();
        match notification {
            WalletNotification::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    if current.status == SessionStatus::Disconnected {
                        return SessionEvent::Unchanged;
                    }
                    self.publish(Session::disconnected());
                    info!("wallet reported no accounts, disconnecting");
                    SessionEvent::Disconnected
                }
                Some(&lead) if current.account == Some(lead) => SessionEvent::Unchanged,
                Some(&lead) => match (current.status, current.chain_id) {
                    (SessionStatus::Connected, Some(chain_id)) => {
                        let context = self.connected(lead, chain_id);
                        info!(account = %lead, "wallet account switched");
                        SessionEvent::AccountSwitched(context)
                    }
                    (SessionStatus::WrongNetwork, chain_id) => {
                        self.publish(Session {
                            account: Some(lead),
                            chain_id,
                            status: SessionStatus::WrongNetwork,
                        });
                        SessionEvent::WrongNetwork { account: lead }
                    }
                    _ => SessionEvent::Unchanged,
                },
            },
            WalletNotification::ChainChanged(chain_id) => {
                self.publish(Session::disconnected());
                info!(chain_id, "wallet chain changed, session invalidated");
                SessionEvent::ReloadRequired { chain_id }
            }
        }
    }
}
