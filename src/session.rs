//! Session Manager
//!
//! Owns the wallet connection lifecycle:
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                               |                  |
//!                               +--fail--> Error --+--> Disconnected
//! ```
//!
//! Every mutation goes through one serialized transition path, so listeners
//! see transitions one at a time and in order. A generation counter is bumped
//! whenever a connect starts or the session is reset; late results of a
//! superseded connect attempt are dropped instead of applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::GovernanceConfig;
use crate::error::ProviderError;
use crate::gateway::ContractGateway;
use crate::provider::{ConnectionMethod, ProviderEvent, WalletConnectors, WalletProvider};
use crate::types::Address;
use crate::GovernanceError;

/// Connection status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Transient: a connect attempt failed or the wallet left the network
    Error(GovernanceError),
}

/// Immutable snapshot of the wallet connection
///
/// `account` is present if and only if the status is `Connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    status: SessionStatus,
    account: Option<Address>,
    chain_id: Option<u64>,
    method: Option<ConnectionMethod>,
    last_error: Option<GovernanceError>,
}

impl Session {
    fn disconnected(last_error: Option<GovernanceError>) -> Self {
        Self {
            status: SessionStatus::Disconnected,
            account: None,
            chain_id: None,
            method: None,
            last_error,
        }
    }

    fn connecting(method: ConnectionMethod) -> Self {
        Self {
            status: SessionStatus::Connecting,
            account: None,
            chain_id: None,
            method: Some(method),
            last_error: None,
        }
    }

    fn connected(method: ConnectionMethod, account: Address, chain_id: u64) -> Self {
        Self {
            status: SessionStatus::Connected,
            account: Some(account),
            chain_id: Some(chain_id),
            method: Some(method),
            last_error: None,
        }
    }

    fn failed(method: Option<ConnectionMethod>, reason: GovernanceError) -> Self {
        Self {
            status: SessionStatus::Error(reason.clone()),
            account: None,
            chain_id: None,
            method,
            last_error: Some(reason),
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn method(&self) -> Option<ConnectionMethod> {
        self.method
    }

    /// Reason of the most recent failed connect; cleared by `disconnect()`
    pub fn last_error(&self) -> Option<&GovernanceError> {
        self.last_error.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::disconnected(None)
    }
}

type Listener = Arc<dyn Fn(&Session) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle returned by `on_session_change`
#[must_use = "dropping the handle keeps the listener registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Stop delivering transitions to this listener
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner.listeners).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

struct Inner {
    config: GovernanceConfig,
    connectors: WalletConnectors,
    session: RwLock<Session>,
    /// Serializes transitions and their delivery
    transition_lock: Mutex<()>,
    generation: AtomicU64,
    listeners: Mutex<ListenerRegistry>,
    active: Mutex<Option<Arc<dyn WalletProvider>>>,
    event_pump: Mutex<Option<JoinHandle<()>>>,
}

enum BeginConnect {
    AlreadyConnected(Session),
    Started {
        generation: u64,
        previous: Session,
        provider: Arc<dyn WalletProvider>,
    },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    fn snapshot(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply `next` and deliver it; caller holds `transition_lock`
    fn set_locked(&self, next: Session) {
        {
            let mut current = self
                .session
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if *current == next {
                return;
            }
            *current = next.clone();
        }
        log::debug!("Session -> {:?}", next.status);

        let listeners: Vec<Listener> = lock(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&next);
        }
    }

    /// Apply `next` only if no reset or newer connect happened since `generation`
    fn apply_if(&self, generation: u64, next: Session) -> bool {
        let _guard = lock(&self.transition_lock);
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.set_locked(next);
        true
    }

    /// Drop the active provider and event pump; caller holds `transition_lock`
    fn reset_locked(&self, last_error: Option<GovernanceError>) -> Option<Arc<dyn WalletProvider>> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(pump) = lock(&self.event_pump).take() {
            pump.abort();
        }
        let provider = lock(&self.active).take();
        self.set_locked(Session::disconnected(last_error));
        provider
    }

    fn begin_connect(&self, method: ConnectionMethod) -> Result<BeginConnect, GovernanceError> {
        let _guard = lock(&self.transition_lock);
        let current = self.snapshot();
        match current.status {
            SessionStatus::Connected => return Ok(BeginConnect::AlreadyConnected(current)),
            SessionStatus::Connecting => return Err(GovernanceError::ConnectInProgress),
            _ => {}
        }

        let Some(provider) = self.connectors.get(method) else {
            let err = GovernanceError::WalletUnavailable(method);
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.set_locked(Session::failed(Some(method), err.clone()));
            self.set_locked(Session::disconnected(Some(err.clone())));
            return Err(err);
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_locked(Session::connecting(method));
        Ok(BeginConnect::Started {
            generation,
            previous: current,
            provider,
        })
    }

    fn fail_connect(&self, generation: u64, method: ConnectionMethod, err: GovernanceError) {
        if self.apply_if(generation, Session::failed(Some(method), err.clone())) {
            self.apply_if(generation, Session::disconnected(Some(err)));
        }
    }

    /// Publish the connected session, install the provider and start the
    /// event pump, all under one transition
    ///
    /// `events` was subscribed before negotiation started, so changes made in
    /// the wallet while connecting are still delivered.
    fn finish_connect(
        self: &Arc<Self>,
        generation: u64,
        session: Session,
        provider: Arc<dyn WalletProvider>,
        events: broadcast::Receiver<ProviderEvent>,
    ) -> bool {
        let _guard = lock(&self.transition_lock);
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }

        *lock(&self.active) = Some(provider);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pump = handle.spawn(pump_events(Arc::downgrade(self), events, generation));
                if let Some(old) = lock(&self.event_pump).replace(pump) {
                    old.abort();
                }
            }
            Err(_) => log::warn!("⚠️  No tokio runtime; provider events will not be watched"),
        }

        self.set_locked(session);
        true
    }

    fn handle_event(&self, generation: Option<u64>, event: ProviderEvent) {
        let _guard = lock(&self.transition_lock);
        if let Some(generation) = generation {
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
        }

        let current = self.snapshot();
        if !current.is_connected() {
            log::debug!("Ignoring provider event while {:?}: {:?}", current.status, event);
            return;
        }
        let required = self.config.chain_id();

        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    log::info!("🔒 Wallet revoked all accounts, disconnecting");
                    self.reset_locked(None);
                }
                Some(account) if current.account != Some(*account) => {
                    log::info!("👤 Active account changed to {}", account);
                    if let Some(method) = current.method {
                        self.set_locked(Session::connected(method, *account, required));
                    }
                }
                Some(_) => {}
            },
            ProviderEvent::ChainChanged(chain_id) if chain_id != required => {
                log::warn!("⚠️  Wallet switched to chain {}, dropping session", chain_id);
                let err = GovernanceError::WrongNetwork { expected: required };
                self.set_locked(Session::failed(current.method, err.clone()));
                self.reset_locked(Some(err));
            }
            ProviderEvent::ChainChanged(_) => {}
            ProviderEvent::Disconnected => {
                log::info!("🔌 Provider disconnected");
                self.reset_locked(None);
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(pump) = lock(&self.event_pump).take() {
            pump.abort();
        }
    }
}

async fn pump_events(inner: Weak<Inner>, mut events: broadcast::Receiver<ProviderEvent>, generation: u64) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Some(inner) = inner.upgrade() else { break };
                inner.handle_event(Some(generation), event);
            }
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("⚠️  Missed {} provider events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Restores the pre-connect snapshot if a connect future is dropped mid-flight
struct ConnectGuard {
    inner: Arc<Inner>,
    generation: u64,
    previous: Option<Session>,
}

impl ConnectGuard {
    fn disarm(&mut self) {
        self.previous = None;
    }
}

impl Drop for ConnectGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            log::info!("Connect attempt cancelled, restoring previous session");
            self.inner.apply_if(self.generation, previous);
        }
    }
}

/// Session Manager
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager in the `Disconnected` state
    pub fn new(config: GovernanceConfig, connectors: WalletConnectors) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connectors,
                session: RwLock::new(Session::default()),
                transition_lock: Mutex::new(()),
                generation: AtomicU64::new(0),
                listeners: Mutex::new(ListenerRegistry::default()),
                active: Mutex::new(None),
                event_pump: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.inner.config
    }

    /// Connect through `method` and make sure the wallet is on the required chain
    ///
    /// Already connected: returns the current session untouched. Another
    /// connect in flight: `ConnectInProgress`. Any failure is published as a
    /// transient `Error` followed by `Disconnected`, and is not retried.
    pub async fn connect(&self, method: ConnectionMethod) -> Result<Session, GovernanceError> {
        log::info!("🔌 Connecting via {}", method);

        let (generation, previous, provider) = match self.inner.begin_connect(method)? {
            BeginConnect::AlreadyConnected(session) => {
                log::debug!("Already connected as {:?}", session.account());
                return Ok(session);
            }
            BeginConnect::Started {
                generation,
                previous,
                provider,
            } => (generation, previous, provider),
        };

        let events = provider.subscribe();
        let mut guard = ConnectGuard {
            inner: self.inner.clone(),
            generation,
            previous: Some(previous),
        };
        let negotiated = self.negotiate(provider.as_ref()).await;
        guard.disarm();

        match negotiated {
            Ok((account, chain_id)) => {
                let session = Session::connected(method, account, chain_id);
                if self.inner.finish_connect(generation, session.clone(), provider, events) {
                    log::info!("   ✅ Connected as {} on chain {}", account, chain_id);
                    Ok(session)
                } else {
                    log::warn!("   Connect attempt superseded by a disconnect");
                    Err(GovernanceError::NotConnected)
                }
            }
            Err(err) => {
                log::error!("   ❌ Connect failed: {}", err);
                self.inner.fail_connect(generation, method, err.clone());
                Err(err)
            }
        }
    }

    /// Reset to `Disconnected`, whatever the current state
    ///
    /// Provider-side teardown errors are logged and swallowed.
    pub async fn disconnect(&self) {
        let provider = {
            let _guard = lock(&self.inner.transition_lock);
            self.inner.reset_locked(None)
        };

        if let Some(provider) = provider {
            if let Err(e) = provider.disconnect().await {
                log::warn!("⚠️  Provider teardown failed (ignored): {}", e);
            }
        }
        log::info!("🔌 Disconnected");
    }

    /// Snapshot of the current session
    pub fn current_session(&self) -> Session {
        self.inner.snapshot()
    }

    /// Register `listener` for every session transition
    ///
    /// Listeners run in registration order on the thread applying the
    /// transition, one transition at a time. They must not block and must
    /// not call `handle_provider_event` synchronously; reading the session
    /// or taking a gateway from inside a listener is fine.
    pub fn on_session_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.inner.listeners);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Apply a provider push event to the session
    ///
    /// The manager pumps its provider's events itself after connecting; this
    /// entry point is for hosts that receive events through another channel.
    pub fn handle_provider_event(&self, event: ProviderEvent) {
        self.inner.handle_event(None, event);
    }

    /// Gateway bound to the connected account
    pub fn gateway(&self) -> Result<ContractGateway, GovernanceError> {
        let session = self.inner.snapshot();
        let account = match (session.status(), session.account()) {
            (SessionStatus::Connected, Some(account)) => account,
            _ => return Err(GovernanceError::NotConnected),
        };
        if session.chain_id() != Some(self.inner.config.chain_id()) {
            return Err(GovernanceError::WrongNetwork {
                expected: self.inner.config.chain_id(),
            });
        }
        let provider = lock(&self.inner.active)
            .clone()
            .ok_or(GovernanceError::NotConnected)?;
        Ok(ContractGateway::new(provider, account, &self.inner.config))
    }

    /// Authorize an account and land on the required chain
    async fn negotiate(&self, provider: &dyn WalletProvider) -> Result<(Address, u64), GovernanceError> {
        let config = &self.inner.config;

        let accounts = match tokio::time::timeout(
            config.authorization_timeout,
            provider.request_accounts(),
        )
        .await
        {
            Err(_) => return Err(GovernanceError::Timeout),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(accounts)) => accounts,
        };
        let account = accounts.first().copied().ok_or(GovernanceError::UserRejected)?;
        log::debug!("   Authorized account {}", account);

        let chain_id = provider.chain_id().await?;
        if chain_id != config.chain_id() {
            log::info!(
                "   🔀 Wallet on chain {}, switching to {} ({})",
                chain_id,
                config.chain.name,
                config.chain_id()
            );
            self.switch_network(provider).await?;
        }
        Ok((account, config.chain_id()))
    }

    /// Switch to the required chain, registering it first if the wallet does
    /// not know it
    async fn switch_network(&self, provider: &dyn WalletProvider) -> Result<(), GovernanceError> {
        let chain = &self.inner.config.chain;
        let wrong_network = |stage: &str, e: ProviderError| {
            log::error!("   ❌ Network {} failed: {}", stage, e);
            GovernanceError::WrongNetwork {
                expected: chain.chain_id,
            }
        };

        match provider.switch_chain(chain.chain_id).await {
            Ok(()) => {}
            Err(ProviderError::UnrecognizedChain(_)) => {
                log::info!("   ➕ Registering {} with the wallet", chain.name);
                provider
                    .add_chain(chain)
                    .await
                    .map_err(|e| wrong_network("registration", e))?;
                provider
                    .switch_chain(chain.chain_id)
                    .await
                    .map_err(|e| wrong_network("switch", e))?;
            }
            Err(e) => return Err(wrong_network("switch", e)),
        }

        let now = provider.chain_id().await?;
        if now != chain.chain_id {
            log::error!("   ❌ Wallet still on chain {} after switching", now);
            return Err(GovernanceError::WrongNetwork {
                expected: chain.chain_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_present_only_when_connected() {
        let account = Address::from_bytes([1; 20]);
        assert!(Session::connected(ConnectionMethod::InjectedWallet, account, 1)
            .account()
            .is_some());
        assert!(Session::connecting(ConnectionMethod::InjectedWallet).account().is_none());
        assert!(Session::disconnected(None).account().is_none());
        assert!(Session::failed(None, GovernanceError::Timeout).account().is_none());
    }

    #[test]
    fn test_new_manager_starts_disconnected() {
        let manager = SessionManager::new(GovernanceConfig::default(), WalletConnectors::new());
        let session = manager.current_session();
        assert_eq!(session.status(), &SessionStatus::Disconnected);
        assert!(session.last_error().is_none());
        assert!(matches!(manager.gateway(), Err(GovernanceError::NotConnected)));
    }

    #[tokio::test]
    async fn test_missing_provider_is_wallet_unavailable() {
        let manager = SessionManager::new(GovernanceConfig::default(), WalletConnectors::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = manager.on_session_change(move |s| lock(&sink).push(s.status().clone()));

        let err = manager.connect(ConnectionMethod::RemoteSigner).await.unwrap_err();
        assert_eq!(err, GovernanceError::WalletUnavailable(ConnectionMethod::RemoteSigner));

        let session = manager.current_session();
        assert_eq!(session.status(), &SessionStatus::Disconnected);
        assert_eq!(session.last_error(), Some(&err));
        assert_eq!(
            *lock(&seen),
            vec![SessionStatus::Error(err.clone()), SessionStatus::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_silent() {
        let manager = SessionManager::new(GovernanceConfig::default(), WalletConnectors::new());
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let _sub = manager.on_session_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.current_session().status(), &SessionStatus::Disconnected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
