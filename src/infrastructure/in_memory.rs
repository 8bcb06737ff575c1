use crate::domain::address::{Address, User};
use crate::domain::cart::{Cart, ClientSecret, DeliveryMethod};
use crate::domain::ports::{AccountService, CartService, CheckoutView, Notifier, PaymentBackend};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, RwLock};
use tracing::{error, info};

/// Cart collaborator holding a single cart in memory.
#[derive(Default, Clone)]
pub struct InMemoryCartService {
    cart: Arc<RwLock<Option<Cart>>>,
    delivery: Arc<RwLock<Option<DeliveryMethod>>>,
}

impl InMemoryCartService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cart(cart: Cart) -> Self {
        Self {
            cart: Arc::new(RwLock::new(Some(cart))),
            ..Self::default()
        }
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn current_cart(&self) -> Option<Cart> {
        self.cart.read().await.clone()
    }

    async fn set_cart(&self, cart: Cart) {
        *self.cart.write().await = Some(cart);
    }

    async fn delete_cart(&self) -> Result<()> {
        if let Some(cart) = self.cart.write().await.take() {
            info!(cart_id = %cart.id, "cart deleted");
        }
        Ok(())
    }

    async fn selected_delivery(&self) -> Option<DeliveryMethod> {
        self.delivery.read().await.clone()
    }

    async fn set_selected_delivery(&self, method: Option<DeliveryMethod>) {
        *self.delivery.write().await = method;
    }
}

/// Account collaborator with a fixed user and a log of saved addresses.
#[derive(Default, Clone)]
pub struct InMemoryAccountService {
    user: Arc<RwLock<Option<User>>>,
    saved: Arc<RwLock<Vec<Address>>>,
    failure: Option<String>,
    updated: Arc<Notify>,
}

impl InMemoryAccountService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(user: User) -> Self {
        Self {
            user: Arc::new(RwLock::new(Some(user))),
            ..Self::default()
        }
    }

    /// Makes every `update_address` call fail with `message`.
    pub fn failing_updates(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub async fn saved_addresses(&self) -> Vec<Address> {
        self.saved.read().await.clone()
    }

    /// Resolves once an address update has been attempted.
    pub async fn wait_for_update(&self) {
        self.updated.notified().await;
    }
}

#[async_trait]
impl AccountService for InMemoryAccountService {
    async fn current_user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    async fn update_address(&self, address: Address) -> Result<Address> {
        let result = match &self.failure {
            Some(message) => Err(CheckoutError::Backend(message.clone())),
            None => {
                self.saved.write().await.push(address.clone());
                if let Some(user) = self.user.write().await.as_mut() {
                    user.address = Some(address.clone());
                }
                Ok(address)
            }
        };
        self.updated.notify_one();
        result
    }
}

/// Payment endpoint backed by an in-memory cart table.
///
/// Secrets queued with [`InMemoryPaymentBackend::queue_secrets`] are handed out
/// first; after that a cart keeps its current secret, and carts without one get
/// a generated secret.
#[derive(Default, Clone)]
pub struct InMemoryPaymentBackend {
    carts: Arc<RwLock<HashMap<String, Cart>>>,
    secrets: Arc<RwLock<VecDeque<ClientSecret>>>,
    failure: Arc<RwLock<Option<String>>>,
    requests: Arc<AtomicUsize>,
}

impl InMemoryPaymentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_cart(&self, cart: Cart) {
        self.carts.write().await.insert(cart.id.clone(), cart);
    }

    pub async fn queue_secrets<I, S>(&self, secrets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ClientSecret>,
    {
        self.secrets
            .write()
            .await
            .extend(secrets.into_iter().map(Into::into));
    }

    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write().await = Some(message.into());
    }

    pub async fn recover(&self) {
        *self.failure.write().await = None;
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentBackend for InMemoryPaymentBackend {
    async fn create_or_update_payment_intent(&self, cart_id: &str) -> Result<Cart> {
        let request = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(message) = self.failure.read().await.clone() {
            return Err(CheckoutError::Backend(message));
        }

        let mut carts = self.carts.write().await;
        let cart = carts
            .get_mut(cart_id)
            .ok_or_else(|| CheckoutError::Backend(format!("Cart {cart_id} not found")))?;

        if let Some(secret) = self.secrets.write().await.pop_front() {
            cart.client_secret = Some(secret);
        } else if cart.client_secret.is_none() {
            cart.client_secret = Some(ClientSecret::new(format!(
                "pi_{request}_secret_inmemory"
            )));
        }
        if let Some(secret) = &cart.client_secret {
            let intent = secret.as_str().split("_secret").next().unwrap_or_default();
            cart.payment_intent_id = Some(intent.to_string());
        }

        Ok(cart.clone())
    }
}

/// Error channel that logs and keeps every message.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        error!("{message}");
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

/// Stepper/router stand-in that records what it was asked to do.
#[derive(Default, Clone)]
pub struct RecordingView {
    steps_back: Arc<AtomicUsize>,
    routes: Arc<Mutex<Vec<String>>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps_back(&self) -> usize {
        self.steps_back.load(Ordering::SeqCst)
    }

    pub fn routes(&self) -> Vec<String> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn destination(&self) -> Option<String> {
        self.routes().last().cloned()
    }
}

impl CheckoutView for RecordingView {
    fn previous_step(&self) {
        self.steps_back.fetch_add(1, Ordering::SeqCst);
    }

    fn navigate(&self, route: &str) {
        info!(route, "navigating");
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route.to_string());
    }
}
