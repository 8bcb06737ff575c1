use crate::config::CheckoutConfig;
use crate::domain::cart::{Cart, ClientSecret};
use crate::domain::payment::{
    AddressDefaults, AddressElementOptions, AddressMode, ConfirmPaymentParams, ConfirmationToken,
    ElementKind, ElementOptions, ElementsOptions, PaymentOutcome, TokenOutcome,
};
use crate::domain::ports::{
    CartServiceRef, Element, ElementsSession, PaymentBackendRef, PaymentProvider,
    ProviderLoaderRef,
};
use crate::error::{CheckoutError, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Provider session context together with the elements created from it.
struct SessionContext {
    secret: ClientSecret,
    elements: Arc<dyn ElementsSession>,
    address: Option<Arc<dyn Element>>,
    payment: Option<Arc<dyn Element>>,
}

impl SessionContext {
    fn slot(&mut self, kind: ElementKind) -> &mut Option<Arc<dyn Element>> {
        match kind {
            ElementKind::Address => &mut self.address,
            ElementKind::Payment => &mut self.payment,
        }
    }
}

/// Owns the payment-provider session of one checkout.
///
/// The session context is cached under the cart's client secret. Whenever the
/// cart's secret changes the cached context (and every element created from
/// it) is dropped, and the next request builds a new one. Every bind bumps
/// [`generation`](Self::generation), so holders of elements can tell that
/// theirs belong to a session that is gone.
pub struct PaymentSessionManager {
    loader: ProviderLoaderRef,
    provider: OnceCell<Option<Arc<dyn PaymentProvider>>>,
    backend: PaymentBackendRef,
    cart: CartServiceRef,
    config: CheckoutConfig,
    session: Option<SessionContext>,
    generation: u64,
}

impl PaymentSessionManager {
    pub fn new(
        loader: ProviderLoaderRef,
        backend: PaymentBackendRef,
        cart: CartServiceRef,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            loader,
            provider: OnceCell::new(),
            backend,
            cart,
            config,
            session: None,
            generation: 0,
        }
    }

    /// Loads the provider SDK on first use.
    async fn provider(&self) -> Result<Arc<dyn PaymentProvider>> {
        self.provider
            .get_or_init(|| self.loader.load(&self.config.publishable_key))
            .await
            .clone()
            .ok_or(CheckoutError::ProviderUnavailable)
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_secret(&self) -> Option<&ClientSecret> {
        self.session.as_ref().map(|session| &session.secret)
    }

    /// Number of sessions bound so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Asks the backend to create or update the cart's payment intent and
    /// stores the returned cart.
    ///
    /// An existing session whose secret no longer matches is replaced by one
    /// bound to the new secret; its elements are not carried over.
    pub async fn refresh_payment_intent(&mut self) -> Result<Cart> {
        let cart = self
            .cart
            .current_cart()
            .await
            .ok_or(CheckoutError::CartUnavailable)?;
        let updated = self.backend.create_or_update_payment_intent(&cart.id).await?;
        self.cart.set_cart(updated.clone()).await;

        if let Some(session) = &self.session
            && updated.client_secret.as_ref() != Some(&session.secret)
        {
            info!(cart_id = %updated.id, "client secret changed, rebinding payment session");
            self.session = None;
            if let Some(secret) = updated.client_secret.clone() {
                let provider = self.provider().await?;
                self.bind(provider.as_ref(), secret).await?;
            }
        }

        Ok(updated)
    }

    /// Returns the session context bound to the cart's current secret,
    /// building one if needed.
    pub async fn ensure_session(&mut self) -> Result<Arc<dyn ElementsSession>> {
        let provider = self.provider().await?;
        let cart_secret = self
            .cart
            .current_cart()
            .await
            .and_then(|cart| cart.client_secret);

        if let Some(session) = &self.session {
            if cart_secret.as_ref() == Some(&session.secret) {
                return Ok(Arc::clone(&session.elements));
            }
            debug!(stale = %session.secret, "payment session no longer matches the cart");
            self.session = None;
            if let Some(secret) = cart_secret {
                return self.bind(provider.as_ref(), secret).await;
            }
        }

        let cart = self.refresh_payment_intent().await?;
        let secret = cart.client_secret.ok_or_else(|| {
            CheckoutError::SessionNotReady(format!("cart {} has no client secret", cart.id))
        })?;
        self.bind(provider.as_ref(), secret).await
    }

    async fn bind(
        &mut self,
        provider: &dyn PaymentProvider,
        secret: ClientSecret,
    ) -> Result<Arc<dyn ElementsSession>> {
        let elements = provider
            .elements(ElementsOptions {
                client_secret: secret.clone(),
                appearance: self.config.appearance,
            })
            .await?;
        self.generation += 1;
        info!(generation = self.generation, "payment session created");
        self.session = Some(SessionContext {
            secret,
            elements: Arc::clone(&elements),
            address: None,
            payment: None,
        });
        Ok(elements)
    }

    async fn element(&mut self, options: ElementOptions) -> Result<Arc<dyn Element>> {
        self.ensure_session().await?;
        let session = self.session.as_mut().ok_or_else(|| {
            CheckoutError::SessionNotReady("no payment session context".to_string())
        })?;

        let kind = options.kind();
        if let Some(element) = session.slot(kind).as_ref() {
            return Ok(Arc::clone(element));
        }

        // Nothing is cached until creation succeeds.
        let element = session.elements.create(options).await?;
        debug!(%kind, "element created");
        *session.slot(kind) = Some(Arc::clone(&element));
        Ok(element)
    }

    /// Returns the address element, creating it pre-filled with `defaults`
    /// on first use.
    pub async fn address_element(
        &mut self,
        defaults: Option<AddressDefaults>,
    ) -> Result<Arc<dyn Element>> {
        self.element(ElementOptions::Address(AddressElementOptions {
            mode: AddressMode::Shipping,
            default_values: defaults.unwrap_or_default(),
        }))
        .await
    }

    pub async fn payment_element(&mut self) -> Result<Arc<dyn Element>> {
        self.element(ElementOptions::Payment).await
    }

    /// Validates the elements and asks the provider for a confirmation token.
    ///
    /// Completion flags are not checked here; callers gate on them.
    pub async fn request_confirmation_token(&mut self) -> Result<TokenOutcome> {
        let provider = self.provider().await?;
        let elements = self.ensure_session().await?;
        self.validate(elements.as_ref()).await?;

        Ok(match provider.create_confirmation_token(&elements).await? {
            Ok(token) => TokenOutcome::Issued(token),
            Err(error) => TokenOutcome::Rejected(error),
        })
    }

    pub async fn confirm_payment(&mut self, token: &ConfirmationToken) -> Result<PaymentOutcome> {
        let provider = self.provider().await?;
        let client_secret = self
            .cart
            .current_cart()
            .await
            .and_then(|cart| cart.client_secret)
            .ok_or_else(|| {
                CheckoutError::SessionNotReady(
                    "no client secret bound to the current cart".to_string(),
                )
            })?;
        let elements = self.ensure_session().await?;
        self.validate(elements.as_ref()).await?;

        let params = ConfirmPaymentParams {
            client_secret,
            confirmation_token: token.id.clone(),
            redirect: self.config.redirect,
        };
        Ok(match provider.confirm_payment(params).await? {
            Ok(intent) => PaymentOutcome::Succeeded(intent),
            Err(error) => PaymentOutcome::Failed(error),
        })
    }

    async fn validate(&self, elements: &dyn ElementsSession) -> Result<()> {
        elements.submit().await.map_err(|error| {
            CheckoutError::ValidationIncomplete(
                error.message_or(&self.config.fallback_error).to_string(),
            )
        })
    }

    /// Drops the session context and its elements. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.session.take().is_some() {
            debug!("payment session disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cart::Cart;
    use crate::domain::payment::ProviderAddress;
    use crate::domain::ports::CartService;
    use crate::infrastructure::in_memory::{InMemoryCartService, InMemoryPaymentBackend};
    use crate::infrastructure::sandbox::{SandboxProvider, UnavailableLoader};

    async fn manager_with(
        provider: ProviderLoaderRef,
    ) -> (PaymentSessionManager, InMemoryCartService, InMemoryPaymentBackend) {
        let cart = InMemoryCartService::with_cart(Cart::new("cart-1"));
        let backend = InMemoryPaymentBackend::new();
        backend.insert_cart(Cart::new("cart-1")).await;
        let manager = PaymentSessionManager::new(
            provider,
            Arc::new(backend.clone()),
            Arc::new(cart.clone()),
            CheckoutConfig::default(),
        );
        (manager, cart, backend)
    }

    #[tokio::test]
    async fn test_session_is_created_once() {
        let sandbox = SandboxProvider::new();
        let (mut manager, cart, backend) = manager_with(Arc::new(sandbox.clone())).await;

        manager.ensure_session().await.unwrap();
        manager.ensure_session().await.unwrap();

        assert_eq!(backend.requests(), 1);
        assert_eq!(sandbox.sessions_created(), 1);
        assert_eq!(
            manager.session_secret(),
            cart.current_cart().await.unwrap().client_secret.as_ref()
        );
    }

    #[tokio::test]
    async fn test_unavailable_provider() {
        let (mut manager, _, backend) = manager_with(Arc::new(UnavailableLoader)).await;

        let result = manager.ensure_session().await;
        assert!(matches!(result, Err(CheckoutError::ProviderUnavailable)));
        assert_eq!(backend.requests(), 0);
    }

    #[tokio::test]
    async fn test_address_element_is_prefilled() {
        let sandbox = SandboxProvider::new();
        let (mut manager, _, _) = manager_with(Arc::new(sandbox.clone())).await;
        let defaults = AddressDefaults {
            name: Some("Tom Smith".to_string()),
            address: Some(ProviderAddress {
                line1: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                postal_code: "62701".to_string(),
                country: "US".to_string(),
                ..ProviderAddress::default()
            }),
        };

        let element = manager.address_element(Some(defaults.clone())).await.unwrap();
        assert_eq!(element.kind(), ElementKind::Address);

        let created = sandbox.element(ElementKind::Address).unwrap();
        match created.options() {
            ElementOptions::Address(options) => {
                assert_eq!(options.mode, AddressMode::Shipping);
                assert_eq!(options.default_values, defaults);
            }
            other => panic!("unexpected options {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_cart_is_reported() {
        let sandbox = SandboxProvider::new();
        let (mut manager, cart, _) = manager_with(Arc::new(sandbox)).await;
        cart.delete_cart().await.unwrap();

        let result = manager.refresh_payment_intent().await;
        assert!(matches!(result, Err(CheckoutError::CartUnavailable)));
    }

    #[tokio::test]
    async fn test_confirm_without_secret_is_not_ready() {
        let sandbox = SandboxProvider::new();
        let (mut manager, _, _) = manager_with(Arc::new(sandbox.clone())).await;

        let result = manager
            .confirm_payment(&ConfirmationToken::new("ctoken_1"))
            .await;
        assert!(matches!(result, Err(CheckoutError::SessionNotReady(_))));
        assert!(sandbox.confirmations().is_empty());
    }
}
