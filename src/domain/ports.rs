use super::address::{Address, User};
use super::cart::{Cart, DeliveryMethod};
use super::payment::{
    ConfirmPaymentParams, ConfirmationToken, ElementChange, ElementKind, ElementOptions,
    ElementsOptions, PaymentIntent, ProviderAddress, ProviderError,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Owner of the shopper's cart. Checkout reads and mutates the cart only
/// through this handle.
#[async_trait]
pub trait CartService: Send + Sync {
    async fn current_cart(&self) -> Option<Cart>;
    async fn set_cart(&self, cart: Cart);
    async fn delete_cart(&self) -> Result<()>;
    async fn selected_delivery(&self) -> Option<DeliveryMethod>;
    async fn set_selected_delivery(&self, method: Option<DeliveryMethod>);
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn current_user(&self) -> Option<User>;
    async fn update_address(&self, address: Address) -> Result<Address>;
}

/// `POST /payments/{cartId}`: creates or refreshes the cart's payment intent.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    async fn create_or_update_payment_intent(&self, cart_id: &str) -> Result<Cart>;
}

/// The single user-visible failure surface.
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
}

/// Stepper and router of the hosting UI.
pub trait CheckoutView: Send + Sync {
    fn previous_step(&self);
    fn navigate(&self, route: &str);
}

pub type ChangeListener = Box<dyn Fn(&ElementChange) + Send + Sync>;

/// An embedded, provider-rendered widget.
#[async_trait]
pub trait Element: Send + Sync {
    fn kind(&self) -> ElementKind;
    fn mount(&self, selector: &str) -> Result<()>;
    /// Registers a listener for change notifications. Listeners live as long
    /// as the element.
    fn on_change(&self, listener: ChangeListener);
    /// The address currently entered, for address elements. Payment elements
    /// always report `None`.
    async fn address_value(&self) -> Result<Option<ProviderAddress>>;
}

/// A provider session context bound to one client secret.
#[async_trait]
pub trait ElementsSession: Send + Sync {
    async fn create(&self, options: ElementOptions) -> Result<Arc<dyn Element>>;
    /// Validates every element of the session.
    async fn submit(&self) -> std::result::Result<(), ProviderError>;
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn elements(&self, options: ElementsOptions) -> Result<Arc<dyn ElementsSession>>;
    async fn create_confirmation_token(
        &self,
        elements: &Arc<dyn ElementsSession>,
    ) -> Result<std::result::Result<ConfirmationToken, ProviderError>>;
    async fn confirm_payment(
        &self,
        params: ConfirmPaymentParams,
    ) -> Result<std::result::Result<PaymentIntent, ProviderError>>;
}

/// Loads the provider SDK. `None` means the SDK could not be initialized.
#[async_trait]
pub trait ProviderLoader: Send + Sync {
    async fn load(&self, publishable_key: &str) -> Option<Arc<dyn PaymentProvider>>;
}

pub type CartServiceRef = Arc<dyn CartService>;
pub type AccountServiceRef = Arc<dyn AccountService>;
pub type PaymentBackendRef = Arc<dyn PaymentBackend>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type CheckoutViewRef = Arc<dyn CheckoutView>;
pub type ProviderLoaderRef = Arc<dyn ProviderLoader>;
