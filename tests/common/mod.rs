#![allow(dead_code)]

use rust_decimal_macros::dec;
use std::sync::Arc;
use storefront_checkout::application::flow::{CheckoutFlow, Collaborators};
use storefront_checkout::config::CheckoutConfig;
use storefront_checkout::domain::address::{Address, User};
use storefront_checkout::domain::cart::{Cart, CartItem, DeliveryMethod};
use storefront_checkout::domain::checkout::CheckoutStep;
use storefront_checkout::domain::payment::ElementKind;
use storefront_checkout::domain::ports::CartService;
use storefront_checkout::infrastructure::in_memory::{
    InMemoryAccountService, InMemoryCartService, InMemoryPaymentBackend, RecordingNotifier,
    RecordingView,
};
use storefront_checkout::infrastructure::sandbox::{SandboxElement, SandboxProvider};

pub const CART_ID: &str = "cart-1";

pub fn cart() -> Cart {
    Cart::new(CART_ID).with_items(vec![CartItem {
        product_id: 7,
        product_name: "Blue Code Gloves".to_string(),
        price: dec!(18.00),
        quantity: 2,
        picture_url: String::new(),
        brand: "VS Code".to_string(),
        kind: "Gloves".to_string(),
    }])
}

pub fn address() -> Address {
    Address {
        line1: "42 Harbour Road".to_string(),
        line2: Some("Flat 3".to_string()),
        city: "Portsmouth".to_string(),
        state: "Hampshire".to_string(),
        postal_code: "PO1 2AB".to_string(),
        country: "GB".to_string(),
    }
}

pub fn user() -> User {
    User {
        first_name: "Tom".to_string(),
        last_name: "Smith".to_string(),
        email: "tom@test.com".to_string(),
        address: Some(address()),
    }
}

pub fn delivery() -> DeliveryMethod {
    DeliveryMethod {
        id: 1,
        short_name: "UPS1".to_string(),
        delivery_time: "1-2 Days".to_string(),
        description: "Fastest delivery time".to_string(),
        price: dec!(10),
    }
}

/// A checkout wired to in-memory collaborators and the sandbox provider.
pub struct Harness {
    pub flow: CheckoutFlow,
    pub sandbox: SandboxProvider,
    pub cart: InMemoryCartService,
    pub account: InMemoryAccountService,
    pub backend: InMemoryPaymentBackend,
    pub notifier: RecordingNotifier,
    pub view: RecordingView,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(cart(), InMemoryAccountService::with_user(user())).await
    }

    /// Cart (on both sides) already carrying `secret`.
    pub async fn with_secret(secret: &str) -> Self {
        Self::build(
            cart().with_client_secret(secret),
            InMemoryAccountService::with_user(user()),
        )
        .await
    }

    pub async fn with_account(account: InMemoryAccountService) -> Self {
        Self::build(cart(), account).await
    }

    async fn build(cart: Cart, account: InMemoryAccountService) -> Self {
        let sandbox = SandboxProvider::new();
        let cart_service = InMemoryCartService::with_cart(cart.clone());
        let backend = InMemoryPaymentBackend::new();
        backend.insert_cart(cart).await;
        let notifier = RecordingNotifier::new();
        let view = RecordingView::new();

        let flow = CheckoutFlow::new(
            Collaborators {
                loader: Arc::new(sandbox.clone()),
                backend: Arc::new(backend.clone()),
                cart: Arc::new(cart_service.clone()),
                account: Arc::new(account.clone()),
                notifier: Arc::new(notifier.clone()),
                view: Arc::new(view.clone()),
            },
            CheckoutConfig::default(),
        );

        Self {
            flow,
            sandbox,
            cart: cart_service,
            account,
            backend,
            notifier,
            view,
        }
    }

    pub fn address_element(&self) -> Arc<SandboxElement> {
        self.sandbox
            .element(ElementKind::Address)
            .expect("address element was not created")
    }

    pub fn payment_element(&self) -> Arc<SandboxElement> {
        self.sandbox
            .element(ElementKind::Payment)
            .expect("payment element was not created")
    }

    /// Fills in both elements and selects a delivery method.
    pub fn complete_all(&self) {
        self.address_element().emit_change(true);
        self.payment_element().emit_change(true);
        self.flow.on_delivery_selected(true);
    }

    /// Walks the stepper forward one step at a time until `target`.
    pub async fn advance_to(&mut self, target: CheckoutStep) {
        while self.flow.step() < target {
            let next = self.flow.step().index() + 1;
            self.flow.on_step_change(next).await;
        }
    }

    /// Started checkout, everything filled in, sitting on the review step.
    pub async fn ready_for_review(secret: &str) -> Self {
        let mut harness = Self::with_secret(secret).await;
        harness.flow.start().await;
        harness.cart.set_selected_delivery(Some(delivery())).await;
        harness.complete_all();
        harness.advance_to(CheckoutStep::Review).await;
        harness
    }
}
