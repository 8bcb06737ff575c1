mod common;

use std::sync::Arc;
use storefront_checkout::application::session::PaymentSessionManager;
use storefront_checkout::config::CheckoutConfig;
use storefront_checkout::domain::cart::ClientSecret;
use storefront_checkout::domain::payment::{
    ConfirmationToken, ElementKind, PaymentOutcome, TokenOutcome,
};
use storefront_checkout::domain::ports::{CartService, Element};
use storefront_checkout::error::CheckoutError;
use storefront_checkout::infrastructure::in_memory::{InMemoryCartService, InMemoryPaymentBackend};
use storefront_checkout::infrastructure::sandbox::SandboxProvider;

struct Setup {
    manager: PaymentSessionManager,
    sandbox: SandboxProvider,
    cart: InMemoryCartService,
    backend: InMemoryPaymentBackend,
}

async fn setup() -> Setup {
    let sandbox = SandboxProvider::new();
    let cart = InMemoryCartService::with_cart(common::cart());
    let backend = InMemoryPaymentBackend::new();
    backend.insert_cart(common::cart()).await;
    backend.queue_secrets(["sk_test_1"]).await;

    let manager = PaymentSessionManager::new(
        Arc::new(sandbox.clone()),
        Arc::new(backend.clone()),
        Arc::new(cart.clone()),
        CheckoutConfig::default(),
    );
    Setup {
        manager,
        sandbox,
        cart,
        backend,
    }
}

#[tokio::test]
async fn test_elements_are_created_once() {
    let mut s = setup().await;

    let first_address = s.manager.address_element(None).await.unwrap();
    let second_address = s.manager.address_element(None).await.unwrap();
    let first_payment = s.manager.payment_element().await.unwrap();
    let second_payment = s.manager.payment_element().await.unwrap();

    assert!(Arc::ptr_eq(&first_address, &second_address));
    assert!(Arc::ptr_eq(&first_payment, &second_payment));
    assert_eq!(first_payment.kind(), ElementKind::Payment);
    assert_eq!(s.sandbox.latest_session().unwrap().elements_created(), 2);
    assert_eq!(s.sandbox.sessions_created(), 1);
    assert_eq!(s.backend.requests(), 1);
}

#[tokio::test]
async fn test_failed_element_creation_is_retried() {
    let mut s = setup().await;
    s.sandbox.fail_next_element_creations(1);

    let failed = s.manager.payment_element().await;
    assert!(matches!(failed, Err(CheckoutError::Provider(_))));
    assert_eq!(s.sandbox.latest_session().unwrap().elements_created(), 0);

    s.manager.payment_element().await.unwrap();
    assert_eq!(s.sandbox.latest_session().unwrap().elements_created(), 1);
}

#[tokio::test]
async fn test_dispose_twice() {
    let mut s = setup().await;
    s.manager.payment_element().await.unwrap();

    s.manager.dispose();
    assert!(!s.manager.has_session());
    s.manager.dispose();
    assert!(!s.manager.has_session());
    assert!(s.manager.session_secret().is_none());

    // A disposed manager builds a brand new session on demand.
    s.manager.ensure_session().await.unwrap();
    assert_eq!(s.sandbox.sessions_created(), 2);
}

#[tokio::test]
async fn test_changed_secret_rebinds_session() {
    let mut s = setup().await;
    let address = s.manager.address_element(None).await.unwrap();
    assert_eq!(s.manager.session_secret(), Some(&ClientSecret::from("sk_test_1")));
    assert_eq!(s.manager.generation(), 1);

    let cart = s.cart.current_cart().await.unwrap();
    s.cart.set_cart(cart.with_client_secret("sk_test_2")).await;

    let rebound = s.manager.address_element(None).await.unwrap();
    assert!(!Arc::ptr_eq(&address, &rebound));
    assert_eq!(s.manager.session_secret(), Some(&ClientSecret::from("sk_test_2")));
    assert_eq!(s.manager.generation(), 2);
    assert_eq!(s.sandbox.sessions_created(), 2);
    // The secret was already on the cart, no extra backend call.
    assert_eq!(s.backend.requests(), 1);
}

#[tokio::test]
async fn test_refresh_with_same_secret_keeps_session() {
    let mut s = setup().await;
    let payment = s.manager.payment_element().await.unwrap();

    s.manager.refresh_payment_intent().await.unwrap();

    assert!(Arc::ptr_eq(&payment, &s.manager.payment_element().await.unwrap()));
    assert_eq!(s.sandbox.sessions_created(), 1);
    assert_eq!(s.backend.requests(), 2);
    assert_eq!(s.manager.generation(), 1);
}

#[tokio::test]
async fn test_token_request_reports_incomplete_elements() {
    let mut s = setup().await;
    s.manager.payment_element().await.unwrap();

    let result = s.manager.request_confirmation_token().await;

    match result {
        Err(CheckoutError::ValidationIncomplete(message)) => {
            assert_eq!(message, "Your payment details are incomplete.")
        }
        other => panic!("expected incomplete validation, got {other:?}"),
    }
    assert_eq!(s.sandbox.token_requests(), 0);
}

#[tokio::test]
async fn test_token_then_confirmation() {
    let mut s = setup().await;
    s.manager.payment_element().await.unwrap();
    s.sandbox.element(ElementKind::Payment).unwrap().emit_change(true);

    let token = match s.manager.request_confirmation_token().await.unwrap() {
        TokenOutcome::Issued(token) => token,
        TokenOutcome::Rejected(error) => panic!("token rejected: {error}"),
    };

    let outcome = s.manager.confirm_payment(&token).await.unwrap();
    assert!(matches!(outcome, PaymentOutcome::Succeeded(ref intent) if intent.id == "sk_test_1"));
    assert_eq!(s.sandbox.confirmations()[0].confirmation_token, token.id);
}

#[tokio::test]
async fn test_declined_confirmation_is_a_value() {
    let mut s = setup().await;
    s.manager.payment_element().await.unwrap();
    s.sandbox.element(ElementKind::Payment).unwrap().emit_change(true);
    s.sandbox.decline_with("card_declined");

    let outcome = s
        .manager
        .confirm_payment(&ConfirmationToken::new("ctoken_manual"))
        .await
        .unwrap();

    match outcome {
        PaymentOutcome::Failed(error) => {
            assert_eq!(error.message.as_deref(), Some("card_declined"))
        }
        other => panic!("expected a decline, got {other:?}"),
    }
}
