//! In-process payment provider.
//!
//! `SandboxProvider` behaves like the hosted SDK closely enough to drive a
//! whole checkout without network access: sessions hand out elements that can
//! be filled in programmatically, `submit` validates that every element is
//! complete, and confirmation succeeds unless a decline has been scripted.

use crate::domain::cart::ClientSecret;
use crate::domain::payment::{
    ConfirmPaymentParams, ConfirmationToken, ElementChange, ElementKind, ElementOptions,
    ElementsOptions, PaymentIntent, PaymentIntentStatus, ProviderAddress, ProviderError,
};
use crate::domain::ports::{
    ChangeListener, Element, ElementsSession, PaymentProvider, ProviderLoader,
};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct SandboxState {
    sessions: Mutex<Vec<Arc<SandboxSession>>>,
    element_failures: AtomicUsize,
    session_failures: AtomicUsize,
    submit_error: Mutex<Option<ProviderError>>,
    token_error: Mutex<Option<ProviderError>>,
    decline: Mutex<Option<ProviderError>>,
    token_requests: AtomicUsize,
    confirmations: Mutex<Vec<ConfirmPaymentParams>>,
}

#[derive(Default, Clone)]
pub struct SandboxProvider {
    state: Arc<SandboxState>,
}

impl SandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following confirmation is declined with `message`.
    pub fn decline_with(&self, message: impl Into<String>) {
        *lock(&self.state.decline) = Some(ProviderError {
            message: Some(message.into()),
            code: Some("card_declined".to_string()),
            decline_code: Some("generic_decline".to_string()),
        });
    }

    /// Every following `submit` reports `message`, whatever the elements hold.
    pub fn fail_submit_with(&self, message: impl Into<String>) {
        *lock(&self.state.submit_error) = Some(ProviderError::new(message));
    }

    pub fn reject_tokens_with(&self, message: impl Into<String>) {
        *lock(&self.state.token_error) = Some(ProviderError::new(message));
    }

    /// The next `count` element creations raise an error.
    pub fn fail_next_element_creations(&self, count: usize) {
        self.state.element_failures.store(count, Ordering::SeqCst);
    }

    /// The next `count` session creations raise an error.
    pub fn fail_next_sessions(&self, count: usize) {
        self.state.session_failures.store(count, Ordering::SeqCst);
    }

    pub fn sessions_created(&self) -> usize {
        lock(&self.state.sessions).len()
    }

    pub fn latest_session(&self) -> Option<Arc<SandboxSession>> {
        lock(&self.state.sessions).last().cloned()
    }

    /// Element of the given kind in the most recent session.
    pub fn element(&self, kind: ElementKind) -> Option<Arc<SandboxElement>> {
        self.latest_session()?.element(kind)
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    pub fn confirmations(&self) -> Vec<ConfirmPaymentParams> {
        lock(&self.state.confirmations).clone()
    }
}

#[async_trait]
impl ProviderLoader for SandboxProvider {
    async fn load(&self, _publishable_key: &str) -> Option<Arc<dyn PaymentProvider>> {
        Some(Arc::new(self.clone()))
    }
}

#[async_trait]
impl PaymentProvider for SandboxProvider {
    async fn elements(&self, options: ElementsOptions) -> Result<Arc<dyn ElementsSession>> {
        let pending_failures = self.state.session_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.state
                .session_failures
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(CheckoutError::Provider(
                "could not create payment session".to_string(),
            ));
        }

        debug!(secret = %options.client_secret, "sandbox session created");
        let session = Arc::new(SandboxSession {
            secret: options.client_secret,
            elements: Mutex::new(Vec::new()),
            state: Arc::clone(&self.state),
        });
        lock(&self.state.sessions).push(Arc::clone(&session));
        Ok(session)
    }

    async fn create_confirmation_token(
        &self,
        _elements: &Arc<dyn ElementsSession>,
    ) -> Result<std::result::Result<ConfirmationToken, ProviderError>> {
        let request = self.state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = lock(&self.state.token_error).clone() {
            return Ok(Err(error));
        }
        Ok(Ok(ConfirmationToken::new(format!("ctoken_sandbox_{request}"))))
    }

    async fn confirm_payment(
        &self,
        params: ConfirmPaymentParams,
    ) -> Result<std::result::Result<PaymentIntent, ProviderError>> {
        let intent_id = params
            .client_secret
            .as_str()
            .split("_secret")
            .next()
            .unwrap_or_default()
            .to_string();
        lock(&self.state.confirmations).push(params);

        if let Some(error) = lock(&self.state.decline).clone() {
            return Ok(Err(error));
        }
        Ok(Ok(PaymentIntent {
            id: intent_id,
            status: PaymentIntentStatus::Succeeded,
        }))
    }
}

/// Loader for an SDK that never came up.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLoader;

#[async_trait]
impl ProviderLoader for UnavailableLoader {
    async fn load(&self, _publishable_key: &str) -> Option<Arc<dyn PaymentProvider>> {
        None
    }
}

pub struct SandboxSession {
    secret: ClientSecret,
    elements: Mutex<Vec<Arc<SandboxElement>>>,
    state: Arc<SandboxState>,
}

impl SandboxSession {
    pub fn secret(&self) -> &ClientSecret {
        &self.secret
    }

    pub fn element(&self, kind: ElementKind) -> Option<Arc<SandboxElement>> {
        lock(&self.elements)
            .iter()
            .rev()
            .find(|element| element.kind == kind)
            .cloned()
    }

    pub fn elements_created(&self) -> usize {
        lock(&self.elements).len()
    }
}

#[async_trait]
impl ElementsSession for SandboxSession {
    async fn create(&self, options: ElementOptions) -> Result<Arc<dyn Element>> {
        let pending_failures = self.state.element_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.state
                .element_failures
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(CheckoutError::Provider(format!(
                "could not create {} element",
                options.kind()
            )));
        }

        let element = Arc::new(SandboxElement::new(options));
        lock(&self.elements).push(Arc::clone(&element));
        Ok(element)
    }

    async fn submit(&self) -> std::result::Result<(), ProviderError> {
        if let Some(error) = lock(&self.state.submit_error).clone() {
            return Err(error);
        }
        match lock(&self.elements).iter().find(|element| !element.is_complete()) {
            Some(element) => Err(ProviderError::new(format!(
                "Your {} details are incomplete.",
                element.kind
            ))),
            None => Ok(()),
        }
    }
}

pub struct SandboxElement {
    kind: ElementKind,
    options: ElementOptions,
    mounted_at: Mutex<Option<String>>,
    listeners: Mutex<Vec<ChangeListener>>,
    complete: AtomicBool,
    value: Mutex<Option<ProviderAddress>>,
}

impl SandboxElement {
    fn new(options: ElementOptions) -> Self {
        let value = match &options {
            ElementOptions::Address(address) => address.default_values.address.clone(),
            ElementOptions::Payment => None,
        };
        Self {
            kind: options.kind(),
            options,
            mounted_at: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            complete: AtomicBool::new(false),
            value: Mutex::new(value),
        }
    }

    pub fn options(&self) -> &ElementOptions {
        &self.options
    }

    pub fn mounted_at(&self) -> Option<String> {
        lock(&self.mounted_at).clone()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    pub fn set_address(&self, address: ProviderAddress) {
        *lock(&self.value) = Some(address);
    }

    /// Simulates the shopper editing the element.
    pub fn emit_change(&self, complete: bool) {
        self.complete.store(complete, Ordering::SeqCst);
        let change = ElementChange {
            kind: self.kind,
            complete,
            empty: !complete && lock(&self.value).is_none(),
        };
        for listener in lock(&self.listeners).iter() {
            listener(&change);
        }
    }
}

#[async_trait]
impl Element for SandboxElement {
    fn kind(&self) -> ElementKind {
        self.kind
    }

    fn mount(&self, selector: &str) -> Result<()> {
        if selector.is_empty() {
            return Err(CheckoutError::Provider(format!(
                "no mount target for {} element",
                self.kind
            )));
        }
        *lock(&self.mounted_at) = Some(selector.to_string());
        Ok(())
    }

    fn on_change(&self, listener: ChangeListener) {
        lock(&self.listeners).push(listener);
    }

    async fn address_value(&self) -> Result<Option<ProviderAddress>> {
        match self.kind {
            ElementKind::Address => Ok(lock(&self.value).clone()),
            ElementKind::Payment => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Appearance;

    async fn session(provider: &SandboxProvider) -> Arc<dyn ElementsSession> {
        provider
            .elements(ElementsOptions {
                client_secret: ClientSecret::from("pi_1_secret_x"),
                appearance: Appearance::default(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_requires_complete_elements() {
        let provider = SandboxProvider::new();
        let session = session(&provider).await;
        session.create(ElementOptions::Payment).await.unwrap();

        let error = session.submit().await.unwrap_err();
        assert_eq!(
            error.message.as_deref(),
            Some("Your payment details are incomplete.")
        );

        provider
            .element(ElementKind::Payment)
            .unwrap()
            .emit_change(true);
        assert!(session.submit().await.is_ok());
    }

    #[tokio::test]
    async fn test_listeners_receive_changes() {
        let provider = SandboxProvider::new();
        let session = session(&provider).await;
        let element = session.create(ElementOptions::Payment).await.unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        element.on_change(Box::new(move |change| {
            assert_eq!(change.kind, ElementKind::Payment);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let sandbox_element = provider.element(ElementKind::Payment).unwrap();
        sandbox_element.emit_change(false);
        sandbox_element.emit_change(true);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scripted_element_failure_is_consumed() {
        let provider = SandboxProvider::new();
        let session = session(&provider).await;
        provider.fail_next_element_creations(1);

        assert!(session.create(ElementOptions::Payment).await.is_err());
        assert!(session.create(ElementOptions::Payment).await.is_ok());
    }

    #[tokio::test]
    async fn test_decline() {
        let provider = SandboxProvider::new();
        provider.decline_with("card_declined");

        let result = provider
            .confirm_payment(ConfirmPaymentParams {
                client_secret: ClientSecret::from("pi_9_secret_y"),
                confirmation_token: "ctoken".to_string(),
                redirect: Default::default(),
            })
            .await
            .unwrap();

        assert_eq!(result.unwrap_err().message.as_deref(), Some("card_declined"));
        assert_eq!(provider.confirmations().len(), 1);
    }
}
