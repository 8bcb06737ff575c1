use super::session::PaymentSessionManager;
use crate::config::CheckoutConfig;
use crate::domain::address::Address;
use crate::domain::checkout::{CheckoutStep, CompletionTracker};
use crate::domain::payment::{
    AddressDefaults, ConfirmationToken, PaymentIntent, PaymentOutcome, ProviderAddress,
    TokenOutcome,
};
use crate::domain::ports::{
    AccountServiceRef, CartServiceRef, CheckoutViewRef, Element, NotifierRef, PaymentBackendRef,
    ProviderLoaderRef,
};
use crate::error::{CheckoutError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

pub const STALE_TOKEN_MESSAGE: &str = "Payment details changed, please review your order again";

/// External collaborators a checkout runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub loader: ProviderLoaderRef,
    pub backend: PaymentBackendRef,
    pub cart: CartServiceRef,
    pub account: AccountServiceRef,
    pub notifier: NotifierRef,
    pub view: CheckoutViewRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing to confirm.
    Skipped,
    /// The stored token predates a change of the card details.
    Invalidated,
    Completed,
    Failed,
}

struct IssuedToken {
    token: ConfirmationToken,
    card_revision: u64,
}

/// Raises the loading flag for as long as it is alive.
struct LoadingGuard(Arc<AtomicBool>);

impl LoadingGuard {
    fn engage(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(Arc::clone(flag))
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives one checkout attempt through address, delivery, payment and review.
///
/// The controller reacts to the step the stepper wants to enter, runs that
/// step's side effect, and only then records the step as current. Every
/// failure ends up as a single message on the notifier.
pub struct CheckoutFlow {
    sessions: PaymentSessionManager,
    cart: CartServiceRef,
    account: AccountServiceRef,
    notifier: NotifierRef,
    view: CheckoutViewRef,
    config: CheckoutConfig,
    step: CheckoutStep,
    completion: CompletionTracker,
    confirmation: Option<IssuedToken>,
    loading: Arc<AtomicBool>,
    save_address: bool,
    address_element: Option<Arc<dyn Element>>,
    payment_element: Option<Arc<dyn Element>>,
    /// Session generation the held elements were created in.
    mounted_generation: u64,
    completed: bool,
}

impl CheckoutFlow {
    pub fn new(collaborators: Collaborators, config: CheckoutConfig) -> Self {
        let Collaborators {
            loader,
            backend,
            cart,
            account,
            notifier,
            view,
        } = collaborators;

        Self {
            sessions: PaymentSessionManager::new(
                loader,
                backend,
                Arc::clone(&cart),
                config.clone(),
            ),
            cart,
            account,
            notifier,
            view,
            config,
            step: CheckoutStep::default(),
            completion: CompletionTracker::new(),
            confirmation: None,
            loading: Arc::new(AtomicBool::new(false)),
            save_address: false,
            address_element: None,
            payment_element: None,
            mounted_generation: 0,
            completed: false,
        }
    }

    pub fn step(&self) -> CheckoutStep {
        self.step
    }

    pub fn completion(&self) -> &CompletionTracker {
        &self.completion
    }

    pub fn sessions(&self) -> &PaymentSessionManager {
        &self.sessions
    }

    pub fn confirmation_token(&self) -> Option<&ConfirmationToken> {
        self.confirmation.as_ref().map(|issued| &issued.token)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Shared view of the loading flag, for disabling the submit button.
    pub fn loading_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.loading)
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn set_save_address(&mut self, save: bool) {
        self.save_address = save;
    }

    /// Delivery sub-step reported whether a delivery method is selected.
    pub fn on_delivery_selected(&self, selected: bool) {
        self.completion.set_delivery(selected);
    }

    /// Creates, mounts and subscribes to both embedded elements.
    pub async fn start(&mut self) {
        if let Err(error) = self.mount_elements().await {
            self.report(&error);
        }
    }

    async fn mount_elements(&mut self) -> Result<()> {
        let defaults = self.address_defaults().await;
        let address = self.sessions.address_element(Some(defaults)).await?;
        if !is_same(&self.address_element, &address) {
            address.mount(&self.config.address_selector)?;
            let completion = self.completion.clone();
            address.on_change(Box::new(move |change| completion.set_address(change.complete)));
            self.address_element = Some(address);
        }

        let payment = self.sessions.payment_element().await?;
        if !is_same(&self.payment_element, &payment) {
            payment.mount(&self.config.payment_selector)?;
            let completion = self.completion.clone();
            payment.on_change(Box::new(move |change| completion.set_card(change.complete)));
            self.payment_element = Some(payment);
        }

        self.mounted_generation = self.sessions.generation();
        Ok(())
    }

    /// Whether the held elements belong to a session the manager has since
    /// replaced.
    fn rebound(&self) -> bool {
        let holds_elements = self.address_element.is_some() || self.payment_element.is_some();
        holds_elements && self.sessions.generation() != self.mounted_generation
    }

    async fn follow_rebind(&mut self) {
        if self.rebound() {
            self.remount_elements().await;
        }
    }

    async fn address_defaults(&self) -> AddressDefaults {
        match self.account.current_user().await {
            Some(user) => AddressDefaults {
                name: Some(user.full_name()),
                address: user.address.as_ref().map(ProviderAddress::from),
            },
            None => AddressDefaults::default(),
        }
    }

    /// Runs the side effect of entering `index` and returns the step the
    /// controller considers current afterwards.
    pub async fn on_step_change(&mut self, index: usize) -> CheckoutStep {
        if self.completed {
            warn!(index, "checkout already completed, ignoring step change");
            return self.step;
        }
        let target = match CheckoutStep::try_from(index) {
            Ok(target) => target,
            Err(error) => {
                warn!(%error, "ignoring step change");
                return self.step;
            }
        };
        if target.index() > self.step.index() + 1 {
            warn!(from = %self.step, to = %target, "steps cannot be skipped");
            return self.step;
        }

        match target {
            CheckoutStep::Address => {}
            CheckoutStep::Delivery => self.persist_address().await,
            CheckoutStep::Payment => self.refresh_payment_intent().await,
            CheckoutStep::Review => self.prepare_confirmation().await,
        }

        self.step = target;
        info!(step = %target, "entered checkout step");
        self.step
    }

    /// Saves the entered address in the background. The transition does not
    /// wait for the account service, which reports its own failures.
    async fn persist_address(&self) {
        if !self.save_address {
            return;
        }
        let Some(element) = &self.address_element else {
            debug!("no address element to read from");
            return;
        };

        let value = match element.address_value().await {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(error) => {
                warn!(%error, "could not read the entered address");
                return;
            }
        };

        let account = Arc::clone(&self.account);
        let address = Address::from(value);
        tokio::spawn(async move {
            if let Err(error) = account.update_address(address).await {
                warn!(%error, "saving the address failed");
            }
        });
    }

    async fn refresh_payment_intent(&mut self) {
        // Whatever was confirmed before no longer reflects the payment step.
        self.confirmation = None;

        match self.sessions.refresh_payment_intent().await {
            Ok(cart) => debug!(cart_id = %cart.id, "payment intent refreshed"),
            Err(error) => self.report(&error),
        }
        self.follow_rebind().await;
    }

    /// The session was rebound and the old elements went with it. Their
    /// completion flags are reset until the new elements report.
    async fn remount_elements(&mut self) {
        info!("payment session rebound, mounting new elements");
        self.address_element = None;
        self.payment_element = None;
        self.completion.set_address(false);
        self.completion.set_card(false);
        if let Err(error) = self.mount_elements().await {
            self.report(&error);
        }
    }

    async fn prepare_confirmation(&mut self) {
        self.confirmation = None;

        // The cart may have moved to another secret since the elements were mounted.
        if (self.address_element.is_some() || self.payment_element.is_some())
            && let Err(error) = self.sessions.ensure_session().await
        {
            self.report(&error);
            return;
        }
        self.follow_rebind().await;

        let state = self.completion.snapshot();
        if !state.status.is_complete() {
            debug!(status = ?state.status, "checkout incomplete, no confirmation token requested");
            return;
        }

        match self.sessions.request_confirmation_token().await {
            Ok(TokenOutcome::Issued(token)) => {
                info!(token = %token.id, "confirmation token issued");
                self.confirmation = Some(IssuedToken {
                    token,
                    card_revision: state.card_revision,
                });
            }
            Ok(TokenOutcome::Rejected(error)) => {
                self.notify(error.message_or(&self.config.fallback_error));
            }
            Err(error) => self.report(&error),
        }
    }

    /// Confirms the payment with the stored confirmation token.
    ///
    /// The loading flag is raised for the duration of the call and lowered on
    /// every way out, including the future being dropped.
    pub async fn submit(&mut self) -> SubmitOutcome {
        if self.completed {
            return SubmitOutcome::Skipped;
        }
        let Some(issued) = self.confirmation.take() else {
            debug!("no confirmation token, nothing to submit");
            return SubmitOutcome::Skipped;
        };
        if issued.card_revision != self.completion.snapshot().card_revision {
            warn!("card details changed after the confirmation token was issued");
            self.notify(STALE_TOKEN_MESSAGE);
            return SubmitOutcome::Invalidated;
        }

        let _loading = LoadingGuard::engage(&self.loading);
        let confirmed = match self.sessions.ensure_session().await {
            Ok(_) if self.rebound() => {
                warn!("payment session changed after the confirmation token was issued");
                self.remount_elements().await;
                self.notify(STALE_TOKEN_MESSAGE);
                return SubmitOutcome::Invalidated;
            }
            Ok(_) => self.confirm(&issued.token).await,
            Err(error) => Err(error),
        };

        match confirmed {
            Ok(intent) => {
                info!(intent = %intent.id, "payment confirmed");
                self.complete_order().await;
                SubmitOutcome::Completed
            }
            Err(error) => {
                warn!(%error, "payment confirmation failed");
                let message = self.message_for(&error);
                self.revert(&message);
                SubmitOutcome::Failed
            }
        }
    }

    async fn confirm(&mut self, token: &ConfirmationToken) -> Result<PaymentIntent> {
        match self.sessions.confirm_payment(token).await? {
            PaymentOutcome::Succeeded(intent) => Ok(intent),
            PaymentOutcome::Failed(error) => Err(CheckoutError::ProviderConfirmation(
                error.message_or(&self.config.fallback_error).to_string(),
            )),
        }
    }

    async fn complete_order(&mut self) {
        if let Err(error) = self.cart.delete_cart().await {
            warn!(%error, "payment succeeded but the cart could not be deleted");
        }
        self.cart.set_selected_delivery(None).await;
        self.completed = true;
        self.view.navigate(&self.config.success_route);
    }

    fn revert(&mut self, message: &str) {
        self.notify(message);
        self.step = self.step.previous();
        self.view.previous_step();
    }

    /// Releases the payment session and forgets the progress of this
    /// attempt. Called when the checkout is discarded.
    pub fn teardown(&mut self) {
        self.sessions.dispose();
        self.address_element = None;
        self.payment_element = None;
        self.confirmation = None;
        self.completion.reset();
        self.step = CheckoutStep::default();
        self.completed = false;
        debug!("checkout torn down");
    }

    fn message_for(&self, error: &CheckoutError) -> String {
        let message = error.to_string();
        if message.is_empty() {
            self.config.fallback_error.clone()
        } else {
            message
        }
    }

    fn report(&self, error: &CheckoutError) {
        self.notify(&self.message_for(error));
    }

    fn notify(&self, message: &str) {
        self.notifier.error(message);
    }
}

fn is_same(held: &Option<Arc<dyn Element>>, element: &Arc<dyn Element>) -> bool {
    held.as_ref().is_some_and(|held| Arc::ptr_eq(held, element))
}
