use crate::error::CheckoutError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Position in the linear checkout flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStep {
    #[default]
    Address,
    Delivery,
    Payment,
    Review,
}

impl CheckoutStep {
    pub const ALL: [CheckoutStep; 4] = [
        CheckoutStep::Address,
        CheckoutStep::Delivery,
        CheckoutStep::Payment,
        CheckoutStep::Review,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// One step back, staying on `Address` at the start of the flow.
    pub fn previous(self) -> Self {
        Self::ALL[self.index().saturating_sub(1)]
    }
}

impl TryFrom<usize> for CheckoutStep {
    type Error = CheckoutError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(CheckoutError::InvalidStep(index))
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckoutStep::Address => "address",
            CheckoutStep::Delivery => "delivery",
            CheckoutStep::Payment => "payment",
            CheckoutStep::Review => "review",
        };
        f.write_str(name)
    }
}

/// Readiness of each checkout concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompletionStatus {
    pub address: bool,
    pub card: bool,
    pub delivery: bool,
}

impl CompletionStatus {
    pub fn is_complete(&self) -> bool {
        self.address && self.card && self.delivery
    }
}

/// Completion flags plus the number of payment-element changes seen so far.
///
/// The revision lets a holder of a confirmation token tell whether the card
/// details changed after the token was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionState {
    pub status: CompletionStatus,
    pub card_revision: u64,
}

/// Shared handle over the completion flags.
///
/// Element change listeners hold clones of the tracker; each setter is a pure
/// update of one flag and never touches any other checkout state.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    state: Arc<watch::Sender<CompletionState>>,
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CompletionState::default());
        Self {
            state: Arc::new(state),
        }
    }

    pub fn set_address(&self, complete: bool) {
        self.state.send_modify(|state| state.status.address = complete);
    }

    pub fn set_card(&self, complete: bool) {
        self.state.send_modify(|state| {
            state.status.card = complete;
            state.card_revision += 1;
        });
    }

    pub fn set_delivery(&self, complete: bool) {
        self.state.send_modify(|state| state.status.delivery = complete);
    }

    /// Clears every flag. The card revision still moves forward.
    pub fn reset(&self) {
        self.state.send_modify(|state| {
            state.status = CompletionStatus::default();
            state.card_revision += 1;
        });
    }

    pub fn snapshot(&self) -> CompletionState {
        *self.state.borrow()
    }

    pub fn status(&self) -> CompletionStatus {
        self.snapshot().status
    }

    pub fn subscribe(&self) -> watch::Receiver<CompletionState> {
        self.state.subscribe()
    }
}
