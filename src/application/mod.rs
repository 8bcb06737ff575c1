//! Application layer containing the checkout orchestration.
//!
//! `PaymentSessionManager` owns the provider session and its elements;
//! `CheckoutFlow` drives the step state machine on top of it and is the only
//! place that confirms payments.

pub mod flow;
pub mod session;
