//! Value types exchanged with the payment provider SDK.

use super::address::Address;
use super::cart::ClientSecret;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Address,
    Payment,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Address => f.write_str("address"),
            ElementKind::Payment => f.write_str("payment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    #[default]
    Floating,
    Above,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Appearance {
    pub labels: LabelStyle,
}

/// Options for building a session context (the provider's "elements" group).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementsOptions {
    pub client_secret: ClientSecret,
    pub appearance: Appearance,
}

/// Address in the provider's wire shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderAddress {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl From<&Address> for ProviderAddress {
    fn from(address: &Address) -> Self {
        Self {
            line1: address.line1.clone(),
            line2: address.line2.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
        }
    }
}

impl From<ProviderAddress> for Address {
    fn from(address: ProviderAddress) -> Self {
        Self {
            line1: address.line1,
            // The provider reports a cleared second line as an empty string.
            line2: address.line2.filter(|line| !line.is_empty()),
            city: address.city,
            state: address.state,
            postal_code: address.postal_code,
            country: address.country,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AddressDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<ProviderAddress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    #[default]
    Shipping,
    Billing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressElementOptions {
    pub mode: AddressMode,
    pub default_values: AddressDefaults,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementOptions {
    Address(AddressElementOptions),
    Payment,
}

impl ElementOptions {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementOptions::Address(_) => ElementKind::Address,
            ElementOptions::Payment => ElementKind::Payment,
        }
    }
}

/// Change notification raised by an embedded element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementChange {
    pub kind: ElementKind,
    pub complete: bool,
    pub empty: bool,
}

/// Error reported by the provider as part of a normal response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderError {
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_code: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// The provider message, or `fallback` when it sent none.
    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message
            .as_deref()
            .filter(|message| !message.is_empty())
            .unwrap_or(fallback)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_or("unknown provider error"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfirmationToken {
    pub id: String,
}

impl ConfirmationToken {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Issued(ConfirmationToken),
    Rejected(ProviderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectBehavior {
    Always,
    #[default]
    IfRequired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmPaymentParams {
    pub client_secret: ClientSecret,
    pub confirmation_token: String,
    pub redirect: RedirectBehavior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    Succeeded,
    Processing,
    RequiresCapture,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentIntentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded(PaymentIntent),
    Failed(ProviderError),
}
