use crate::domain::payment::{Appearance, RedirectBehavior};

pub const DEFAULT_SUCCESS_ROUTE: &str = "/checkout/success";
pub const DEFAULT_FALLBACK_ERROR: &str = "Something went wrong";

/// Settings shared by the session manager and the flow controller.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutConfig {
    pub publishable_key: String,
    pub api_url: String,
    pub success_route: String,
    /// Shown when a failure carries no message of its own.
    pub fallback_error: String,
    pub address_selector: String,
    pub payment_selector: String,
    pub appearance: Appearance,
    pub redirect: RedirectBehavior,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            publishable_key: String::new(),
            api_url: "https://localhost:5001/api/".to_string(),
            success_route: DEFAULT_SUCCESS_ROUTE.to_string(),
            fallback_error: DEFAULT_FALLBACK_ERROR.to_string(),
            address_selector: "#address-element".to_string(),
            payment_selector: "#payment-element".to_string(),
            appearance: Appearance::default(),
            redirect: RedirectBehavior::IfRequired,
        }
    }
}

impl CheckoutConfig {
    pub fn with_publishable_key(mut self, key: impl Into<String>) -> Self {
        self.publishable_key = key.into();
        self
    }

    /// Sets the API base url, keeping the trailing slash that endpoint paths
    /// are appended to.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.api_url = url;
        self
    }

    pub fn payments_endpoint(&self, cart_id: &str) -> String {
        format!("{}payments/{}", self.api_url, cart_id)
    }
}
