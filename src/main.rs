use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rust_decimal_macros::dec;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use storefront_checkout::application::flow::{CheckoutFlow, Collaborators};
use storefront_checkout::config::CheckoutConfig;
use storefront_checkout::domain::address::{Address, User};
use storefront_checkout::domain::cart::{Cart, CartItem, DeliveryMethod};
use storefront_checkout::domain::payment::ElementKind;
use storefront_checkout::domain::ports::{CartService, PaymentBackendRef};
use storefront_checkout::infrastructure::in_memory::{
    InMemoryAccountService, InMemoryCartService, InMemoryPaymentBackend, RecordingNotifier,
    RecordingView,
};
use storefront_checkout::infrastructure::sandbox::SandboxProvider;
use storefront_checkout::interfaces::csv::event_reader::{CheckoutEvent, EventReader};
use storefront_checkout::interfaces::csv::summary_writer::{CheckoutSummary, SummaryWriter};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Checkout events CSV file
    input: PathBuf,

    /// Identifier of the cart being checked out
    #[arg(long, default_value = "cart-1")]
    cart_id: String,

    /// Make the sandbox provider decline the payment with this message
    #[arg(long)]
    decline: Option<String>,

    /// Storefront API base url (optional). If provided, uses the HTTP payment backend.
    #[arg(long, env = "CHECKOUT_API_URL")]
    api_url: Option<String>,

    /// Publishable key handed to the payment provider
    #[arg(long, env = "CHECKOUT_PUBLISHABLE_KEY", default_value = "pk_test_sandbox")]
    publishable_key: String,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn demo_cart(cart_id: &str) -> Cart {
    Cart::new(cart_id).with_items(vec![
        CartItem {
            product_id: 1,
            product_name: "Core Board Speed Rush 3".to_string(),
            price: dec!(180.00),
            quantity: 1,
            picture_url: "/images/products/sb-core1.png".to_string(),
            brand: "Core".to_string(),
            kind: "Boards".to_string(),
        },
        CartItem {
            product_id: 12,
            product_name: "Purple React Gloves".to_string(),
            price: dec!(25.00),
            quantity: 2,
            picture_url: "/images/products/glove-react1.png".to_string(),
            brand: "React".to_string(),
            kind: "Gloves".to_string(),
        },
    ])
}

fn demo_user() -> User {
    User {
        first_name: "Bob".to_string(),
        last_name: "Bobbity".to_string(),
        email: "bob@test.com".to_string(),
        address: Some(Address {
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
            country: "US".to_string(),
        }),
    }
}

fn standard_delivery() -> DeliveryMethod {
    DeliveryMethod {
        id: 2,
        short_name: "UPS2".to_string(),
        delivery_time: "2-5 Days".to_string(),
        description: "Get it within 5 days".to_string(),
        price: dec!(5),
    }
}

async fn payment_backend(
    cli: &Cli,
    config: &CheckoutConfig,
    cart: &Cart,
) -> Result<PaymentBackendRef> {
    if let Some(_api_url) = &cli.api_url {
        #[cfg(feature = "http-backend")]
        {
            use storefront_checkout::infrastructure::http::HttpPaymentBackend;
            let backend = HttpPaymentBackend::new(config.clone()).into_diagnostic()?;
            return Ok(Arc::new(backend));
        }
        #[cfg(not(feature = "http-backend"))]
        {
            let _ = config;
            warn!(
                "Payment API url given via --api-url, but the 'http-backend' feature is not enabled. Falling back to the in-memory backend."
            );
        }
    }

    let backend = InMemoryPaymentBackend::new();
    backend.insert_cart(cart.clone()).await;
    Ok(Arc::new(backend))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let mut config = CheckoutConfig::default().with_publishable_key(cli.publishable_key.clone());
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url.clone());
    }

    let cart = demo_cart(&cli.cart_id);
    let cart_service = InMemoryCartService::with_cart(cart.clone());
    let sandbox = SandboxProvider::new();
    if let Some(message) = &cli.decline {
        sandbox.decline_with(message.clone());
    }
    let notifier = RecordingNotifier::new();
    let view = RecordingView::new();

    let collaborators = Collaborators {
        loader: Arc::new(sandbox.clone()),
        backend: payment_backend(&cli, &config, &cart).await?,
        cart: Arc::new(cart_service.clone()),
        account: Arc::new(InMemoryAccountService::with_user(demo_user())),
        notifier: Arc::new(notifier.clone()),
        view: Arc::new(view.clone()),
    };
    let mut flow = CheckoutFlow::new(collaborators, config);
    flow.start().await;

    // Replay the scripted interactions
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = EventReader::new(file);
    for event in reader.events() {
        match event {
            Ok(CheckoutEvent::AddressChanged(complete)) => {
                match sandbox.element(ElementKind::Address) {
                    Some(element) => element.emit_change(complete),
                    None => warn!("address element is not mounted"),
                }
            }
            Ok(CheckoutEvent::CardChanged(complete)) => {
                match sandbox.element(ElementKind::Payment) {
                    Some(element) => element.emit_change(complete),
                    None => warn!("payment element is not mounted"),
                }
            }
            Ok(CheckoutEvent::DeliverySelected(selected)) => {
                let method = selected.then(standard_delivery);
                cart_service.set_selected_delivery(method).await;
                flow.on_delivery_selected(selected);
            }
            Ok(CheckoutEvent::SaveAddress(save)) => flow.set_save_address(save),
            Ok(CheckoutEvent::Step(index)) => {
                flow.on_step_change(index).await;
            }
            Ok(CheckoutEvent::Submit) => {
                flow.submit().await;
            }
            Err(e) => {
                error!("Error reading event: {}", e);
            }
        }
    }

    let summary = CheckoutSummary::from_flow(&flow, notifier.messages().len(), view.destination());
    flow.teardown();

    let stdout = io::stdout();
    let mut writer = SummaryWriter::new(stdout.lock());
    writer.write_summary(&summary).into_diagnostic()?;

    Ok(())
}
