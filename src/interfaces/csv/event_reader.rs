use crate::error::{CheckoutError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum EventType {
    Address,
    Card,
    Delivery,
    SaveAddress,
    Step,
    Submit,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    event: EventType,
    value: Option<String>,
}

/// One user interaction with the checkout page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutEvent {
    AddressChanged(bool),
    CardChanged(bool),
    DeliverySelected(bool),
    SaveAddress(bool),
    Step(usize),
    Submit,
}

impl EventRecord {
    fn into_event(self) -> Result<CheckoutEvent> {
        let value = self.value.as_deref().unwrap_or_default();
        let flag = || {
            value.parse::<bool>().map_err(|_| {
                CheckoutError::InvalidEvent(format!("expected true/false, got {value:?}"))
            })
        };

        Ok(match self.event {
            EventType::Address => CheckoutEvent::AddressChanged(flag()?),
            EventType::Card => CheckoutEvent::CardChanged(flag()?),
            EventType::Delivery => CheckoutEvent::DeliverySelected(flag()?),
            EventType::SaveAddress => CheckoutEvent::SaveAddress(flag()?),
            EventType::Step => CheckoutEvent::Step(value.parse().map_err(|_| {
                CheckoutError::InvalidEvent(format!("expected a step index, got {value:?}"))
            })?),
            EventType::Submit => CheckoutEvent::Submit,
        })
    }
}

/// Reads a checkout event script from a CSV source.
///
/// Columns are `event, value`; whitespace is trimmed and the value may be
/// omitted for events that take none.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily parses events; a malformed row yields an error without ending
    /// the stream.
    pub fn events(self) -> impl Iterator<Item = Result<CheckoutEvent>> {
        self.reader
            .into_deserialize::<EventRecord>()
            .map(|result| result.map_err(CheckoutError::from).and_then(EventRecord::into_event))
    }
}
