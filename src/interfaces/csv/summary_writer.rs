use crate::application::flow::CheckoutFlow;
use crate::domain::checkout::CheckoutStep;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Final state of a checkout run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSummary {
    pub step: CheckoutStep,
    pub completed: bool,
    pub loading: bool,
    pub token: bool,
    pub errors: usize,
    pub destination: Option<String>,
}

impl CheckoutSummary {
    pub fn from_flow(flow: &CheckoutFlow, errors: usize, destination: Option<String>) -> Self {
        Self {
            step: flow.step(),
            completed: flow.is_completed(),
            loading: flow.is_loading(),
            token: flow.confirmation_token().is_some(),
            errors,
            destination,
        }
    }
}

pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_summary(&mut self, summary: &CheckoutSummary) -> Result<()> {
        self.writer.serialize(summary)?;
        self.writer.flush()?;
        Ok(())
    }
}
