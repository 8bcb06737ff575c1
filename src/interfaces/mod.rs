//! Driving adapters: the CSV event script and summary used by the CLI.

pub mod csv;
