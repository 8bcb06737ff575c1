//! Domain layer: checkout data and the contracts of every collaborator.

pub mod address;
pub mod cart;
pub mod checkout;
pub mod payment;
pub mod ports;
