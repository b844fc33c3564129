//! Application layer orchestrating the verification-fee payment flow.
//!
//! `PaymentFlow` composes the `PaymentInitiator` (one STK push per user action)
//! and the `StatusPoller` (bounded, cancellable status checks) around a single
//! session value published through a `tokio::sync::watch` channel. The admin
//! `Dashboard` lives here too since it derives totals from fetched records.

pub mod dashboard;
pub mod flow;
pub mod initiator;
pub mod poller;
pub mod schedule;
