//! Domain types for loan offers, application records and payment sessions,
//! plus the ports the application layer talks to.

pub mod loan;
pub mod offer;
pub mod payment;
pub mod ports;
