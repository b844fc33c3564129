//! CSV output for the command line surface.

pub mod record_writer;
