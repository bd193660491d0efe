//! docgate — mail-driven gateway for a document-processing API.
//!
//! Reads one raw email on stdin, submits every non-text attachment to the
//! remote API, polls each job until it finishes, and mails a CSV report
//! back to the sender via the local relay.

pub mod api;
pub mod config;
pub mod error;
pub mod mail;
pub mod pipeline;
pub mod report;
