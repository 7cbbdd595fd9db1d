//! XPOR relay: watches an inbox for spreadsheet reports and mails back
//! the derived figure.

pub mod config;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod mail;
pub mod scanner;
pub mod scheduler;
pub mod sheet;
pub mod storage;
