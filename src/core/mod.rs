//! Core module containing the harness machinery
//!
//! This module provides:
//! - Transport layer for the link to the target (Serial, TCP)
//! - Connector with retry and settle delay
//! - Line collector for the target's output
//! - Session runner driving reset, upload, invoke and completion
//! - Test corpus and suite listing
//! - Run events and suite reports
//! - Wire transcript logging
//! - Virtual target for hardware-free runs

pub mod collector;
pub mod connector;
pub mod corpus;
pub mod logger;
pub mod report;
pub mod session;
pub mod simulator;
pub mod transport;
