// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams for the driver, the client interface, and the transaction orchestrator.
//!
//! All async traits use `#[async_trait]` so they can be held as trait objects.

pub mod client;
pub mod connection;
pub mod transaction;

pub use client::{StorageClient, StorageClientFactory};
pub use connection::{ConnectionSource, PhysicalConnection, PoolConnector};
pub use transaction::{TransactionOrchestrator, TransactionService};
