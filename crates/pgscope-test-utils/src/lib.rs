// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for pgscope.
//!
//! Provides a scripted, in-memory stand-in for the database driver so the
//! registry, handles, and lifecycle adapter can be tested without a server.
//!
//! # Components
//!
//! - [`MockPool`] - connection source with scripted rows, failure injection,
//!   notices, and a journal of every executed statement
//! - [`MockConnection`] - the physical connection handed out by [`MockPool`]
//! - [`MockConnector`] - pool connector that counts how often a pool is built

pub mod mock_pool;

pub use mock_pool::{row, Executed, MockConnection, MockConnector, MockDbError, MockPool};
