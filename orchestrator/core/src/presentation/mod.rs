// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`conduit-core`)
//!
//! HTTP surface that translates external requests into engine calls. No
//! business logic lives here; all real work is delegated to application
//! services in `crate::application`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Trigger endpoints, agent health and graph editing |

pub mod api;
