// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! SR111 Library
//!
//! This library provides the protocol engine for the SR111 millimeter-wave
//! radar on a CAN bus: decoding its target and status frames, supervising
//! the bus connection, aggregating targets for display and encoding radar
//! configuration commands.
//!
//! # Features
//!
//! - **CAN Interface** - Receive and transmit frames via SocketCAN
//! - **Frame Codec** - Target and status frame decoding
//! - **Bus Session** - Receive loop with connection state and liveness
//! - **Scan Aggregation** - Per-tick snapshots, tracks and alarm zones
//! - **Configuration** - Radar parameter commands and saved profiles
//!
//! # Binaries
//!
//! - `sr111mon` - Monitor a radar and report targets and alarms
//! - `sr111ctl` - Configure a radar from the command line

#![warn(missing_docs)]

/// CAN bus access and raw packets
pub mod can;

/// Target and status frame decoding
pub mod codec;

/// Common types and utilities
pub mod common;

/// Radar configuration commands and saved profiles
pub mod config;

/// Bounded log of raw frames
pub mod rawlog;

/// Target aggregation, tracks and alarm zones
pub mod scan;

/// Bus session worker and connection state
pub mod session;
