// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use sr111::{
    codec::FrameIds,
    rawlog::parse_id,
    session::SessionSettings,
};
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// can device connected to radar
    #[arg(long, env, default_value = "can0")]
    pub can: String,

    /// Bounded wait of each bus poll in milliseconds.
    #[arg(long, env, default_value = "100")]
    pub poll_timeout: u64,

    /// Empty polls between liveness checks.
    #[arg(long, env, default_value = "50")]
    pub check_cycles: u32,

    /// Seconds of silence tolerated before a liveness check warns.
    #[arg(long, env, default_value = "5")]
    pub no_data_window: u64,

    /// CAN id of radar status frames (hex).
    #[arg(long, env, default_value = "201", value_parser = parse_id)]
    pub status_id: u32,

    /// CAN ids of radar target frames (hex).
    #[arg(
        long,
        env,
        default_value = "60A 60B",
        value_delimiter = ' ',
        num_args = 2,
        value_parser = parse_id
    )]
    pub target_ids: Vec<u32>,

    /// Display refresh period in milliseconds.
    #[arg(long, env, default_value = "50")]
    pub refresh: u64,

    /// Points of history kept per target track.
    #[arg(long, env, default_value = "50", value_parser = clap::value_parser!(u64).range(1..))]
    pub track_length: u64,

    /// Include target tracks in the periodic report.
    #[arg(long, env)]
    pub tracks: bool,

    /// Only report targets within this many meters.
    #[arg(long, env)]
    pub range_filter: Option<f64>,

    /// Profile with radar settings and alarm zones (JSON).
    #[arg(long, env)]
    pub profile: Option<PathBuf>,

    /// Send the profile's radar settings once the bus is open.
    #[arg(long, env, requires = "profile")]
    pub apply: bool,

    /// Add the default 20 m by 10 m alarm zone around the sensor.
    #[arg(long, env)]
    pub default_zone: bool,

    /// Save the active settings and alarm zones to this profile on exit.
    #[arg(long, env)]
    pub save_profile: Option<PathBuf>,

    /// Only log raw frames with this CAN id (hex).
    #[arg(long, env, value_parser = parse_id)]
    pub raw_filter: Option<u32>,

    /// Write the retained raw frames to this file on exit.
    #[arg(long, env)]
    pub raw_export: Option<PathBuf>,

    /// Run the CAN worker on the real-time FIFO scheduler.
    #[arg(long, env)]
    pub realtime: bool,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,
}

impl From<&Args> for SessionSettings {
    fn from(args: &Args) -> Self {
        let mut ids = FrameIds {
            status: args.status_id,
            ..Default::default()
        };
        if let [a, b] = args.target_ids[..] {
            ids.target = [a, b];
        }

        SessionSettings {
            poll_timeout: Duration::from_millis(args.poll_timeout),
            check_cycles: args.check_cycles,
            no_data_window: Duration::from_secs(args.no_data_window),
            ids,
        }
    }
}
