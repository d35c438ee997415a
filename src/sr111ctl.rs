// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use log::debug;
use sr111::{
    can::SocketCan,
    config::{MeasurementMode, OutputMode, Parameter, Profile, RadarConfiguration},
    rawlog::{format_line, parse_id},
    session::{self, ConnectionState, Event, SessionSettings},
};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CAN device to use
    #[arg(short, long, default_value = "can0")]
    device: String,

    /// Start from the radar settings saved in this profile.
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Only send this parameter instead of the full configuration.
    #[arg(short, long, value_enum)]
    parameter: Option<Parameter>,

    /// Sensor id
    #[arg(long)]
    sensor_id: Option<u8>,

    /// Detection range in meters (15, 25, 50 or 70)
    #[arg(long)]
    distance_range: Option<u32>,

    /// Angular resolution in degrees (0.4 or 0.2)
    #[arg(long)]
    angle_resolution: Option<f64>,

    /// Measurement mode
    #[arg(long, value_enum)]
    measurement_mode: Option<MeasurementMode>,

    /// Output mode
    #[arg(long, value_enum)]
    output_mode: Option<OutputMode>,

    /// Update rate in Hz (10, 20, 25, 33 or 50)
    #[arg(long)]
    update_rate: Option<u32>,

    /// Minimum RCS (0-15)
    #[arg(long)]
    rcs_threshold: Option<u8>,

    /// Print the frames without opening the bus.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Monitor the CAN bus and print frames and targets.
    #[arg(short, long)]
    monitor: bool,

    /// Only print raw frames with this CAN id (hex).
    #[arg(short, long, value_parser = parse_id)]
    filter: Option<u32>,
}

impl Args {
    fn configuration(&self) -> Result<RadarConfiguration, Box<dyn std::error::Error>> {
        let mut config = match &self.profile {
            Some(path) => Profile::load(path)?.radar,
            None => RadarConfiguration::default(),
        };

        if let Some(value) = self.sensor_id {
            config.sensor_id = value;
        }
        if let Some(value) = self.distance_range {
            config.distance_range_m = value;
        }
        if let Some(value) = self.angle_resolution {
            config.angle_resolution_deg = value;
        }
        if let Some(value) = self.measurement_mode {
            config.measurement_mode = value;
        }
        if let Some(value) = self.output_mode {
            config.output_mode = value;
        }
        if let Some(value) = self.update_rate {
            config.update_rate_hz = value;
        }
        if let Some(value) = self.rcs_threshold {
            config.rcs_threshold = value;
        }

        config.validate()?;
        Ok(config)
    }

    fn configures(&self) -> bool {
        self.parameter.is_some()
            || self.profile.is_some()
            || self.sensor_id.is_some()
            || self.distance_range.is_some()
            || self.angle_resolution.is_some()
            || self.measurement_mode.is_some()
            || self.output_mode.is_some()
            || self.update_rate.is_some()
            || self.rcs_threshold.is_some()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = args.configuration()?;
    let frames = match args.parameter {
        Some(parameter) => vec![config.frame(parameter)],
        None if args.configures() => config.frames(),
        None => Vec::new(),
    };

    if args.dry_run {
        for frame in &frames {
            println!("{:#05X} {:?}: {:02X?}", frame.id(), frame.parameter, frame.data);
        }
        return Ok(());
    }

    let device = args.device.clone();
    let (mut handle, events) =
        session::spawn(SessionSettings::default(), move || SocketCan::open(&device))?;

    loop {
        match events.recv()? {
            Event::StatusChanged(ConnectionState::Connected) => break,
            Event::StatusChanged(ConnectionState::Error) => {
                return Err(format!("unable to open can device {}", args.device).into());
            }
            event => debug!("{:?}", event),
        }
    }

    for frame in &frames {
        if !handle.send_config_frame(frame.id(), frame.data)? {
            return Err(format!("can device {} closed", args.device).into());
        }
        println!("{:?}: {:02X?}", frame.parameter, frame.data);
    }

    if args.monitor {
        while let Ok(event) = events.recv() {
            match event {
                Event::RawFrameObserved {
                    id,
                    data,
                    timestamp,
                } => {
                    if args.filter.map_or(true, |filter| filter == id) {
                        println!("{}", format_line(id, &data, &timestamp));
                    }
                }
                Event::NewTarget(target) => println!("{:?}", target),
                Event::RadarStatusUpdated(status) => println!("{:?}", status),
                Event::NoDataWarning => eprintln!("no CAN data on {}", args.device),
                Event::StatusChanged(ConnectionState::Error) => break,
                Event::StatusChanged(state) => debug!("connection {}", state),
            }
        }
    }

    handle.stop();
    Ok(())
}
