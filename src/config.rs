// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    codec::encode_config,
    scan::{AlarmZone, RANGE_FILTER},
};
use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io, path::Path};

/// Configuration and profile error types.
#[derive(Debug)]
pub enum Error {
    /// I/O error reading or writing a profile
    Io(io::Error),
    /// Malformed profile document
    Json(serde_json::Error),
    /// Measurement mode outside 0-2
    InvalidMeasurementMode(u32),
    /// Output mode outside 0-7
    InvalidOutputMode(u32),
    /// RCS threshold outside 0-15
    InvalidRcsThreshold(u32),
    /// Alarm zone with empty or inverted bounds
    InvalidAlarmZone([f64; 4]),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Json(err) => write!(f, "profile error: {}", err),
            Error::InvalidMeasurementMode(value) => {
                write!(f, "invalid measurement mode: {}", value)
            }
            Error::InvalidOutputMode(value) => write!(f, "invalid output mode: {}", value),
            Error::InvalidRcsThreshold(value) => write!(f, "invalid rcs threshold: {}", value),
            Error::InvalidAlarmZone(bounds) => write!(f, "invalid alarm zone: {:?}", bounds),
        }
    }
}

/// Configurable radar parameters and their command identifiers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parameter {
    /// Sensor id
    SensorId = 0x200,
    /// Detection distance range
    DistanceRange = 0x201,
    /// Angular resolution
    AngleResolution = 0x202,
    /// Measurement mode
    MeasurementMode = 0x203,
    /// Output mode
    OutputMode = 0x204,
    /// Update rate
    UpdateRate = 0x205,
    /// Cluster output configuration
    ClusterConfig = 0x206,
    /// Target output configuration
    TargetConfig = 0x207,
}

impl Parameter {
    /// CAN identifier of the command frame.
    pub fn id(self) -> u16 {
        self as u16
    }
}

impl clap::ValueEnum for Parameter {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Parameter::SensorId,
            Parameter::DistanceRange,
            Parameter::AngleResolution,
            Parameter::MeasurementMode,
            Parameter::OutputMode,
            Parameter::UpdateRate,
            Parameter::ClusterConfig,
            Parameter::TargetConfig,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::SensorId => Some(clap::builder::PossibleValue::new("sensor_id")),
            Self::DistanceRange => Some(clap::builder::PossibleValue::new("distance_range")),
            Self::AngleResolution => Some(clap::builder::PossibleValue::new("angle_resolution")),
            Self::MeasurementMode => Some(clap::builder::PossibleValue::new("measurement_mode")),
            Self::OutputMode => Some(clap::builder::PossibleValue::new("output_mode")),
            Self::UpdateRate => Some(clap::builder::PossibleValue::new("update_rate")),
            Self::ClusterConfig => Some(clap::builder::PossibleValue::new("cluster_config")),
            Self::TargetConfig => Some(clap::builder::PossibleValue::new("target_config")),
        }
    }
}

/// Measurement mode trades range against precision.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum MeasurementMode {
    /// Standard
    Standard = 0,
    /// High precision
    HighPrecision = 1,
    /// Long range
    LongRange = 2,
}

impl TryFrom<u32> for MeasurementMode {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MeasurementMode::Standard),
            1 => Ok(MeasurementMode::HighPrecision),
            2 => Ok(MeasurementMode::LongRange),
            _ => Err(Error::InvalidMeasurementMode(value)),
        }
    }
}

impl From<MeasurementMode> for u32 {
    fn from(mode: MeasurementMode) -> Self {
        mode as u32
    }
}

impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MeasurementMode::Standard => write!(f, "standard"),
            MeasurementMode::HighPrecision => write!(f, "high-precision"),
            MeasurementMode::LongRange => write!(f, "long-range"),
        }
    }
}

/// Which object lists the radar emits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum OutputMode {
    /// Clusters only
    Clusters = 0,
    /// Targets only
    Targets = 1,
    /// Clusters and targets
    ClustersTargets = 2,
    /// Cluster quality only
    ClusterQuality = 3,
    /// Target quality only
    TargetQuality = 4,
    /// Cluster and target quality
    ClusterTargetQuality = 5,
    /// Extended targets
    ExtendedTargets = 6,
    /// Point cloud
    PointCloud = 7,
}

impl TryFrom<u32> for OutputMode {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OutputMode::Clusters),
            1 => Ok(OutputMode::Targets),
            2 => Ok(OutputMode::ClustersTargets),
            3 => Ok(OutputMode::ClusterQuality),
            4 => Ok(OutputMode::TargetQuality),
            5 => Ok(OutputMode::ClusterTargetQuality),
            6 => Ok(OutputMode::ExtendedTargets),
            7 => Ok(OutputMode::PointCloud),
            _ => Err(Error::InvalidOutputMode(value)),
        }
    }
}

impl From<OutputMode> for u32 {
    fn from(mode: OutputMode) -> Self {
        mode as u32
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputMode::Clusters => write!(f, "clusters"),
            OutputMode::Targets => write!(f, "targets"),
            OutputMode::ClustersTargets => write!(f, "clusters-targets"),
            OutputMode::ClusterQuality => write!(f, "cluster-quality"),
            OutputMode::TargetQuality => write!(f, "target-quality"),
            OutputMode::ClusterTargetQuality => write!(f, "cluster-target-quality"),
            OutputMode::ExtendedTargets => write!(f, "extended-targets"),
            OutputMode::PointCloud => write!(f, "point-cloud"),
        }
    }
}

/// Distance range command code. Ranges outside the table select 25 m.
pub fn distance_range_code(range_m: u32) -> u8 {
    match range_m {
        15 => 0,
        25 => 1,
        50 => 2,
        70 => 3,
        _ => 1,
    }
}

/// Angle resolution command code: 0 for 0.4° or coarser, 1 for finer.
pub fn angle_resolution_code(resolution_deg: f64) -> u8 {
    if resolution_deg >= 0.4 {
        0
    } else {
        1
    }
}

/// Update rate command code. Rates outside the table select 20 Hz.
pub fn update_rate_code(rate_hz: u32) -> u8 {
    match rate_hz {
        10 => 0,
        20 => 1,
        25 => 2,
        33 => 3,
        50 => 4,
        _ => 1,
    }
}

/// One outbound command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigFrame {
    /// Parameter the frame sets
    pub parameter: Parameter,
    /// Frame body
    pub data: [u8; 8],
}

impl ConfigFrame {
    /// Frame whose body leads with `value_code`.
    pub fn new(parameter: Parameter, value_code: u8) -> Self {
        ConfigFrame {
            parameter,
            data: encode_config(parameter.id() as u8, value_code),
        }
    }

    /// CAN identifier.
    pub fn id(&self) -> u16 {
        self.parameter.id()
    }

    /// Cluster output enable with default clustering parameters.
    pub fn cluster_config() -> Self {
        ConfigFrame::new(Parameter::ClusterConfig, 1)
    }

    /// Target output enable with the given RCS threshold.
    pub fn target_config(rcs_threshold: u8) -> Self {
        let mut frame = ConfigFrame::new(Parameter::TargetConfig, 1);
        frame.data[2] = rcs_threshold;
        frame
    }
}

/// Human facing radar settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfiguration {
    /// Sensor id, 0-255
    pub sensor_id: u8,
    /// Detection range in meters: 15, 25, 50 or 70
    pub distance_range_m: u32,
    /// Angular resolution in degrees: 0.4 or 0.2
    pub angle_resolution_deg: f64,
    /// Measurement mode
    pub measurement_mode: MeasurementMode,
    /// Output mode
    pub output_mode: OutputMode,
    /// Update rate in Hz: 10, 20, 25, 33 or 50
    pub update_rate_hz: u32,
    /// Minimum RCS, 0 disables filtering and 15 filters most
    pub rcs_threshold: u8,
}

impl Default for RadarConfiguration {
    fn default() -> Self {
        RadarConfiguration {
            sensor_id: 0,
            distance_range_m: 70,
            angle_resolution_deg: 0.4,
            measurement_mode: MeasurementMode::Standard,
            output_mode: OutputMode::Targets,
            update_rate_hz: 20,
            rcs_threshold: 0,
        }
    }
}

impl RadarConfiguration {
    /// Reject values the radar cannot represent.
    pub fn validate(&self) -> Result<(), Error> {
        if self.rcs_threshold > 15 {
            return Err(Error::InvalidRcsThreshold(self.rcs_threshold as u32));
        }
        Ok(())
    }

    /// Command frame for a single parameter.
    pub fn frame(&self, parameter: Parameter) -> ConfigFrame {
        match parameter {
            Parameter::SensorId => ConfigFrame::new(parameter, self.sensor_id),
            Parameter::DistanceRange => {
                ConfigFrame::new(parameter, distance_range_code(self.distance_range_m))
            }
            Parameter::AngleResolution => {
                ConfigFrame::new(parameter, angle_resolution_code(self.angle_resolution_deg))
            }
            Parameter::MeasurementMode => {
                ConfigFrame::new(parameter, self.measurement_mode as u8)
            }
            Parameter::OutputMode => ConfigFrame::new(parameter, self.output_mode as u8),
            Parameter::UpdateRate => {
                ConfigFrame::new(parameter, update_rate_code(self.update_rate_hz))
            }
            Parameter::ClusterConfig => ConfigFrame::cluster_config(),
            Parameter::TargetConfig => ConfigFrame::target_config(self.rcs_threshold),
        }
    }

    /// Every command needed to apply this configuration, in the order the
    /// radar expects them.
    pub fn frames(&self) -> Vec<ConfigFrame> {
        [
            Parameter::DistanceRange,
            Parameter::AngleResolution,
            Parameter::MeasurementMode,
            Parameter::SensorId,
            Parameter::OutputMode,
            Parameter::UpdateRate,
            Parameter::ClusterConfig,
            Parameter::TargetConfig,
        ]
        .into_iter()
        .map(|parameter| self.frame(parameter))
        .collect()
    }
}

/// Saved monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Radar parameters
    pub radar: RadarConfiguration,
    /// Include track history in snapshots
    pub track_visible: bool,
    /// Drop targets beyond `range_filter_m` from the point cloud
    pub range_filter_enabled: bool,
    /// Point cloud range limit in meters
    pub range_filter_m: f64,
    /// Alarm zones in insertion order
    pub alarm_zones: Vec<AlarmZone>,
}

impl Default for Profile {
    fn default() -> Self {
        Profile {
            radar: RadarConfiguration::default(),
            track_visible: false,
            range_filter_enabled: false,
            range_filter_m: RANGE_FILTER,
            alarm_zones: Vec::new(),
        }
    }
}

impl Profile {
    /// Read a JSON profile.
    pub fn load(path: &Path) -> Result<Self, Error> {
        debug!("loading profile {}", path.display());
        let profile: Profile = serde_json::from_slice(&fs::read(path)?)?;
        profile.radar.validate()?;
        Ok(profile)
    }

    /// Write this profile as JSON.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        debug!("saving profile {}", path.display());
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
