// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{codec::TargetRecord, config::Error, session::Event};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default number of points kept per target track.
pub const TRACK_LENGTH: usize = 50;

/// Default range limit of the point cloud view.
pub const RANGE_FILTER: f64 = 70.0;

/// Axis aligned rectangle that raises the alarm when a target lands inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct AlarmZone {
    x_min: f64,
    y_min: f64,
    x_max: f64,
    y_max: f64,
}

impl AlarmZone {
    /// Build a zone, rejecting empty or inverted bounds.
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Result<Self, Error> {
        if !(x_min < x_max && y_min < y_max) {
            return Err(Error::InvalidAlarmZone([x_min, y_min, x_max, y_max]));
        }
        Ok(AlarmZone {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    /// Whether the point lies inside, bounds included.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x_min <= x && x <= self.x_max && self.y_min <= y && y <= self.y_max
    }

    /// Bounds as `[x_min, y_min, x_max, y_max]`.
    pub fn bounds(&self) -> [f64; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }
}

/// A 20 m by 10 m zone centered on the sensor.
impl Default for AlarmZone {
    fn default() -> Self {
        AlarmZone {
            x_min: -10.0,
            y_min: -5.0,
            x_max: 10.0,
            y_max: 5.0,
        }
    }
}

impl TryFrom<[f64; 4]> for AlarmZone {
    type Error = Error;

    fn try_from(value: [f64; 4]) -> Result<Self, Self::Error> {
        AlarmZone::new(value[0], value[1], value[2], value[3])
    }
}

impl From<AlarmZone> for [f64; 4] {
    fn from(zone: AlarmZone) -> Self {
        zone.bounds()
    }
}

/// Bounded per-target position history.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackHistory {
    cap: usize,
    tracks: BTreeMap<u8, VecDeque<(f64, f64)>>,
}

impl TrackHistory {
    /// Empty history keeping at most `cap` points per target. A track
    /// always holds its latest point, so a `cap` of 0 behaves as 1.
    pub fn new(cap: usize) -> Self {
        TrackHistory {
            cap: cap.max(1),
            tracks: BTreeMap::new(),
        }
    }

    /// Append a point, dropping the oldest ones beyond the cap.
    pub fn push(&mut self, target_id: u8, x: f64, y: f64) {
        let track = self.tracks.entry(target_id).or_default();
        track.push_back((x, y));
        while track.len() > self.cap {
            track.pop_front();
        }
    }

    /// Points of one target, oldest first.
    pub fn get(&self, target_id: u8) -> Option<&VecDeque<(f64, f64)>> {
        self.tracks.get(&target_id)
    }

    /// All tracks by target id.
    pub fn iter(&self) -> impl Iterator<Item = (&u8, &VecDeque<(f64, f64)>)> {
        self.tracks.iter()
    }

    /// Number of tracked targets.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether no target has a track.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Maximum points per target.
    pub fn cap(&self) -> usize {
        self.cap
    }

    fn clear(&mut self) {
        self.tracks.clear();
    }
}

impl Default for TrackHistory {
    fn default() -> Self {
        TrackHistory::new(TRACK_LENGTH)
    }
}

/// What one refresh tick hands to the display.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSnapshot {
    /// Targets decoded since the previous flush, in arrival order
    pub targets: Vec<TargetRecord>,
    /// Whether a target currently sits in an alarm zone
    pub alarm_active: bool,
    /// Set on the flush where the alarm went from clear to active
    pub alarm_raised: bool,
    /// Track history, present when track display is enabled
    pub tracks: Option<TrackHistory>,
}

impl ScanSnapshot {
    /// Targets no further than `max_range` meters from the sensor.
    pub fn within_range(&self, max_range: f64) -> impl Iterator<Item = &TargetRecord> {
        self.targets
            .iter()
            .filter(move |t| (t.x * t.x + t.y * t.y + t.z * t.z).sqrt() <= max_range)
    }
}

/// Receiver of user facing alerts.
pub trait AlertSink: Send {
    /// A target entered an alarm zone while the alarm was clear.
    fn alarm_raised(&mut self);

    /// The session reported missing traffic or a failed bus.
    fn no_data(&mut self);
}

/// Alert sink writing to the log and ringing the terminal bell.
#[derive(Debug, Clone, Default)]
pub struct LogAlert {
    /// Interface name used to build troubleshooting hints
    pub interface: String,
}

impl AlertSink for LogAlert {
    fn alarm_raised(&mut self) {
        eprint!("\x07");
        warn!("alarm zone occupied");
    }

    fn no_data(&mut self) {
        warn!(
            "no CAN data on {iface}, check that the interface is up \
             (ip link set {iface} up type can bitrate 500000), \
             that the channel is correct and that the radar is powered",
            iface = self.interface
        );
    }
}

/// Turns the ordered target stream into per-tick snapshots.
///
/// Lives on the consumer side only; the session never touches it.
pub struct Aggregator {
    buffer: Vec<TargetRecord>,
    history: TrackHistory,
    zones: Vec<AlarmZone>,
    alarm_active: bool,
    show_tracks: bool,
    alert: Option<Box<dyn AlertSink>>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Aggregator::new(TRACK_LENGTH)
    }
}

impl Aggregator {
    /// Aggregator with `track_length` points of history per target.
    pub fn new(track_length: usize) -> Self {
        Aggregator {
            buffer: Vec::new(),
            history: TrackHistory::new(track_length),
            zones: Vec::new(),
            alarm_active: false,
            show_tracks: false,
            alert: None,
        }
    }

    /// Route alarm and liveness alerts to `alert`.
    pub fn with_alert(mut self, alert: Box<dyn AlertSink>) -> Self {
        self.alert = Some(alert);
        self
    }

    /// Feed one session event. Only targets and liveness warnings matter here.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::NewTarget(target) => self.on_new_target(*target),
            Event::NoDataWarning => {
                if let Some(alert) = self.alert.as_mut() {
                    alert.no_data();
                }
            }
            Event::RawFrameObserved { .. }
            | Event::StatusChanged(_)
            | Event::RadarStatusUpdated(_) => (),
        }
    }

    /// Buffer a target for the next flush and extend its track.
    pub fn on_new_target(&mut self, target: TargetRecord) {
        self.history.push(target.target_id, target.x, target.y);
        self.buffer.push(target);
    }

    /// Hand over everything buffered since the last flush.
    ///
    /// The alarm is evaluated over the handed over targets only. A tick
    /// without targets leaves the alarm state as it was.
    pub fn flush(&mut self) -> ScanSnapshot {
        let targets = std::mem::take(&mut self.buffer);
        let mut alarm_raised = false;

        if !targets.is_empty() {
            let triggered = targets
                .iter()
                .any(|t| self.zones.iter().any(|zone| zone.contains(t.x, t.y)));

            if triggered != self.alarm_active {
                debug!("alarm {} -> {}", self.alarm_active, triggered);
                self.alarm_active = triggered;
                if triggered {
                    alarm_raised = true;
                    if let Some(alert) = self.alert.as_mut() {
                        alert.alarm_raised();
                    }
                }
            }
        }

        ScanSnapshot {
            targets,
            alarm_active: self.alarm_active,
            alarm_raised,
            tracks: self.show_tracks.then(|| self.history.clone()),
        }
    }

    /// Forget all tracks. Pending targets and the alarm are kept.
    pub fn clear_tracks(&mut self) {
        if !self.history.is_empty() {
            info!("cleared {} target tracks", self.history.len());
        }
        self.history.clear();
    }

    /// Current track history.
    pub fn tracks(&self) -> &TrackHistory {
        &self.history
    }

    /// Include track history in snapshots.
    pub fn set_show_tracks(&mut self, show: bool) {
        self.show_tracks = show;
    }

    /// Whether snapshots include track history.
    pub fn show_tracks(&self) -> bool {
        self.show_tracks
    }

    /// Whether the alarm is currently raised.
    pub fn alarm_active(&self) -> bool {
        self.alarm_active
    }

    /// Replace every alarm zone.
    pub fn reset_alarm_zones(&mut self, zones: Vec<AlarmZone>) {
        info!("loaded {} alarm zones", zones.len());
        self.zones = zones;
    }

    /// Append a zone; it becomes the most recent.
    pub fn add_alarm_zone(&mut self, zone: AlarmZone) {
        info!("added alarm zone {:?}", zone.bounds());
        self.zones.push(zone);
    }

    /// Remove and return the most recently added zone.
    pub fn remove_last_alarm_zone(&mut self) -> Option<AlarmZone> {
        let zone = self.zones.pop();
        if let Some(zone) = &zone {
            info!("removed alarm zone {:?}", zone.bounds());
        }
        zone
    }

    /// Remove every zone, returning how many there were.
    pub fn clear_alarm_zones(&mut self) -> usize {
        let count = self.zones.len();
        self.zones.clear();
        count
    }

    /// Zones in insertion order.
    pub fn alarm_zones(&self) -> &[AlarmZone] {
        &self.zones
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Clone, Default)]
    struct CountingAlert {
        alarms: Arc<AtomicUsize>,
        no_data: Arc<AtomicUsize>,
    }

    impl AlertSink for CountingAlert {
        fn alarm_raised(&mut self) {
            self.alarms.fetch_add(1, Ordering::SeqCst);
        }

        fn no_data(&mut self) {
            self.no_data.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn target(target_id: u8, x: f64, y: f64) -> TargetRecord {
        TargetRecord {
            target_id,
            x,
            y,
            z: 0.0,
        }
    }

    #[test]
    fn test_zone_bounds() {
        assert!(AlarmZone::new(-10.0, -5.0, 10.0, 5.0).is_ok());
        assert!(AlarmZone::new(10.0, -5.0, -10.0, 5.0).is_err());
        assert!(AlarmZone::new(0.0, 0.0, 0.0, 1.0).is_err());
        assert!(AlarmZone::new(f64::NAN, 0.0, 1.0, 1.0).is_err());

        let zone = AlarmZone::default();
        assert_eq!(zone.bounds(), [-10.0, -5.0, 10.0, 5.0]);
        assert!(zone.contains(0.0, 0.0));
        assert!(zone.contains(10.0, 5.0));
        assert!(zone.contains(-10.0, -5.0));
        assert!(!zone.contains(10.01, 0.0));
        assert!(!zone.contains(0.0, -5.01));
    }

    #[test]
    fn test_track_cap() {
        let mut history = TrackHistory::new(50);
        for i in 0..51 {
            history.push(7, i as f64, -(i as f64));
            assert!(history.get(7).unwrap().len() <= 50);
        }

        let track = history.get(7).unwrap();
        assert_eq!(track.len(), 50);
        assert_eq!(track.front(), Some(&(1.0, -1.0)));
        assert_eq!(track.back(), Some(&(50.0, -50.0)));
    }

    #[test]
    fn test_track_cap_many_targets() {
        let mut history = TrackHistory::new(3);
        for i in 0..20u8 {
            history.push(i % 4, i as f64, 0.0);
        }
        for (_, track) in history.iter() {
            assert_eq!(track.len(), 3);
        }
        assert_eq!(history.len(), 4);
        let xs: Vec<_> = history.get(1).unwrap().iter().map(|p| p.0).collect();
        assert_eq!(xs, vec![9.0, 13.0, 17.0]);
    }

    #[test]
    fn test_flush_clears_buffer() {
        let mut agg = Aggregator::default();
        agg.on_new_target(target(1, 1.0, 2.0));
        agg.on_new_target(target(2, 3.0, 4.0));

        let snap = agg.flush();
        assert_eq!(snap.targets.len(), 2);
        assert_eq!(snap.targets[0].target_id, 1);
        assert_eq!(snap.targets[1].target_id, 2);
        assert!(snap.tracks.is_none());

        let snap = agg.flush();
        assert!(snap.targets.is_empty());
        assert_eq!(agg.tracks().len(), 2);
    }

    #[test]
    fn test_alarm_edge() {
        let alert = CountingAlert::default();
        let alarms = alert.alarms.clone();
        let mut agg = Aggregator::default().with_alert(Box::new(alert));
        agg.reset_alarm_zones(vec![AlarmZone::new(-10.0, -5.0, 10.0, 5.0).unwrap()]);

        agg.on_new_target(target(1, 0.0, 0.0));
        let snap = agg.flush();
        assert!(snap.alarm_active);
        assert!(snap.alarm_raised);
        assert_eq!(alarms.load(Ordering::SeqCst), 1);

        // Still inside: stays active without a second alert.
        agg.on_new_target(target(1, 1.0, 1.0));
        agg.on_new_target(target(2, 2.0, -1.0));
        let snap = agg.flush();
        assert!(snap.alarm_active);
        assert!(!snap.alarm_raised);
        assert_eq!(alarms.load(Ordering::SeqCst), 1);

        agg.on_new_target(target(1, 50.0, 0.0));
        let snap = agg.flush();
        assert!(!snap.alarm_active);
        assert_eq!(alarms.load(Ordering::SeqCst), 1);

        // A new run inside the zone alerts again.
        agg.on_new_target(target(1, -3.0, 4.0));
        assert!(agg.flush().alarm_raised);
        assert_eq!(alarms.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_alarm_held_without_targets() {
        let mut agg = Aggregator::default();
        agg.add_alarm_zone(AlarmZone::default());
        agg.on_new_target(target(1, 0.0, 0.0));
        assert!(agg.flush().alarm_active);

        let snap = agg.flush();
        assert!(snap.alarm_active);
        assert!(!snap.alarm_raised);
    }

    #[test]
    fn test_alarm_without_zones() {
        let mut agg = Aggregator::default();
        agg.on_new_target(target(1, 0.0, 0.0));
        assert!(!agg.flush().alarm_active);
    }

    #[test]
    fn test_zone_list() {
        let mut agg = Aggregator::default();
        let a = AlarmZone::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = AlarmZone::new(5.0, 5.0, 6.0, 6.0).unwrap();
        agg.add_alarm_zone(a);
        agg.add_alarm_zone(b);

        assert_eq!(agg.remove_last_alarm_zone(), Some(b));
        assert_eq!(agg.alarm_zones(), &[a]);

        agg.reset_alarm_zones(vec![b, a, b]);
        assert_eq!(agg.clear_alarm_zones(), 3);
        assert_eq!(agg.remove_last_alarm_zone(), None);
    }

    #[test]
    fn test_clear_tracks_keeps_buffer() {
        let mut agg = Aggregator::new(10);
        agg.set_show_tracks(true);
        agg.add_alarm_zone(AlarmZone::default());
        agg.on_new_target(target(4, 1.0, 1.0));
        agg.flush();

        agg.on_new_target(target(4, 2.0, 2.0));
        agg.clear_tracks();
        assert!(agg.tracks().is_empty());
        assert!(agg.alarm_active());

        let snap = agg.flush();
        assert_eq!(snap.targets.len(), 1);
        assert!(snap.tracks.unwrap().is_empty());
    }

    #[test]
    fn test_apply_events() {
        let alert = CountingAlert::default();
        let no_data = alert.no_data.clone();
        let mut agg = Aggregator::default().with_alert(Box::new(alert));
        agg.set_show_tracks(true);

        agg.apply(&Event::NewTarget(target(3, 1.0, 2.0)));
        agg.apply(&Event::NoDataWarning);
        agg.apply(&Event::NewTarget(target(3, 1.5, 2.5)));

        let snap = agg.flush();
        assert_eq!(snap.targets.len(), 2);
        assert_eq!(no_data.load(Ordering::SeqCst), 1);
        let tracks = snap.tracks.unwrap();
        assert_eq!(
            tracks.get(3).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![(1.0, 2.0), (1.5, 2.5)]
        );
    }

    #[test]
    fn test_within_range() {
        let snap = ScanSnapshot {
            targets: vec![target(1, 3.0, 4.0), target(2, 60.0, 40.0), target(3, -70.0, 0.0)],
            alarm_active: false,
            alarm_raised: false,
            tracks: None,
        };
        let ids: Vec<_> = snap.within_range(RANGE_FILTER).map(|t| t.target_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_zone_serde() {
        let zone: AlarmZone = serde_json::from_str("[-10, -5, 10, 5]").unwrap();
        assert_eq!(zone, AlarmZone::default());
        assert!(serde_json::from_str::<AlarmZone>("[10, -5, -10, 5]").is_err());
        assert_eq!(serde_json::to_string(&zone).unwrap(), "[-10.0,-5.0,10.0,5.0]");
    }
}
