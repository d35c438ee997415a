// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use sr111::{
    can::SocketCan,
    codec::RadarStatusRecord,
    common::set_process_priority,
    config::{Parameter, Profile, RadarConfiguration},
    rawlog::RawLog,
    scan::{Aggregator, AlarmZone, LogAlert, ScanSnapshot},
    session::{self, ConnectionState, Event, PendingSend, SessionHandle, SessionSettings},
};
use std::{fs::File, io::BufWriter, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(args.rust_log)),
        Err(_) => None,
    };

    let subscriber = Registry::default().with(stdout_log).with(journald);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    let mut profile = match &args.profile {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };
    if args.tracks {
        profile.track_visible = true;
    }
    if let Some(range) = args.range_filter {
        profile.range_filter_enabled = true;
        profile.range_filter_m = range;
    }

    let alert = LogAlert {
        interface: args.can.clone(),
    };
    let mut aggregator = Aggregator::new(args.track_length as usize).with_alert(Box::new(alert));
    aggregator.set_show_tracks(profile.track_visible);
    aggregator.reset_alarm_zones(profile.alarm_zones.clone());
    if args.default_zone {
        aggregator.add_alarm_zone(AlarmZone::default());
    }

    let can = args.can.clone();
    let realtime = args.realtime;
    let (mut handle, events) = session::spawn(SessionSettings::from(&args), move || {
        if realtime {
            set_process_priority();
        }
        SocketCan::open(&can)
    })?;

    let mut monitor = Monitor {
        aggregator,
        raw: RawLog::default(),
        raw_filter: args.raw_filter,
        range_filter: profile.range_filter_enabled.then_some(profile.range_filter_m),
        apply: args.apply.then_some(profile.radar),
        pending: Vec::new(),
        status: None,
    };

    let mut interval = tokio::time::interval(Duration::from_millis(args.refresh.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, stopping");
                break;
            }
            _ = interval.tick() => {}
        }

        while let Ok(Some(event)) = events.try_recv() {
            monitor.on_event(&handle, event);
        }
        monitor.poll_pending();

        let snapshot = monitor.aggregator.flush();
        monitor.report(&snapshot);

        if handle.is_finished() && events.is_empty() {
            warn!("can session ended");
            break;
        }
    }

    handle.stop();
    while let Ok(Some(event)) = events.try_recv() {
        monitor.on_event(&handle, event);
    }
    monitor.poll_pending();

    if let Some(path) = &args.raw_export {
        let mut writer = BufWriter::new(File::create(path)?);
        let count = monitor.raw.write_to(&mut writer, monitor.raw_filter)?;
        info!("exported {} raw frames to {}", count, path.display());
    }

    if let Some(path) = &args.save_profile {
        profile.track_visible = monitor.aggregator.show_tracks();
        profile.alarm_zones = monitor.aggregator.alarm_zones().to_vec();
        profile.save(path)?;
        info!("saved profile {}", path.display());
    }

    Ok(())
}

struct Monitor {
    aggregator: Aggregator,
    raw: RawLog,
    raw_filter: Option<u32>,
    range_filter: Option<f64>,
    apply: Option<RadarConfiguration>,
    pending: Vec<(Parameter, PendingSend)>,
    status: Option<RadarStatusRecord>,
}

impl Monitor {
    fn on_event(&mut self, handle: &SessionHandle, event: Event) {
        match &event {
            Event::RawFrameObserved {
                id,
                data,
                timestamp,
            } => {
                let line = self.raw.push(*id, data, timestamp);
                if self.raw_filter.map_or(true, |filter| filter == line.id) {
                    debug!("{}", line.text);
                }
            }
            Event::StatusChanged(state) => {
                info!("connection {}", state);
                if *state == ConnectionState::Connected {
                    if let Some(config) = self.apply.take() {
                        self.pending = apply_configuration(handle, &config);
                    }
                }
            }
            Event::RadarStatusUpdated(status) => {
                if self.status.as_ref() != Some(status) {
                    info!(
                        "radar status: temperature={}°C voltage={:.1}V error_code={} output_type={}",
                        status.temperature, status.voltage, status.error_code, status.output_type
                    );
                    if status.error_code != 0 {
                        warn!("radar reports error code {}", status.error_code);
                    }
                    self.status = Some(*status);
                }
            }
            Event::NewTarget(_) | Event::NoDataWarning => (),
        }

        self.aggregator.apply(&event);
    }

    /// Log the outcome of queued configuration frames the worker has handled.
    fn poll_pending(&mut self) {
        self.pending.retain(|(parameter, send)| match send.try_result() {
            None => true,
            Some(Ok(())) => {
                debug!("sent {:?} {:#05X}", parameter, send.id());
                false
            }
            Some(Err(err)) => {
                error!("failed to send {:?}: {}", parameter, err);
                false
            }
        });
    }

    fn report(&self, snapshot: &ScanSnapshot) {
        if snapshot.targets.is_empty() {
            return;
        }

        let targets: Vec<_> = match self.range_filter {
            Some(range) => snapshot.within_range(range).collect(),
            None => snapshot.targets.iter().collect(),
        };
        debug!(
            "{} targets ({} shown) alarm={}",
            snapshot.targets.len(),
            targets.len(),
            snapshot.alarm_active
        );
        for target in targets {
            debug!(
                "target {:3} x={:8.2} y={:8.2}",
                target.target_id, target.x, target.y
            );
        }

        if snapshot.alarm_raised {
            info!("alarm raised");
        }

        if let Some(tracks) = &snapshot.tracks {
            for (id, track) in tracks.iter() {
                if let Some((x, y)) = track.back() {
                    debug!("track {:3} points={} last=({:.2}, {:.2})", id, track.len(), x, y);
                }
            }
        }
    }
}

/// Queue every radar parameter in order. The worker transmits them between
/// polls; results are collected by [`Monitor::poll_pending`] on later ticks.
fn apply_configuration(
    handle: &SessionHandle,
    config: &RadarConfiguration,
) -> Vec<(Parameter, PendingSend)> {
    info!("applying radar configuration {:?}", config);
    let mut pending = Vec::new();
    for frame in config.frames() {
        match handle.queue_config_frame(frame.id(), frame.data) {
            Some(send) => pending.push((frame.parameter, send)),
            None => {
                warn!("bus closed, radar configuration not applied");
                break;
            }
        }
    }
    pending
}
