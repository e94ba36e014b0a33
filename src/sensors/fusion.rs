// Background sensor fusion
//
// Runs at a fixed cadence independent of any session, filters the ranging
// sensor, ORs the panic inputs and publishes a whole SensorSnapshot through a
// watch channel. Readers copy the latest snapshot and never block.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

use super::source::SensorSource;
use crate::config::FusionConfig;
use crate::messages::{LINE_CHANNELS, SensorMask};

/// Fused sensor state, replaced as a whole on every fusion tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSnapshot {
    pub distance_cm: f64,
    pub panic: bool,
    /// [far-left, left, mid, right, far-right]
    pub line_mask: [bool; LINE_CHANNELS],
}

impl SensorSnapshot {
    /// Snapshot with nothing detected at the given distance
    pub fn clear(distance_cm: f64) -> Self {
        Self {
            distance_cm,
            panic: false,
            line_mask: [false; LINE_CHANNELS],
        }
    }

    /// Copy with disabled line channels forced off
    pub fn masked(&self, mask: SensorMask) -> Self {
        Self {
            line_mask: mask.apply(self.line_mask),
            ..*self
        }
    }
}

/// Boolean OR across panic inputs. No inputs means no panic.
pub fn panic_from(inputs: &[bool]) -> bool {
    inputs.iter().any(|&triggered| triggered)
}

/// Exponential moving average over valid ranging samples.
///
/// Samples outside (min_valid, max_valid) are glitches: the previous value is
/// kept. After `max_consecutive_faults` glitches in a row, or before the first
/// valid sample, the filter reports `failure_distance_cm`.
#[derive(Debug, Clone)]
pub struct DistanceFilter {
    alpha: f64,
    min_valid: f64,
    max_valid: f64,
    failure_distance: f64,
    max_faults: u32,
    filtered: Option<f64>,
    faults: u32,
    failed: bool,
}

impl DistanceFilter {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            alpha: config.alpha,
            min_valid: config.min_valid_cm,
            max_valid: config.max_valid_cm,
            failure_distance: config.failure_distance_cm,
            max_faults: config.max_consecutive_faults.max(1),
            filtered: None,
            faults: 0,
            failed: false,
        }
    }

    pub fn update(&mut self, raw: Option<f64>) -> f64 {
        match raw.filter(|&cm| cm > self.min_valid && cm < self.max_valid) {
            Some(cm) => {
                if self.failed {
                    info!("Ranging sensor recovered ({:.1} cm)", cm);
                    self.failed = false;
                    self.filtered = None;
                }
                self.faults = 0;
                self.filtered = Some(match self.filtered {
                    Some(prev) => prev * (1.0 - self.alpha) + cm * self.alpha,
                    None => cm,
                });
            }
            None => {
                self.faults = self.faults.saturating_add(1);
                if !self.failed && self.faults >= self.max_faults {
                    warn!(
                        "Ranging sensor failed ({} bad samples), assuming {:.0} cm",
                        self.faults, self.failure_distance
                    );
                    self.failed = true;
                }
            }
        }
        self.value()
    }

    pub fn value(&self) -> f64 {
        match self.filtered {
            Some(cm) if !self.failed => cm,
            _ => self.failure_distance,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

/// One raw read of every sensor
#[derive(Debug, Clone)]
struct RawReading {
    distance: Option<f64>,
    line: [bool; LINE_CHANNELS],
    panic: Vec<bool>,
}

/// Read-only view of the latest published snapshot
#[derive(Debug, Clone)]
pub struct SensorHandle {
    rx: watch::Receiver<SensorSnapshot>,
}

impl SensorHandle {
    /// Handle fed directly by the returned sender
    pub fn channel(initial: SensorSnapshot) -> (watch::Sender<SensorSnapshot>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self { rx })
    }

    /// Latest complete snapshot
    pub fn snapshot(&self) -> SensorSnapshot {
        *self.rx.borrow()
    }
}

/// Background fusion task owning the sensor source
pub struct SensorFusion<S> {
    source: Arc<Mutex<S>>,
    filter: DistanceFilter,
    config: FusionConfig,
    last: SensorSnapshot,
    tx: watch::Sender<SensorSnapshot>,
}

impl<S: SensorSource + 'static> SensorFusion<S> {
    pub fn new(source: S, config: FusionConfig) -> (Self, SensorHandle) {
        let initial = SensorSnapshot::clear(config.failure_distance_cm);
        let (tx, handle) = SensorHandle::channel(initial);
        let fusion = Self {
            source: Arc::new(Mutex::new(source)),
            filter: DistanceFilter::new(&config),
            config,
            last: initial,
            tx,
        };
        (fusion, handle)
    }

    /// Spawn onto the current tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Fixed-cadence loop. Ends once every SensorHandle is dropped.
    pub async fn run(mut self) {
        info!(
            "Sensor fusion started: {}ms period, alpha={}",
            self.config.period_ms, self.config.alpha
        );
        let mut tick = interval(self.config.period());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.tx.is_closed() {
            tick.tick().await;
            let reading = self.read().await;
            let snapshot = self.fuse(reading);
            self.tx.send_replace(snapshot);
        }
        debug!("Sensor fusion stopped");
    }

    /// Read every sensor on a blocking thread, bounded by `read_timeout`.
    /// A read still stuck from a previous tick makes this tick a miss.
    async fn read(&self) -> Option<RawReading> {
        let source = Arc::clone(&self.source);
        let task = tokio::task::spawn_blocking(move || {
            let mut source = source.try_lock().ok()?;
            Some(RawReading {
                distance: source.read_distance_cm(),
                line: source.read_line_channels(),
                panic: source.read_panic_inputs(),
            })
        });

        match timeout(self.config.read_timeout(), task).await {
            Ok(Ok(reading)) => reading,
            Ok(Err(e)) => {
                warn!("Sensor read task failed: {}", e);
                None
            }
            Err(_) => {
                debug!("Sensor read exceeded {}ms", self.config.read_timeout_ms);
                None
            }
        }
    }

    /// Fold one reading into a new snapshot. A missed read counts as a
    /// ranging glitch and keeps the previous line and panic state.
    fn fuse(&mut self, reading: Option<RawReading>) -> SensorSnapshot {
        let snapshot = match reading {
            Some(reading) => SensorSnapshot {
                distance_cm: self.filter.update(reading.distance),
                panic: panic_from(&reading.panic),
                line_mask: reading.line,
            },
            None => SensorSnapshot {
                distance_cm: self.filter.update(None),
                ..self.last
            },
        };
        if snapshot.panic && !self.last.panic {
            warn!("Panic input triggered");
        }
        self.last = snapshot;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::source::{NullSensors, ScriptedSensors};
    use std::time::Duration;

    fn filter() -> DistanceFilter {
        DistanceFilter::new(&FusionConfig::default())
    }

    #[test]
    fn test_first_sample_seeds_filter() {
        let mut f = filter();
        assert_eq!(f.update(Some(50.0)), 50.0);
    }

    #[test]
    fn test_output_stays_within_input_range() {
        let mut f = filter();
        let samples = [40.0, 80.0, 55.0, 61.0, 42.0, 79.0, 70.0, 44.0];
        let (lo, hi) = (40.0, 80.0);
        for &s in &samples {
            let out = f.update(Some(s));
            assert!(out >= lo && out <= hi, "{} outside [{}, {}]", out, lo, hi);
        }
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut f = filter();
        f.update(Some(200.0));
        let mut prev_err = f64::MAX;
        for _ in 0..30 {
            let err = (f.update(Some(30.0)) - 30.0).abs();
            assert!(err <= prev_err);
            prev_err = err;
        }
        assert!(prev_err < 1e-3);
    }

    #[test]
    fn test_glitches_keep_previous_value() {
        let mut f = filter();
        f.update(Some(60.0));
        assert_eq!(f.update(Some(1.0)), 60.0);
        assert_eq!(f.update(Some(450.0)), 60.0);
        assert_eq!(f.update(None), 60.0);
        assert_eq!(f.update(Some(f64::NAN)), 60.0);
        assert!(!f.is_failed());
    }

    #[test]
    fn test_total_failure_reports_large_distance() {
        let config = FusionConfig {
            max_consecutive_faults: 3,
            ..FusionConfig::default()
        };
        let mut f = DistanceFilter::new(&config);
        f.update(Some(12.0));
        f.update(None);
        f.update(None);
        assert_eq!(f.value(), 12.0);
        assert_eq!(f.update(None), config.failure_distance_cm);
        assert!(f.is_failed());

        // Recovery re-seeds from the fresh sample
        assert_eq!(f.update(Some(90.0)), 90.0);
        assert!(!f.is_failed());
    }

    #[test]
    fn test_no_sensor_reports_large_distance() {
        let f = filter();
        assert_eq!(f.value(), FusionConfig::default().failure_distance_cm);
    }

    #[test]
    fn test_panic_or() {
        assert!(!panic_from(&[]));
        assert!(!panic_from(&[false, false]));
        assert!(panic_from(&[false, true]));
    }

    #[test]
    fn test_fuse_missed_read_keeps_line_and_panic() {
        let mut sensors = ScriptedSensors::new([Some(25.0)]);
        sensors.line = [false, false, true, false, false];
        sensors.panic = vec![true];
        let (mut fusion, _handle) = SensorFusion::new(sensors, FusionConfig::default());

        let first = fusion.fuse(Some(RawReading {
            distance: Some(25.0),
            line: [false, false, true, false, false],
            panic: vec![true],
        }));
        let missed = fusion.fuse(None);
        assert_eq!(missed.distance_cm, first.distance_cm);
        assert_eq!(missed.line_mask, first.line_mask);
        assert!(missed.panic);
    }

    #[test]
    fn test_snapshot_masking() {
        let snapshot = SensorSnapshot {
            distance_cm: 50.0,
            panic: false,
            line_mask: [true; LINE_CHANNELS],
        };
        let masked = snapshot.masked(SensorMask([false, true, true, true, false]));
        assert_eq!(masked.line_mask, [false, true, true, true, false]);
        assert_eq!(masked.distance_cm, 50.0);
    }

    #[tokio::test]
    async fn test_fusion_task_publishes() {
        let mut sensors = ScriptedSensors::new([Some(100.0)]);
        sensors.line = [false, true, false, false, false];
        sensors.panic = vec![false, true];
        let config = FusionConfig {
            period_ms: 5,
            read_timeout_ms: 50,
            ..FusionConfig::default()
        };
        let (fusion, handle) = SensorFusion::new(sensors, config);
        let task = fusion.spawn();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let snapshot = handle.snapshot();
        assert!((snapshot.distance_cm - 100.0).abs() < 1e-9);
        assert!(snapshot.panic);
        assert_eq!(snapshot.line_mask, [false, true, false, false, false]);

        task.abort();
    }

    #[tokio::test]
    async fn test_missing_hardware_degrades_to_safe_defaults() {
        let config = FusionConfig {
            period_ms: 5,
            read_timeout_ms: 50,
            ..FusionConfig::default()
        };
        let (fusion, handle) = SensorFusion::new(NullSensors, config);
        let task = fusion.spawn();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot, SensorSnapshot::clear(config.failure_distance_cm));

        task.abort();
    }
}
