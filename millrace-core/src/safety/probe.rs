//! Temperature probe monitor
//!
//! Drives one [`TemperatureProbe`] through request/poll cycles without
//! blocking and tracks whether it is still answering.

use crate::traits::{SensorError, TemperatureProbe};

/// Consecutive conversions that never completed before a probe is
/// declared disconnected
pub const MAX_MISSED_CONVERSIONS: u8 = 3;

/// Non-blocking conversion tracker for one probe
pub struct ProbeMonitor<P: TemperatureProbe> {
    probe: P,
    /// A conversion has been requested and not yet consumed
    pending: bool,
    requested_at_ms: u32,
    missed: u8,
    reading: Result<i16, SensorError>,
}

impl<P: TemperatureProbe> ProbeMonitor<P> {
    /// Wrap a probe; it reads as disconnected until the first conversion
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            pending: false,
            requested_at_ms: 0,
            missed: 0,
            reading: Err(SensorError::Disconnected),
        }
    }

    pub fn begin(&mut self) -> Result<(), SensorError> {
        self.probe.begin().inspect_err(|&e| self.reading = Err(e))
    }

    /// Request a conversion unless one is still legitimately in flight
    ///
    /// A finished conversion is consumed first. One that is still running
    /// after the probe's minimum interval counts as missed and is
    /// superseded.
    pub fn request(&mut self, now_ms: u32) {
        if self.pending {
            if self.probe.is_conversion_complete(now_ms) {
                self.consume();
            } else if now_ms.wrapping_sub(self.requested_at_ms)
                < self.probe.min_conversion_interval_ms()
            {
                return;
            } else {
                self.pending = false;
                self.missed = self.missed.saturating_add(1);
                if self.missed >= MAX_MISSED_CONVERSIONS {
                    self.reading = Err(SensorError::Disconnected);
                }
            }
        }

        match self.probe.request_conversion(now_ms) {
            Ok(()) => {
                self.pending = true;
                self.requested_at_ms = now_ms;
            }
            Err(e) => self.reading = Err(e),
        }
    }

    /// Consume a finished conversion; returns whether one was read
    pub fn poll(&mut self, now_ms: u32) -> bool {
        if self.pending && self.probe.is_conversion_complete(now_ms) {
            self.consume();
            return true;
        }
        false
    }

    fn consume(&mut self) {
        self.pending = false;
        self.reading = self.probe.read_centi_celsius();
        if self.reading.is_ok() {
            self.missed = 0;
        }
    }

    /// Last reading in centi-°C, or why there is none
    pub fn reading(&self) -> Result<i16, SensorError> {
        self.reading
    }

    /// Last reading, `None` while the probe is not trustworthy
    pub fn celsius(&self) -> Option<i16> {
        self.reading.ok()
    }

    pub fn missed(&self) -> u8 {
        self.missed
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Probe whose conversions finish after a fixed time, or never
    struct MockProbe {
        temperature: Result<i16, SensorError>,
        conversion_ms: Option<u32>,
        started_at: u32,
        requests: usize,
        fail_request: bool,
    }

    impl MockProbe {
        fn new(temperature: i16) -> Self {
            Self {
                temperature: Ok(temperature),
                conversion_ms: Some(188),
                started_at: 0,
                requests: 0,
                fail_request: false,
            }
        }
    }

    impl TemperatureProbe for MockProbe {
        fn begin(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn request_conversion(&mut self, now_ms: u32) -> Result<(), SensorError> {
            if self.fail_request {
                return Err(SensorError::NotPresent);
            }
            self.started_at = now_ms;
            self.requests += 1;
            Ok(())
        }

        fn is_conversion_complete(&mut self, now_ms: u32) -> bool {
            self.conversion_ms
                .is_some_and(|ms| now_ms.wrapping_sub(self.started_at) >= ms)
        }

        fn read_centi_celsius(&mut self) -> Result<i16, SensorError> {
            self.temperature
        }

        fn min_conversion_interval_ms(&self) -> u32 {
            750
        }
    }

    #[test]
    fn test_disconnected_until_first_reading() {
        let monitor = ProbeMonitor::new(MockProbe::new(2500));
        assert_eq!(monitor.reading(), Err(SensorError::Disconnected));
        assert_eq!(monitor.celsius(), None);
    }

    #[test]
    fn test_request_then_poll() {
        let mut monitor = ProbeMonitor::new(MockProbe::new(2500));
        monitor.request(0);
        assert!(!monitor.poll(100));
        assert!(monitor.poll(200));
        assert_eq!(monitor.celsius(), Some(2500));
        assert!(!monitor.is_pending());
    }

    #[test]
    fn test_request_idempotent_while_converting() {
        let mut monitor = ProbeMonitor::new(MockProbe {
            conversion_ms: Some(500),
            ..MockProbe::new(2500)
        });
        monitor.request(0);
        monitor.request(100);
        monitor.request(400);
        assert_eq!(monitor.probe().requests, 1);
    }

    #[test]
    fn test_completed_conversion_consumed_before_new_request() {
        let mut monitor = ProbeMonitor::new(MockProbe::new(3100));
        monitor.request(0);
        // Never polled; the next request reads the finished result first
        monitor.request(1000);
        assert_eq!(monitor.celsius(), Some(3100));
        assert_eq!(monitor.probe().requests, 2);
        assert!(monitor.is_pending());
    }

    #[test]
    fn test_three_missed_conversions_disconnect() {
        let mut monitor = ProbeMonitor::new(MockProbe::new(2500));
        monitor.request(0);
        assert!(monitor.poll(200));

        monitor.probe_mut().conversion_ms = None;
        monitor.request(1000);
        monitor.request(2000);
        monitor.request(3000);
        assert_eq!(monitor.missed(), 2);
        assert_eq!(monitor.celsius(), Some(2500));

        monitor.request(4000);
        assert_eq!(monitor.missed(), 3);
        assert_eq!(monitor.reading(), Err(SensorError::Disconnected));

        // Probe comes back
        monitor.probe_mut().conversion_ms = Some(188);
        assert!(monitor.poll(4200));
        assert_eq!(monitor.celsius(), Some(2500));
        assert_eq!(monitor.missed(), 0);
    }

    #[test]
    fn test_request_failure_is_immediate() {
        let mut monitor = ProbeMonitor::new(MockProbe::new(2500));
        monitor.request(0);
        monitor.poll(200);
        monitor.probe_mut().fail_request = true;
        monitor.request(1000);
        assert_eq!(monitor.reading(), Err(SensorError::NotPresent));
        assert!(!monitor.is_pending());
    }

    #[test]
    fn test_elapsed_survives_millisecond_wraparound() {
        let mut monitor = ProbeMonitor::new(MockProbe {
            conversion_ms: Some(500),
            ..MockProbe::new(2500)
        });
        monitor.request(u32::MAX - 100);
        monitor.request(200);
        assert_eq!(monitor.probe().requests, 1);
        assert!(monitor.poll(400));
    }
}
