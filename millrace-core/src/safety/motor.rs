//! Per-motor safety state machine
//!
//! Status is recomputed from fresh readings on every update; nothing is
//! latched. Evaluation order is fixed:
//!
//! 1. Probe not trustworthy → `SensorFault`, duty 0
//! 2. Temperature or current at/above critical → `Critical`, duty 0
//! 3. Temperature at/above warning → `Warning`, last applied duty kept
//! 4. Otherwise `Normal`, commanded duty applied
//!
//! Readings and status are published to the input registers on every
//! update regardless of the outcome.

use millrace_hal::pwm::PwmBank;

use super::probe::ProbeMonitor;
use crate::pwm::PwmEngine;
use crate::registers::{RegisterMap, TEMPERATURE_DISCONNECTED};
use crate::traits::{SensorError, TemperatureProbe};
use crate::MAX_DUTY;

/// Motor status as published in the status input registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum MotorStatus {
    Normal = 0,
    Warning = 1,
    Critical = 2,
    SensorFault = 3,
}

/// Thresholds shared by every motor, read from the holding registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorLimits {
    /// centi-°C
    pub temp_critical: i16,
    /// centi-°C
    pub temp_warning: i16,
    /// mA
    pub current_critical: u16,
}

impl MotorLimits {
    pub fn from_registers(regs: &RegisterMap) -> Self {
        let layout = regs.layout();
        Self {
            temp_critical: regs.holding_i16(layout.motor_temp_critical),
            temp_warning: regs.holding_i16(layout.motor_temp_warning),
            current_critical: regs.holding(layout.motor_current_critical),
        }
    }
}

/// Classify one set of readings
pub fn classify(temperature: Option<i16>, current_ma: u16, limits: &MotorLimits) -> MotorStatus {
    let Some(temperature) = temperature else {
        return MotorStatus::SensorFault;
    };
    if temperature >= limits.temp_critical || current_ma >= limits.current_critical {
        MotorStatus::Critical
    } else if temperature >= limits.temp_warning {
        MotorStatus::Warning
    } else {
        MotorStatus::Normal
    }
}

/// Protection state of one motor channel
pub struct MotorSafety<P: TemperatureProbe> {
    id: usize,
    probe: ProbeMonitor<P>,
    status: MotorStatus,
    /// Duty currently on the PWM output (permille)
    applied_duty: u16,
    current_ma: u16,
}

impl<P: TemperatureProbe> MotorSafety<P> {
    /// Create the record for motor `id`; it starts in `SensorFault` until
    /// the probe has delivered a reading
    pub fn new(id: usize, probe: P) -> Self {
        Self {
            id,
            probe: ProbeMonitor::new(probe),
            status: MotorStatus::SensorFault,
            applied_duty: 0,
            current_ma: 0,
        }
    }

    pub fn begin(&mut self) -> Result<(), SensorError> {
        self.probe.begin()
    }

    /// Evaluate fresh readings, enforce the resulting duty and publish
    pub fn update<B: PwmBank>(
        &mut self,
        current_ma: u16,
        regs: &mut RegisterMap,
        pwm: &mut PwmEngine<B>,
    ) -> MotorStatus {
        let limits = MotorLimits::from_registers(regs);
        let layout = *regs.layout();

        self.current_ma = current_ma;
        self.status = classify(self.probe.celsius(), current_ma, &limits);

        let duty = match self.status {
            MotorStatus::Normal => regs.holding(layout.duty(self.id)).min(MAX_DUTY),
            MotorStatus::Warning => self.applied_duty,
            MotorStatus::Critical | MotorStatus::SensorFault => 0,
        };
        self.applied_duty = pwm.set_duty(self.id, duty);

        regs.set_input(layout.current(self.id), current_ma);
        self.publish_temperature(regs);
        regs.set_input(layout.status(self.id), self.status as u16);
        self.status
    }

    /// Apply a master duty command between updates
    ///
    /// Only a healthy motor takes a new duty immediately; a stop is always
    /// applied. Otherwise the next update decides.
    pub fn command_duty<B: PwmBank>(&mut self, duty: u16, pwm: &mut PwmEngine<B>) {
        if self.status == MotorStatus::Normal || duty == 0 {
            self.applied_duty = pwm.set_duty(self.id, duty);
        }
    }

    /// Start a temperature conversion if none is in flight
    pub fn request_conversion(&mut self, now_ms: u32) {
        self.probe.request(now_ms);
    }

    /// Consume a finished conversion and publish the temperature
    pub fn poll_probe(&mut self, now_ms: u32, regs: &mut RegisterMap) {
        self.probe.poll(now_ms);
        self.publish_temperature(regs);
    }

    fn publish_temperature(&self, regs: &mut RegisterMap) {
        let address = regs.layout().temperature(self.id);
        let value = self.probe.celsius().unwrap_or(TEMPERATURE_DISCONNECTED);
        regs.set_input_i16(address, value);
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> MotorStatus {
        self.status
    }

    pub fn applied_duty(&self) -> u16 {
        self.applied_duty
    }

    pub fn current_ma(&self) -> u16 {
        self.current_ma
    }

    pub fn probe(&self) -> &ProbeMonitor<P> {
        &self.probe
    }

    pub fn probe_mut(&mut self) -> &mut ProbeMonitor<P> {
        &mut self.probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, PwmLimits};
    use crate::pwm::PwmChannel;
    use crate::timebase::TimeBase;
    use crate::traits::UNREADABLE_MA;
    use millrace_hal::pwm::{CounterTiming, PwmOutput, TickSource};
    use proptest::prelude::*;

    const LIMITS: MotorLimits = MotorLimits {
        temp_critical: 6000,
        temp_warning: 5000,
        current_critical: 900,
    };

    /// Probe that completes instantly with a settable reading
    struct FixedProbe(Result<i16, SensorError>);

    impl TemperatureProbe for FixedProbe {
        fn begin(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn request_conversion(&mut self, _now_ms: u32) -> Result<(), SensorError> {
            Ok(())
        }

        fn is_conversion_complete(&mut self, _now_ms: u32) -> bool {
            true
        }

        fn read_centi_celsius(&mut self) -> Result<i16, SensorError> {
            self.0
        }

        fn min_conversion_interval_ms(&self) -> u32 {
            0
        }
    }

    /// One counter per channel, compare values recorded
    #[derive(Default)]
    struct MockBank {
        compares: [u16; 15],
    }

    impl PwmBank for MockBank {
        fn counter_count(&self) -> usize {
            15
        }

        fn reconfigure(&mut self, _counter: usize, _divider: u8, _top: u16) {}

        fn set_compare(&mut self, counter: usize, _output: PwmOutput, compare: u16) {
            self.compares[counter] = compare;
        }
    }

    struct StoppedTicks;

    impl TickSource for StoppedTicks {
        fn counter(&self) -> u16 {
            0
        }

        fn wrap_pending(&self) -> bool {
            false
        }

        fn overflows(&self) -> u32 {
            0
        }

        fn acknowledge_wrap(&mut self) {}
    }

    static CHANNELS: [PwmChannel; 15] = {
        let mut table = [PwmChannel::new(0, PwmOutput::A); 15];
        let mut i = 0;
        while i < 15 {
            table[i] = PwmChannel::new(i as u8, PwmOutput::A);
            i += 1;
        }
        table
    };

    struct Fixture {
        regs: RegisterMap,
        pwm: PwmEngine<MockBank>,
        motor: MotorSafety<FixedProbe>,
    }

    fn fixture(temperature: Result<i16, SensorError>) -> Fixture {
        let config = DeviceConfig::default();
        let mut regs = RegisterMap::new(config.registers);
        regs.load_defaults(&config);
        let timing = CounterTiming {
            clock_hz: 1_000_000,
            max_top: 999,
            max_divider: 1,
        };
        let mut pwm = PwmEngine::new(MockBank::default(), timing, PwmLimits::default(), &CHANNELS);
        let mut tb = TimeBase::new(StoppedTicks, timing.clock_hz, 1, 999);
        pwm.initialize(&mut tb);

        let mut motor = MotorSafety::new(3, FixedProbe(temperature));
        motor.request_conversion(0);
        motor.poll_probe(0, &mut regs);
        Fixture { regs, pwm, motor }
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(classify(None, 5000, &LIMITS), MotorStatus::SensorFault);
        assert_eq!(classify(Some(6000), 0, &LIMITS), MotorStatus::Critical);
        assert_eq!(classify(Some(2000), 900, &LIMITS), MotorStatus::Critical);
        assert_eq!(classify(Some(5500), 100, &LIMITS), MotorStatus::Warning);
        assert_eq!(classify(Some(4999), 899, &LIMITS), MotorStatus::Normal);
        assert_eq!(classify(Some(2000), UNREADABLE_MA, &LIMITS), MotorStatus::Critical);
    }

    #[test]
    fn test_starts_in_sensor_fault() {
        let motor = MotorSafety::new(0, FixedProbe(Ok(2000)));
        assert_eq!(motor.status(), MotorStatus::SensorFault);
        assert_eq!(motor.applied_duty(), 0);
    }

    #[test]
    fn test_normal_applies_commanded_duty() {
        let mut f = fixture(Ok(2500));
        f.regs.set_holding(3, 1000);

        assert_eq!(f.motor.update(100, &mut f.regs, &mut f.pwm), MotorStatus::Normal);
        assert_eq!(f.motor.applied_duty(), 1000);
        assert_eq!(f.pwm.bank().compares[3], 999);
        assert_eq!(f.regs.input(203), 100);
        assert_eq!(f.regs.input_i16(303), 2500);
        assert_eq!(f.regs.input(403), 0);
    }

    #[test]
    fn test_commanded_duty_clamped() {
        let mut f = fixture(Ok(2500));
        f.regs.set_holding(3, 4000);
        f.motor.update(0, &mut f.regs, &mut f.pwm);
        assert_eq!(f.motor.applied_duty(), 1000);
    }

    #[test]
    fn test_overcurrent_forces_zero_every_update() {
        let mut f = fixture(Ok(2500));
        f.regs.set_holding(3, 800);
        f.motor.update(100, &mut f.regs, &mut f.pwm);
        assert_eq!(f.motor.applied_duty(), 800);

        for _ in 0..3 {
            assert_eq!(f.motor.update(950, &mut f.regs, &mut f.pwm), MotorStatus::Critical);
            assert_eq!(f.motor.applied_duty(), 0);
            assert_eq!(f.pwm.bank().compares[3], 0);
            assert_eq!(f.regs.input(403), 2);
            assert_eq!(f.regs.input(203), 950);
        }

        // Level-triggered: recovers as soon as the current drops
        assert_eq!(f.motor.update(100, &mut f.regs, &mut f.pwm), MotorStatus::Normal);
        assert_eq!(f.motor.applied_duty(), 800);
    }

    #[test]
    fn test_sensor_fault_forces_zero() {
        let mut f = fixture(Err(SensorError::CrcMismatch));
        f.regs.set_holding(3, 500);

        assert_eq!(f.motor.update(0, &mut f.regs, &mut f.pwm), MotorStatus::SensorFault);
        assert_eq!(f.motor.applied_duty(), 0);
        assert_eq!(f.regs.input_i16(303), TEMPERATURE_DISCONNECTED);
        assert_eq!(f.regs.input(403), 3);
    }

    #[test]
    fn test_warning_keeps_last_duty() {
        let mut f = fixture(Ok(2500));
        f.regs.set_holding(3, 600);
        f.motor.update(0, &mut f.regs, &mut f.pwm);

        f.motor.probe_mut().probe_mut().0 = Ok(5500);
        f.motor.request_conversion(1000);
        f.motor.poll_probe(1000, &mut f.regs);
        f.regs.set_holding(3, 900);

        assert_eq!(f.motor.update(0, &mut f.regs, &mut f.pwm), MotorStatus::Warning);
        assert_eq!(f.motor.applied_duty(), 600);
    }

    #[test]
    fn test_thresholds_follow_registers() {
        let mut f = fixture(Ok(4000));
        f.regs.set_holding(3, 500);
        f.regs.set_holding_i16(500, 3500);

        assert_eq!(f.motor.update(0, &mut f.regs, &mut f.pwm), MotorStatus::Critical);
        assert_eq!(f.motor.applied_duty(), 0);
    }

    #[test]
    fn test_command_duty_only_when_normal() {
        let mut f = fixture(Ok(2500));
        f.motor.update(950, &mut f.regs, &mut f.pwm);

        f.motor.command_duty(700, &mut f.pwm);
        assert_eq!(f.motor.applied_duty(), 0);

        f.motor.update(0, &mut f.regs, &mut f.pwm);
        f.motor.command_duty(700, &mut f.pwm);
        assert_eq!(f.motor.applied_duty(), 700);

        f.motor.command_duty(0, &mut f.pwm);
        assert_eq!(f.motor.applied_duty(), 0);
    }

    proptest! {
        #[test]
        fn prop_critical_readings_always_stop(
            temperature in -5000i16..12000,
            current in 0u16..3000,
            commanded in any::<u16>(),
        ) {
            let mut f = fixture(Ok(temperature));
            f.regs.set_holding(3, commanded);
            let status = f.motor.update(current, &mut f.regs, &mut f.pwm);

            if temperature >= 6000 || current >= 900 {
                prop_assert_eq!(status, MotorStatus::Critical);
                prop_assert_eq!(f.motor.applied_duty(), 0);
            }
            prop_assert!(f.motor.applied_duty() <= MAX_DUTY);
        }
    }
}
