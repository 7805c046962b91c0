//! Control loop orchestration
//!
//! [`System`] owns every subsystem and runs one cooperative loop
//! iteration per [`System::run_once`] call:
//!
//! ```text
//! publish elapsed time ─► bridge.task
//!        │
//!        ├─ every motor period:  update motors in batches, bridge.task between batches
//!        │
//!        └─ every temperature period: request all probes ─► poll all probes
//!                                     ─► DeviceManager::update
//! ```
//!
//! Master writes reach the subsystems through [`Plant`], a short-lived view
//! over the parts of `System` the bridge does not own.

use millrace_hal::pwm::{CounterTiming, PwmBank, TickSource};
use millrace_hal::serial::SerialLine;

use crate::bridge::{ModbusBridge, TaskOutcome, WriteHandler, SYSTEM_RESET_EPOCH, SYSTEM_STOP};
use crate::config::DeviceConfig;
use crate::devices::{Device, DeviceManager};
use crate::pwm::{PwmChannel, PwmEngine};
use crate::registers::RegisterMap;
use crate::safety::{MotorSafety, MotorStatus, ProbeMonitor};
use crate::timebase::TimeBase;
use crate::traits::{Actuator, CurrentSense, TemperatureProbe};
use crate::MOTOR_COUNT;

/// Hardware handed to [`System::new`]
pub struct Board<T, B, L, P, C, A> {
    /// Counter doubling as the time source
    pub ticks: T,
    pub pwm: B,
    pub timing: CounterTiming,
    pub channels: &'static [PwmChannel; MOTOR_COUNT],
    pub line: L,
    pub motor_probes: [P; MOTOR_COUNT],
    pub air_probe: P,
    pub water_probe: P,
    pub current: C,
    /// Indexed by [`Device::index`]
    pub actuators: [A; 4],
}

/// What one loop iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    /// Outcome of the first bus poll of the iteration
    pub bridge: TaskOutcome,
    /// Any bus poll in the iteration reinitialised the line
    pub recovered: bool,
    pub motor_pass: bool,
    pub temperature_pass: bool,
}

/// The whole controller
pub struct System<T, B, L, P, C, A>
where
    T: TickSource,
    B: PwmBank,
    L: SerialLine,
    P: TemperatureProbe,
    C: CurrentSense,
    A: Actuator,
{
    config: DeviceConfig,
    regs: RegisterMap,
    timebase: TimeBase<T>,
    pwm: PwmEngine<B>,
    bridge: ModbusBridge<L>,
    motors: [MotorSafety<P>; MOTOR_COUNT],
    air: ProbeMonitor<P>,
    water: ProbeMonitor<P>,
    current: C,
    devices: DeviceManager<A>,
    last_motor_ms: Option<u64>,
    last_temperature_ms: Option<u64>,
}

impl<T, B, L, P, C, A> System<T, B, L, P, C, A>
where
    T: TickSource,
    B: PwmBank,
    L: SerialLine,
    P: TemperatureProbe,
    C: CurrentSense,
    A: Actuator,
{
    pub fn new(config: DeviceConfig, board: Board<T, B, L, P, C, A>) -> Self {
        let timing = board.timing;
        let mut id = 0;
        let motors = board.motor_probes.map(|probe| {
            let motor = MotorSafety::new(id, probe);
            id += 1;
            motor
        });

        Self {
            regs: RegisterMap::new(config.registers),
            timebase: TimeBase::new(board.ticks, timing.clock_hz, 1, timing.max_top),
            pwm: PwmEngine::new(board.pwm, timing, config.pwm, board.channels),
            bridge: ModbusBridge::new(board.line, &config.modbus, &config.registers),
            motors,
            air: ProbeMonitor::new(board.air_probe),
            water: ProbeMonitor::new(board.water_probe),
            current: board.current,
            devices: DeviceManager::new(board.actuators, config.actuator_policy),
            last_motor_ms: None,
            last_temperature_ms: None,
            config,
        }
    }

    /// Load register defaults, start PWM at the default frequency, prepare
    /// the probes, switch actuators off and bring up the bus
    ///
    /// Probe failures are not fatal; the affected motors stay in sensor
    /// fault. A bus that cannot be configured is returned as an error.
    pub fn begin(&mut self) -> Result<(), L::Error> {
        self.regs.load_defaults(&self.config);
        self.pwm.initialize(&mut self.timebase);

        for motor in self.motors.iter_mut() {
            let _ = motor.begin();
        }
        let _ = self.air.begin();
        let _ = self.water.begin();

        self.devices.begin(&mut self.regs);
        self.bridge.begin(&mut self.regs)
    }

    /// Run one loop iteration
    pub fn run_once(&mut self) -> CycleReport {
        let time_base = self.regs.layout().time_base;
        let elapsed = self.timebase.elapsed_ms();
        self.regs.publish_u64(time_base, elapsed);

        let bridge = self.service_bus();
        let mut report = CycleReport {
            bridge,
            recovered: bridge == TaskOutcome::Recovered,
            motor_pass: false,
            temperature_pass: false,
        };

        let now = self.timebase.now_ms();
        let schedule = self.config.schedule;
        if due(&mut self.last_motor_ms, now, schedule.motor_period_ms) {
            report.recovered |= self.update_motors();
            report.motor_pass = true;
        }
        if due(&mut self.last_temperature_ms, now, schedule.temperature_period_ms) {
            self.update_temperatures(now as u32);
            report.temperature_pass = true;
        }
        report
    }

    fn service_bus(&mut self) -> TaskOutcome {
        let mut plant = Plant {
            timebase: &mut self.timebase,
            pwm: &mut self.pwm,
            motors: &mut self.motors,
            devices: &mut self.devices,
        };
        self.bridge.task(&mut self.regs, &mut plant)
    }

    /// Update every motor, polling the bus between batches; returns whether
    /// any of those polls reinitialised the line
    fn update_motors(&mut self) -> bool {
        let batch = self.config.schedule.motor_batch.max(1);
        let mut recovered = false;

        for start in (0..MOTOR_COUNT).step_by(batch) {
            let end = (start + batch).min(MOTOR_COUNT);
            for id in start..end {
                let current = self.current.read_milliamps(id);
                self.motors[id].update(current, &mut self.regs, &mut self.pwm);
            }
            if end < MOTOR_COUNT {
                recovered |= self.service_bus() == TaskOutcome::Recovered;
            }
        }
        recovered
    }

    fn update_temperatures(&mut self, now_ms: u32) {
        for motor in self.motors.iter_mut() {
            motor.request_conversion(now_ms);
        }
        self.air.request(now_ms);
        self.water.request(now_ms);

        for motor in self.motors.iter_mut() {
            motor.poll_probe(now_ms, &mut self.regs);
        }
        self.air.poll(now_ms);
        self.water.poll(now_ms);

        let statuses: [MotorStatus; MOTOR_COUNT] =
            core::array::from_fn(|id| self.motors[id].status());
        self.devices.update(
            self.air.celsius(),
            self.water.celsius(),
            &statuses,
            &mut self.regs,
        );
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn regs(&self) -> &RegisterMap {
        &self.regs
    }

    pub fn timebase_mut(&mut self) -> &mut TimeBase<T> {
        &mut self.timebase
    }

    pub fn pwm(&self) -> &PwmEngine<B> {
        &self.pwm
    }

    pub fn bridge(&self) -> &ModbusBridge<L> {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut ModbusBridge<L> {
        &mut self.bridge
    }

    pub fn motors(&self) -> &[MotorSafety<P>; MOTOR_COUNT] {
        &self.motors
    }

    pub fn air(&self) -> &ProbeMonitor<P> {
        &self.air
    }

    pub fn water(&self) -> &ProbeMonitor<P> {
        &self.water
    }

    pub fn devices(&self) -> &DeviceManager<A> {
        &self.devices
    }
}

/// Whether a periodic pass is due, recording `now` if it is
fn due(last: &mut Option<u64>, now: u64, period_ms: u32) -> bool {
    match *last {
        Some(previous) if now.saturating_sub(previous) < period_ms as u64 => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}

/// Write handler over the subsystems a master write can reach
pub struct Plant<'a, T, B, P, A>
where
    T: TickSource,
    B: PwmBank,
    P: TemperatureProbe,
    A: Actuator,
{
    pub timebase: &'a mut TimeBase<T>,
    pub pwm: &'a mut PwmEngine<B>,
    pub motors: &'a mut [MotorSafety<P>; MOTOR_COUNT],
    pub devices: &'a mut DeviceManager<A>,
}

impl<T, B, P, A> Plant<'_, T, B, P, A>
where
    T: TickSource,
    B: PwmBank,
    P: TemperatureProbe,
    A: Actuator,
{
    /// Zero every duty register and switch every actuator off, with
    /// interrupts masked so no partial stop is observable
    ///
    /// The outputs follow from the bridge's second diff pass, which
    /// dispatches the zeroed duty registers like any other write.
    pub fn emergency_stop(&mut self, regs: &mut RegisterMap) {
        critical_section::with(|_| {
            let layout = *regs.layout();
            for motor in self.motors.iter() {
                regs.set_holding(layout.duty(motor.id()), 0);
            }
            self.devices.all_off(regs);
        });
    }
}

impl<T, B, P, A> WriteHandler for Plant<'_, T, B, P, A>
where
    T: TickSource,
    B: PwmBank,
    P: TemperatureProbe,
    A: Actuator,
{
    fn motor_write(&mut self, motor: usize, duty: u16, _regs: &mut RegisterMap) {
        if let Some(motor) = self.motors.get_mut(motor) {
            motor.command_duty(duty, self.pwm);
        }
    }

    fn frequency_write(&mut self, hz: u16, regs: &mut RegisterMap) {
        // The read-back below is itself diffed once; it matches what runs
        if hz as u32 != self.pwm.frequency_hz() {
            // 0 is rejected by the engine and leaves the outputs unchanged
            self.pwm.set_global_frequency(hz as u32, self.timebase);
        }
        let address = regs.layout().global_frequency;
        let running = self.pwm.frequency_hz().min(u16::MAX as u32) as u16;
        regs.set_holding(address, running);
    }

    fn device_write(&mut self, device: Device, value: u16, regs: &mut RegisterMap) {
        self.devices.set(device, value != 0, regs);
    }

    fn system_write(&mut self, value: u16, regs: &mut RegisterMap) {
        match value {
            SYSTEM_STOP => self.emergency_stop(regs),
            SYSTEM_RESET_EPOCH => self.timebase.reset_epoch(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_first_call_runs() {
        let mut last = None;
        assert!(due(&mut last, 0, 500));
        assert_eq!(last, Some(0));
    }

    #[test]
    fn test_due_waits_for_period() {
        let mut last = Some(1000);
        assert!(!due(&mut last, 1499, 500));
        assert!(due(&mut last, 1500, 500));
        assert_eq!(last, Some(1500));
    }

    #[test]
    fn test_due_tolerates_clock_behind_last() {
        let mut last = Some(2000);
        assert!(!due(&mut last, 1000, 500));
    }
}
