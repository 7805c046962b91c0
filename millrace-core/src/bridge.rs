//! Modbus bridge
//!
//! Connects the serial line, the Modbus slave and the register map, and
//! turns master writes into calls on a [`WriteHandler`].
//!
//! The slave only ever touches registers. After each poll the bridge diffs
//! every watched holding register against a shadow copy; a changed value
//! (or a master write that repeated the old value) is dispatched to the
//! handler and the shadow is updated.
//!
//! # Recovery
//!
//! Line faults and undecodable frames are counted. A decoded frame clears
//! the count; once it exceeds the configured limit the line is
//! reinitialised and the recovery counter register is incremented.

use heapless::Vec;
use millrace_hal::serial::{SerialConfig, SerialLine};
use millrace_protocol::{Reply, Slave, MAX_ADU_SIZE};

use crate::config::{ModbusConfig, RegisterLayout};
use crate::devices::Device;
use crate::registers::RegisterMap;
use crate::MOTOR_COUNT;

/// Watched holding registers: duties, frequency, devices, start/stop
pub const MAX_WATCHES: usize = MOTOR_COUNT + 1 + Device::ALL.len() + 1;

/// Start/stop value that triggers an emergency stop
pub const SYSTEM_STOP: u16 = 0;

/// Start/stop value that restarts the published elapsed time
pub const SYSTEM_RESET_EPOCH: u16 = 1;

/// What a watched register controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteTarget {
    Motor(u8),
    Frequency,
    Device(Device),
    System,
}

#[derive(Debug, Clone, Copy)]
struct Watch {
    address: u16,
    target: WriteTarget,
    shadow: u16,
}

/// Receiver of master writes found by the diff pass
pub trait WriteHandler {
    /// Commanded duty of one motor changed (permille, unclamped)
    fn motor_write(&mut self, motor: usize, duty: u16, regs: &mut RegisterMap);

    /// Global PWM frequency changed (Hz)
    fn frequency_write(&mut self, hz: u16, regs: &mut RegisterMap);

    /// Manual actuator command
    fn device_write(&mut self, device: Device, value: u16, regs: &mut RegisterMap);

    /// Start/stop register written
    fn system_write(&mut self, value: u16, regs: &mut RegisterMap);
}

/// Result of one [`ModbusBridge::task`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskOutcome {
    /// No complete frame was waiting
    Idle,
    /// Request answered
    Served,
    /// Broadcast applied without a response
    Broadcast,
    /// Frame for another slave
    Ignored,
    /// Line fault or undecodable frame, counted
    FramingError,
    /// Too many consecutive errors; the line was reinitialised
    Recovered,
}

/// Modbus RTU slave bridge over a [`SerialLine`]
pub struct ModbusBridge<L: SerialLine> {
    line: L,
    config: SerialConfig,
    slave: Slave,
    max_errors: u8,
    recovery_register: u16,
    rx: [u8; MAX_ADU_SIZE],
    tx: [u8; MAX_ADU_SIZE],
    watches: Vec<Watch, MAX_WATCHES>,
    errors: u8,
    recoveries: u16,
}

impl<L: SerialLine> ModbusBridge<L> {
    pub fn new(line: L, modbus: &ModbusConfig, layout: &RegisterLayout) -> Self {
        let mut watches = Vec::new();
        let mut watch = |address: u16, target: WriteTarget| {
            // Capacity matches the number of watched registers
            let _ = watches.push(Watch {
                address,
                target,
                shadow: 0,
            });
        };
        for motor in 0..MOTOR_COUNT {
            watch(layout.duty(motor), WriteTarget::Motor(motor as u8));
        }
        watch(layout.global_frequency, WriteTarget::Frequency);
        for device in Device::ALL {
            watch(layout.device_command(device), WriteTarget::Device(device));
        }
        watch(layout.start_stop, WriteTarget::System);

        Self {
            line,
            config: SerialConfig::even_parity(modbus.baudrate),
            slave: Slave::new(modbus.slave_id),
            max_errors: modbus.max_errors,
            recovery_register: layout.recovery_count,
            rx: [0; MAX_ADU_SIZE],
            tx: [0; MAX_ADU_SIZE],
            watches,
            errors: 0,
            recoveries: 0,
        }
    }

    /// Bring up the line and take the current register values as the
    /// baseline for change detection
    pub fn begin(&mut self, regs: &mut RegisterMap) -> Result<(), L::Error> {
        self.line.configure(&self.config)?;
        for watch in self.watches.iter_mut() {
            watch.shadow = regs.holding(watch.address);
            regs.take_written(watch.address);
        }
        regs.set_input(self.recovery_register, self.recoveries);
        Ok(())
    }

    /// Poll the line once, answer any request, then dispatch changes
    pub fn task<H: WriteHandler>(&mut self, regs: &mut RegisterMap, handler: &mut H) -> TaskOutcome {
        let outcome = match self.line.poll_frame(&mut self.rx) {
            Ok(None) => TaskOutcome::Idle,
            Ok(Some(len)) => match self.slave.handle(&self.rx[..len], regs, &mut self.tx) {
                Ok(reply) => {
                    self.errors = 0;
                    match reply {
                        Reply::Respond(n) => {
                            if self.line.send(&self.tx[..n]).is_err() {
                                return self.record_error(regs);
                            }
                            TaskOutcome::Served
                        }
                        Reply::Broadcast => TaskOutcome::Broadcast,
                        Reply::Ignored => TaskOutcome::Ignored,
                    }
                }
                Err(_) => return self.record_error(regs),
            },
            Err(_) => return self.record_error(regs),
        };

        self.dispatch(regs, handler);
        outcome
    }

    fn record_error(&mut self, regs: &mut RegisterMap) -> TaskOutcome {
        self.errors = self.errors.saturating_add(1);
        if self.errors <= self.max_errors {
            return TaskOutcome::FramingError;
        }
        if self.line.configure(&self.config).is_err() {
            // Counter stays above the limit; the next error retries
            return TaskOutcome::FramingError;
        }
        self.errors = 0;
        self.recoveries = self.recoveries.wrapping_add(1);
        regs.set_input(self.recovery_register, self.recoveries);
        TaskOutcome::Recovered
    }

    /// Diff every watched register against its shadow
    ///
    /// An emergency stop rewrites the duty registers, so a second pass runs
    /// to dispatch those immediately.
    fn dispatch<H: WriteHandler>(&mut self, regs: &mut RegisterMap, handler: &mut H) {
        for _ in 0..2 {
            let mut stopped = false;
            for watch in self.watches.iter_mut() {
                let value = regs.holding(watch.address);
                let written = regs.take_written(watch.address);
                if value == watch.shadow && !written {
                    continue;
                }
                watch.shadow = value;

                match watch.target {
                    WriteTarget::Motor(motor) => handler.motor_write(motor as usize, value, regs),
                    WriteTarget::Frequency => handler.frequency_write(value, regs),
                    WriteTarget::Device(device) => handler.device_write(device, value, regs),
                    WriteTarget::System => {
                        handler.system_write(value, regs);
                        stopped |= value == SYSTEM_STOP;
                    }
                }
            }
            if !stopped {
                break;
            }
        }
    }

    /// Consecutive errors since the last decoded frame
    pub fn error_count(&self) -> u8 {
        self.errors
    }

    /// Number of line reinitialisations
    pub fn recoveries(&self) -> u16 {
        self.recoveries
    }

    pub fn line(&self) -> &L {
        &self.line
    }

    pub fn line_mut(&mut self) -> &mut L {
        &mut self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use heapless::Deque;
    use millrace_protocol::crc16;

    type Frame = heapless::Vec<u8, MAX_ADU_SIZE>;

    enum Step {
        Frame(Frame),
        Fault,
    }

    /// Line that replays scripted frames and records responses
    #[derive(Default)]
    struct MockLine {
        script: Deque<Step, 16>,
        sent: heapless::Vec<Frame, 8>,
        configured: usize,
    }

    impl MockLine {
        fn request(&mut self, body: &[u8]) {
            let mut frame = Frame::new();
            frame.extend_from_slice(body).unwrap();
            frame.extend_from_slice(&crc16(body).to_le_bytes()).unwrap();
            let _ = self.script.push_back(Step::Frame(frame));
        }

        fn garbage(&mut self) {
            let mut frame = Frame::new();
            frame.extend_from_slice(&[0x01, 0x03, 0x00, 0x00, 0xDE, 0xAD]).unwrap();
            let _ = self.script.push_back(Step::Frame(frame));
        }

        fn fault(&mut self) {
            let _ = self.script.push_back(Step::Fault);
        }
    }

    impl SerialLine for MockLine {
        type Error = ();

        fn configure(&mut self, _config: &SerialConfig) -> Result<(), ()> {
            self.configured += 1;
            Ok(())
        }

        fn poll_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ()> {
            match self.script.pop_front() {
                None => Ok(None),
                Some(Step::Fault) => Err(()),
                Some(Step::Frame(frame)) => {
                    buf[..frame.len()].copy_from_slice(&frame);
                    Ok(Some(frame.len()))
                }
            }
        }

        fn send(&mut self, frame: &[u8]) -> Result<(), ()> {
            let mut copy = Frame::new();
            copy.extend_from_slice(frame).unwrap();
            let _ = self.sent.push(copy);
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Motor(usize, u16),
        Frequency(u16),
        Device(Device, u16),
        System(u16),
    }

    /// Handler that records calls and implements the stop semantics
    #[derive(Default)]
    struct Recorder {
        calls: heapless::Vec<Call, 64>,
    }

    impl WriteHandler for Recorder {
        fn motor_write(&mut self, motor: usize, duty: u16, _regs: &mut RegisterMap) {
            self.calls.push(Call::Motor(motor, duty)).unwrap();
        }

        fn frequency_write(&mut self, hz: u16, _regs: &mut RegisterMap) {
            self.calls.push(Call::Frequency(hz)).unwrap();
        }

        fn device_write(&mut self, device: Device, value: u16, _regs: &mut RegisterMap) {
            self.calls.push(Call::Device(device, value)).unwrap();
        }

        fn system_write(&mut self, value: u16, regs: &mut RegisterMap) {
            self.calls.push(Call::System(value)).unwrap();
            if value == SYSTEM_STOP {
                for motor in 0..MOTOR_COUNT {
                    regs.set_holding(regs.layout().duty(motor), 0);
                }
            }
        }
    }

    fn setup() -> (ModbusBridge<MockLine>, RegisterMap, Recorder) {
        let config = DeviceConfig::default();
        let mut regs = RegisterMap::new(config.registers);
        regs.load_defaults(&config);
        let mut bridge = ModbusBridge::new(MockLine::default(), &config.modbus, &config.registers);
        bridge.begin(&mut regs).unwrap();
        (bridge, regs, Recorder::default())
    }

    #[test]
    fn test_idle_poll_dispatches_nothing() {
        let (mut bridge, mut regs, mut handler) = setup();
        assert_eq!(bridge.task(&mut regs, &mut handler), TaskOutcome::Idle);
        assert!(handler.calls.is_empty());
        assert_eq!(bridge.line().configured, 1);
    }

    #[test]
    fn test_duty_write_dispatched_once() {
        let (mut bridge, mut regs, mut handler) = setup();
        bridge.line_mut().request(&[0x01, 0x06, 0x00, 0x03, 0x03, 0xE8]);

        assert_eq!(bridge.task(&mut regs, &mut handler), TaskOutcome::Served);
        assert_eq!(&handler.calls[..], &[Call::Motor(3, 1000)]);
        assert_eq!(bridge.line().sent.len(), 1);

        bridge.task(&mut regs, &mut handler);
        assert_eq!(handler.calls.len(), 1);
    }

    #[test]
    fn test_frequency_and_device_writes() {
        let (mut bridge, mut regs, mut handler) = setup();
        // Write 100 = 2000 Hz and 911 = 1 in one pass via two frames
        bridge.line_mut().request(&[0x01, 0x06, 0x00, 0x64, 0x07, 0xD0]);
        bridge.task(&mut regs, &mut handler);
        bridge.line_mut().request(&[0x01, 0x06, 0x03, 0x8F, 0x00, 0x01]);
        bridge.task(&mut regs, &mut handler);

        assert_eq!(
            &handler.calls[..],
            &[Call::Frequency(2000), Call::Device(Device::Fan, 1)]
        );
    }

    #[test]
    fn test_stop_dispatches_zeroed_duties_in_same_task() {
        let (mut bridge, mut regs, mut handler) = setup();
        bridge.line_mut().request(&[0x01, 0x06, 0x00, 0x02, 0x01, 0xF4]);
        bridge.task(&mut regs, &mut handler);
        handler.calls.clear();

        bridge.line_mut().request(&[0x01, 0x06, 0x03, 0x84, 0x00, 0x00]);
        bridge.task(&mut regs, &mut handler);
        assert_eq!(&handler.calls[..], &[Call::System(0), Call::Motor(2, 0)]);
    }

    #[test]
    fn test_repeated_stop_is_dispatched_again() {
        let (mut bridge, mut regs, mut handler) = setup();
        bridge.line_mut().request(&[0x01, 0x06, 0x03, 0x84, 0x00, 0x00]);
        bridge.task(&mut regs, &mut handler);
        bridge.line_mut().request(&[0x01, 0x06, 0x03, 0x84, 0x00, 0x00]);
        bridge.task(&mut regs, &mut handler);

        assert_eq!(&handler.calls[..], &[Call::System(0), Call::System(0)]);
    }

    #[test]
    fn test_internal_writes_are_not_dispatched_as_master_writes() {
        let (mut bridge, mut regs, mut handler) = setup();
        regs.set_holding(500, 7000);
        bridge.task(&mut regs, &mut handler);
        assert!(handler.calls.is_empty());
    }

    #[test]
    fn test_recovery_after_eleven_errors() {
        let (mut bridge, mut regs, mut handler) = setup();
        for i in 0..11 {
            if i % 2 == 0 {
                bridge.line_mut().garbage();
            } else {
                bridge.line_mut().fault();
            }
        }

        for expected in 1..=10u8 {
            assert_eq!(bridge.task(&mut regs, &mut handler), TaskOutcome::FramingError);
            assert_eq!(bridge.error_count(), expected);
        }
        assert_eq!(bridge.task(&mut regs, &mut handler), TaskOutcome::Recovered);
        assert_eq!(bridge.error_count(), 0);
        assert_eq!(bridge.recoveries(), 1);
        assert_eq!(bridge.line().configured, 2);
        assert_eq!(regs.input(940), 1);
    }

    #[test]
    fn test_decoded_frame_clears_error_count() {
        let (mut bridge, mut regs, mut handler) = setup();
        bridge.line_mut().garbage();
        bridge.line_mut().garbage();
        bridge.line_mut().request(&[0x07, 0x03, 0x00, 0x00, 0x00, 0x01]);

        bridge.task(&mut regs, &mut handler);
        bridge.task(&mut regs, &mut handler);
        assert_eq!(bridge.error_count(), 2);
        // Valid frame for another slave still proves the line is healthy
        assert_eq!(bridge.task(&mut regs, &mut handler), TaskOutcome::Ignored);
        assert_eq!(bridge.error_count(), 0);

        // Idle polls leave the count alone
        bridge.line_mut().garbage();
        bridge.task(&mut regs, &mut handler);
        bridge.task(&mut regs, &mut handler);
        assert_eq!(bridge.error_count(), 1);
    }

    #[test]
    fn test_broadcast_write_dispatched_without_reply() {
        let (mut bridge, mut regs, mut handler) = setup();
        bridge.line_mut().request(&[0x00, 0x06, 0x00, 0x00, 0x00, 0x64]);

        assert_eq!(bridge.task(&mut regs, &mut handler), TaskOutcome::Broadcast);
        assert!(bridge.line().sent.is_empty());
        assert_eq!(&handler.calls[..], &[Call::Motor(0, 100)]);
    }
}
