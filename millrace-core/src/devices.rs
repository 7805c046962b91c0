//! Auxiliary actuator control
//!
//! The fan follows air temperature, the mixer and dispenser follow water
//! temperature, and the pump runs while any motor is expected to turn.
//! Every decision is written both to the output and to its echo input
//! register.

use crate::config::ThresholdPolicy;
use crate::registers::{RegisterMap, TEMPERATURE_DISCONNECTED};
use crate::safety::MotorStatus;
use crate::traits::Actuator;
use crate::MOTOR_COUNT;

/// Managed actuators, in register order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Device {
    Fan,
    Mixer,
    Dispenser,
    Pump,
}

impl Device {
    pub const ALL: [Device; 4] = [Device::Fan, Device::Mixer, Device::Dispenser, Device::Pump];

    pub const fn index(self) -> usize {
        match self {
            Device::Fan => 0,
            Device::Mixer => 1,
            Device::Dispenser => 2,
            Device::Pump => 3,
        }
    }
}

/// Threshold-driven control of the four actuators
pub struct DeviceManager<A: Actuator> {
    outputs: [A; 4],
    /// Comparison used for the fan and the mixer
    policy: ThresholdPolicy,
}

impl<A: Actuator> DeviceManager<A> {
    /// `outputs` are indexed by [`Device::index`]
    pub fn new(outputs: [A; 4], policy: ThresholdPolicy) -> Self {
        Self { outputs, policy }
    }

    pub fn begin(&mut self, regs: &mut RegisterMap) {
        self.all_off(regs);
    }

    /// Drive one actuator and publish its state
    pub fn set(&mut self, device: Device, on: bool, regs: &mut RegisterMap) {
        self.outputs[device.index()].set_on(on);
        let address = regs.layout().device_state(device);
        regs.set_input(address, on as u16);
    }

    pub fn all_off(&mut self, regs: &mut RegisterMap) {
        for device in Device::ALL {
            self.set(device, false, regs);
        }
    }

    pub fn is_on(&self, device: Device) -> bool {
        self.outputs[device.index()].is_on()
    }

    /// Re-evaluate every actuator from the latest readings
    ///
    /// `None` temperatures come from disconnected probes and never engage
    /// an actuator.
    pub fn update(
        &mut self,
        air: Option<i16>,
        water: Option<i16>,
        statuses: &[MotorStatus; MOTOR_COUNT],
        regs: &mut RegisterMap,
    ) {
        let layout = *regs.layout();
        regs.set_input_i16(layout.air_temperature, air.unwrap_or(TEMPERATURE_DISCONNECTED));
        regs.set_input_i16(layout.water_temperature, water.unwrap_or(TEMPERATURE_DISCONNECTED));

        let air_low = regs.holding_i16(layout.air_temp_low);
        let air_high = regs.holding_i16(layout.air_temp_high);
        let water_low = regs.holding_i16(layout.water_temp_low);
        let water_high = regs.holding_i16(layout.water_temp_high);

        let fan = self.policy.engaged(air, air_low, air_high);
        let mixer = self.policy.engaged(water, water_low, water_high);
        let dispenser = ThresholdPolicy::UpperOnly.engaged(water, water_low, water_high);
        let pump = statuses
            .iter()
            .enumerate()
            .any(|(motor, &status)| status < MotorStatus::Critical && regs.holding(layout.duty(motor)) > 0);

        self.set(Device::Fan, fan, regs);
        self.set(Device::Mixer, mixer, regs);
        self.set(Device::Dispenser, dispenser, regs);
        self.set(Device::Pump, pump, regs);
    }
}
