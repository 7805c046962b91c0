//! Control loop
//!
//! Drives [`System::run_once`](millrace_core::system::System::run_once)
//! forever, yielding to the executor between passes. Motor status and
//! actuator changes are logged as they happen.

use defmt::*;
use embassy_futures::yield_now;
use millrace_core::bridge::TaskOutcome;
use millrace_core::devices::Device;
use millrace_core::safety::MotorStatus;
use millrace_core::MOTOR_COUNT;

use crate::Controller;

/// Run the controller; never returns
pub async fn control_loop(system: &mut Controller) -> ! {
    info!("Control loop running");

    let mut statuses = [MotorStatus::SensorFault; MOTOR_COUNT];
    let mut outputs = [false; Device::ALL.len()];

    loop {
        let report = system.run_once();

        if report.bridge == TaskOutcome::FramingError {
            debug!(
                "Framing error ({} consecutive)",
                system.bridge().error_count()
            );
        }
        if report.recovered {
            warn!(
                "Modbus line reinitialised after repeated errors ({} recoveries)",
                system.bridge().recoveries()
            );
        }
        if report.motor_pass {
            log_motor_changes(system, &mut statuses);
        }
        if report.temperature_pass {
            log_device_changes(system, &mut outputs);
        }

        yield_now().await;
    }
}

fn log_motor_changes(system: &Controller, last: &mut [MotorStatus; MOTOR_COUNT]) {
    for motor in system.motors() {
        let id = motor.id();
        let status = motor.status();
        if status == last[id] {
            continue;
        }

        match status {
            MotorStatus::Normal => info!("Motor {}: normal", id),
            MotorStatus::Warning => warn!(
                "Motor {}: warning, {} mA, duty held at {}",
                id,
                motor.current_ma(),
                motor.applied_duty()
            ),
            MotorStatus::Critical => error!(
                "Motor {}: critical, {} mA, stopped",
                id,
                motor.current_ma()
            ),
            MotorStatus::SensorFault => {
                error!("Motor {}: probe fault, stopped", id)
            }
        }
        last[id] = status;
    }
}

fn log_device_changes(system: &Controller, last: &mut [bool; Device::ALL.len()]) {
    let devices = system.devices();
    for device in Device::ALL {
        let on = devices.is_on(device);
        if on != last[device.index()] {
            info!("{}: {}", device, if on { "on" } else { "off" });
            last[device.index()] = on;
        }
    }
}
