//! Millrace - Multi-Motor Controller Firmware
//!
//! Main firmware binary for RP2040-based boards driving fifteen PWM
//! motors under Modbus RTU control, with per-motor temperature and current
//! protection and four threshold-driven auxiliary actuators.

#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{AnyPin, Level, Output, OutputOpenDrain};
use embassy_rp::interrupt;
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Uart};
use embassy_rp::Peri;
use embassy_time::Delay;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use millrace_core::config::{PinConfig, RomCode};
use millrace_core::system::{self, System};
use millrace_core::MOTOR_COUNT;
use millrace_drivers::{Ds18b20, GpioRelay, MuxCurrentBank, OneWire, Resolution};
use millrace_hal::serial::SerialConfig;
use millrace_hal_rp2040::pwm::{enable_wrap_interrupt, on_counter_wrap};
use millrace_hal_rp2040::serial::uart_config;
use millrace_hal_rp2040::{
    AdcInput, Board, PinBank, Rp2040PwmBank, Rs485Line, SliceTicks, CHANNELS, TIMING,
};

mod config;
mod tasks;

/// Only the current-sense input has an ADC channel wired
const ADC_PIN: u8 = 26;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

type ProbePin = OutputOpenDrain<'static>;
type Probe = Ds18b20<'static, ProbePin, Delay>;
type Relay = GpioRelay<Output<'static>>;

/// The controller as wired on this board
type Controller = System<
    SliceTicks,
    Rp2040PwmBank,
    Rs485Line<BufferedUart, Output<'static>>,
    Probe,
    MuxCurrentBank<Output<'static>, AdcInput, Delay>,
    Relay,
>;

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

// Shared by every temperature probe
static PROBE_BUS: StaticCell<RefCell<OneWire<ProbePin, Delay>>> = StaticCell::new();

#[interrupt]
fn PWM_IRQ_WRAP() {
    on_counter_wrap();
}

/// Main entry point
#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Millrace firmware starting...");

    let p = embassy_rp::init(Default::default());
    let mut board = Board::split(p);

    let config = config::load();
    let hw = config.hardware;

    // RS-485 line, 8E1
    let settings = SerialConfig::even_parity(config.device.modbus.baudrate);
    let uart = Uart::new_blocking(
        board.serial.uart,
        board.serial.tx,
        board.serial.rx,
        uart_config(&settings),
    )
    .into_buffered(
        Irqs,
        TX_BUF.init([0u8; 256]),
        RX_BUF.init([0u8; 256]),
    );
    if hw.de_pin.inverted {
        warn!("Driver enable is always active-high; ignoring '!' on de");
    }
    let driver_enable = Output::new(claim(&mut board.pins, hw.de_pin.pin, "de"), Level::Low);
    let line = Rs485Line::new(uart, driver_enable, settings);
    info!(
        "Modbus RTU slave {} at {} baud",
        config.device.modbus.slave_id, settings.baudrate
    );

    // Temperature probes
    let bus_pin = OutputOpenDrain::new(claim(&mut board.pins, hw.probes.bus_pin, "probe bus"), Level::High);
    let bus: &'static RefCell<OneWire<ProbePin, Delay>> =
        PROBE_BUS.init(RefCell::new(OneWire::new(bus_pin, Delay)));
    report_probes(bus, &hw.probes.motor_roms, hw.probes.air_rom, hw.probes.water_rom);

    let probe = |rom: Option<RomCode>| Ds18b20::new(bus, rom, Resolution::default());
    let motor_probes: [Probe; MOTOR_COUNT] = hw.probes.motor_roms.map(probe);
    let air_probe = probe(hw.probes.air_rom);
    let water_probe = probe(hw.probes.water_rom);

    // Current sensing
    if hw.current.adc_pin != ADC_PIN {
        warn!(
            "Current sense ADC is fixed to GPIO{}; ignoring GPIO{}",
            ADC_PIN, hw.current.adc_pin
        );
    }
    let select = hw
        .current
        .select_pins
        .map(|pin| Output::new(claim(&mut board.pins, pin, "mux select"), Level::Low));
    let current = MuxCurrentBank::new(select, AdcInput::new(board.analog), Delay, &hw.current);

    // Actuators, in register order
    let actuators = [
        relay(&mut board.pins, hw.fan_pin, "fan"),
        relay(&mut board.pins, hw.mixer_pin, "mixer"),
        relay(&mut board.pins, hw.dispenser_pin, "dispenser"),
        relay(&mut board.pins, hw.pump_pin, "pump"),
    ];

    let mut controller: Controller = System::new(
        config.device,
        system::Board {
            ticks: SliceTicks::new(),
            pwm: Rp2040PwmBank::new(board.motor_pwm),
            timing: TIMING,
            channels: &CHANNELS,
            line,
            motor_probes,
            air_probe,
            water_probe,
            current,
            actuators,
        },
    );

    enable_wrap_interrupt();
    if let Err(e) = controller.begin() {
        error!("Modbus line failed to start: {:?}", e);
        halt();
    }
    info!("Initialization complete");

    tasks::control_loop(&mut controller).await
}

/// Take a GPIO named in device.toml, or stop if the wiring is impossible
fn claim(pins: &mut PinBank, pin: u8, function: &str) -> Peri<'static, AnyPin> {
    match pins.take(pin) {
        Ok(p) => p,
        Err(e) => {
            error!("GPIO{} for {}: {:?}", pin, function, e);
            halt()
        }
    }
}

fn relay(pins: &mut PinBank, config: PinConfig, function: &str) -> Relay {
    let off = if config.inverted { Level::High } else { Level::Low };
    let pin = Output::new(claim(pins, config.pin, function), off);
    GpioRelay::new(pin, config.inverted)
}

/// Log the configured probes, or the address of a lone unconfigured one
fn report_probes(
    bus: &RefCell<OneWire<ProbePin, Delay>>,
    motors: &[Option<RomCode>; MOTOR_COUNT],
    air: Option<RomCode>,
    water: Option<RomCode>,
) {
    let configured = motors.iter().filter(|rom| rom.is_some()).count();
    info!(
        "{} motor probes configured, air {}, water {}",
        configured,
        air.is_some(),
        water.is_some()
    );

    if configured > 0 || air.is_some() || water.is_some() {
        return;
    }
    match bus.borrow_mut().read_rom() {
        Ok(rom) => info!("Probe on bus reads as {:02X}", rom),
        Err(e) => warn!("No probe addresses configured and none readable: {:?}", e),
    }
}

fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
