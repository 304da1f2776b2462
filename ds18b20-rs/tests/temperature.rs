use std::time::Duration;

use ds18b20::{Ds18b20, PowerMode, ReadFailure, Resolution, Temperature};
use embedded_hal::delay::DelayNs;
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_onewire::{DeviceRom, OneWire};
use sockit_owm::{
    ControlRegister, Owm, OwmBuilder,
    sim::{SimBus, SimCycle, SimSensor},
};

/// Sums up the requested delays instead of sleeping.
#[derive(Debug, Default)]
struct RecordingDelay {
    ns: u64,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.ns += ns as u64;
    }
}

fn rom() -> DeviceRom {
    DeviceRom::new(Ds18b20::family(), [0x01, 0x02, 0x03, 0x04, 0x05, 0x06])
}

fn polling(sim: &SimBus) -> Owm<SimBus, NoopDelay> {
    OwmBuilder::default()
        .with_cycle_timeout(Duration::from_millis(2))
        .build_polling(sim.clone(), NoopDelay::new())
        .unwrap()
}

fn resets(sim: &SimBus) -> usize {
    sim.cycles()
        .iter()
        .filter(|c| matches!(c, SimCycle::Reset { .. }))
        .count()
}

#[test]
fn example_rom_code() {
    assert_eq!(
        rom().as_bytes(),
        &[0x28, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x9e]
    );
    assert!(DeviceRom::from_bytes([0x28, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xc9]).is_none());
}

#[test]
fn end_to_end_read() {
    let sim = SimBus::new();
    let idx = sim.attach(0, SimSensor::new(rom()).with_raw(0x00c8));
    let owm = polling(&sim);
    let mut delay = RecordingDelay::default();
    let mut bus = owm.acquire(0).unwrap();
    let sample = Ds18b20::new(rom()).read_temperature(&mut bus, &mut delay);
    drop(bus);
    assert_eq!(sample.as_pair(), (true, 12.5));
    assert_eq!(sample.attempts(), 1);
    assert_eq!(sample.failure(), None);
    assert_eq!(delay.ns, 1_000_000_000);
    assert_eq!(sim.sensor(idx).unwrap().conversions(), 1);
    assert_eq!(resets(&sim), 2);
}

#[test]
fn end_to_end_read_interrupt_driven() {
    let sim = SimBus::new();
    sim.attach(0, SimSensor::new(rom()).with_raw(0xff5e));
    let owm = OwmBuilder::default()
        .initialize(sim.clone(), NoopDelay::new(), Some(2))
        .unwrap();
    sim.attach_irq(owm.irq_flag().unwrap());
    let mut bus = owm.acquire(0).unwrap();
    let sample = Ds18b20::single().read_temperature(&mut bus, &mut NoopDelay::new());
    assert!(sample.success());
    assert_eq!(sample.temperature(), Some(Temperature::from_num(-10.125)));
}

#[test]
fn crc_failure_is_retried_once() {
    let sim = SimBus::new();
    let idx = sim.attach(
        0,
        SimSensor::new(rom())
            .with_raw(0x00c8)
            .with_corrupt_reads(1),
    );
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    let sample = Ds18b20::new(rom()).read_temperature(&mut bus, &mut NoopDelay::new());
    drop(bus);
    assert_eq!(sample.as_pair(), (true, 12.5));
    assert_eq!(sample.attempts(), 2);
    assert_eq!(sample.failure(), Some(ReadFailure::CrcMismatch));
    assert_eq!(sim.sensor(idx).unwrap().conversions(), 2);
}

#[test]
fn at_most_two_attempts() {
    let sim = SimBus::new();
    let idx = sim.attach(0, SimSensor::new(rom()).with_corrupt_reads(5));
    let owm = polling(&sim);
    let mut delay = RecordingDelay::default();
    let mut bus = owm.acquire(0).unwrap();
    let sample = Ds18b20::new(rom()).read_temperature(&mut bus, &mut delay);
    drop(bus);
    assert_eq!(sample.as_pair(), (false, 0.0));
    assert_eq!(sample.attempts(), 2);
    assert_eq!(sample.failure(), Some(ReadFailure::CrcMismatch));
    assert_eq!(sim.sensor(idx).unwrap().conversions(), 2);
    assert_eq!(delay.ns, 2_000_000_000);
    assert_eq!(resets(&sim), 4);
}

#[test]
fn missing_device() {
    let sim = SimBus::new();
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    let sample = Ds18b20::new(rom()).read_temperature(&mut bus, &mut NoopDelay::new());
    drop(bus);
    assert!(!sample.success());
    assert_eq!(sample.attempts(), 1);
    assert_eq!(sample.failure(), Some(ReadFailure::DeviceNotPresent));
    assert_eq!(resets(&sim), 1);
    assert_eq!(sim.cycles().len(), 1);
}

#[test]
fn stalled_controller() {
    let sim = SimBus::new();
    sim.attach(0, SimSensor::new(rom()));
    sim.set_stalled(true);
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    let sample = Ds18b20::new(rom()).read_temperature(&mut bus, &mut NoopDelay::new());
    assert!(!sample.success());
    assert_eq!(sample.attempts(), 2);
    assert_eq!(sample.failure(), Some(ReadFailure::BusTimeout));
}

#[test]
fn match_rom_selects_one_sensor() {
    let other = DeviceRom::new(Ds18b20::family(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
    let sim = SimBus::new();
    let first = sim.attach(0, SimSensor::new(rom()).with_raw(0x00c8));
    let second = sim.attach(0, SimSensor::new(other).with_raw(0xfc90));
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    let a = Ds18b20::new(rom()).read_temperature(&mut bus, &mut NoopDelay::new());
    let b = Ds18b20::new(other).read_temperature(&mut bus, &mut NoopDelay::new());
    drop(bus);
    assert_eq!(a.as_pair(), (true, 12.5));
    assert_eq!(b.as_pair(), (true, -55.0));
    assert_eq!(sim.sensor(first).unwrap().conversions(), 1);
    assert_eq!(sim.sensor(second).unwrap().conversions(), 1);
}

#[test]
fn parasite_power() {
    let sim = SimBus::new();
    sim.attach(
        0,
        SimSensor::new(rom())
            .with_raw(0x00c8)
            .with_parasite(true),
    );
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    let reader = Ds18b20::new(rom());
    assert_eq!(reader.read_power_supply(&mut bus), Ok(PowerMode::Parasite));

    // without the strong pull-up the conversion browns out and leaves the power-on value
    let sample = reader.read_temperature(&mut bus, &mut NoopDelay::new());
    assert_eq!(sample.as_pair(), (true, 85.0));

    let reader = reader.with_power_mode(PowerMode::Parasite);
    let sample = reader.read_temperature(&mut bus, &mut NoopDelay::new());
    assert_eq!(sample.as_pair(), (true, 12.5));
    assert!(!bus.strong_pullup());
}

#[test]
fn rejected_pullup() {
    let sim = SimBus::new();
    sim.attach(0, SimSensor::new(rom()).with_parasite(true));
    sim.set_pullup_stuck(true);
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    let sample = Ds18b20::new(rom())
        .with_power_mode(PowerMode::Parasite)
        .read_temperature(&mut bus, &mut NoopDelay::new());
    assert!(!sample.success());
    assert_eq!(sample.attempts(), 2);
    assert_eq!(sample.failure(), Some(ReadFailure::PullupError));
    assert!(!bus.strong_pullup());
}

#[test]
fn external_power_supply() {
    let sim = SimBus::new();
    sim.attach(0, SimSensor::new(rom()));
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    assert_eq!(
        Ds18b20::single().read_power_supply(&mut bus),
        Ok(PowerMode::External)
    );
}

#[test]
fn configure_and_read_back() {
    let sim = SimBus::new();
    let idx = sim.attach(0, SimSensor::new(rom()));
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    let reader = Ds18b20::new(rom());
    reader
        .configure(&mut bus, 30, -10, Resolution::Bits9)
        .unwrap();
    assert_eq!(sim.sensor(idx).unwrap().settings(), (30, 0xf6, 0x1f));
    let pad = reader.read_scratchpad(&mut bus).unwrap();
    assert_eq!(pad.alarm_high(), 30);
    assert_eq!(pad.alarm_low(), -10);
    assert_eq!(pad.resolution(), Some(Resolution::Bits9));
}

#[test]
fn single_drop_rom() {
    let sim = SimBus::new();
    sim.attach(0, SimSensor::new(rom()));
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    assert_eq!(bus.read_rom(), Ok(rom()));
}

#[test]
fn scratchpad_on_the_wire() {
    let sim = SimBus::new();
    sim.attach(0, SimSensor::new(rom()).with_raw(0x00c8));
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    let reader = Ds18b20::new(rom());
    reader.start_conversion(&mut bus).unwrap();
    let pad = reader.read_scratchpad(&mut bus).unwrap();
    assert_eq!(
        pad.as_bytes(),
        &[0xc8, 0x00, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0x39]
    );
}

#[test]
fn overdrive_addressing() {
    let sim = SimBus::new();
    sim.attach(0, SimSensor::new(rom()).with_raw(0x00c8));
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    bus.set_overdrive_mode(true).unwrap();
    let sample = Ds18b20::new(rom()).read_temperature(&mut bus, &mut NoopDelay::new());
    drop(bus);
    assert_eq!(sample.as_pair(), (true, 12.5));
    assert!(
        sim.writes()
            .iter()
            .map(|w| ControlRegister::from_bits(*w))
            .filter(|w| w.cyc())
            .all(|w| w.ovd())
    );
}

#[test]
fn conversion_timed_by_delay_cycles() {
    let sim = SimBus::new();
    sim.attach(
        0,
        SimSensor::new(rom())
            .with_raw(0x00c8)
            .with_parasite(true),
    );
    let owm = polling(&sim);
    let mut bus = owm.acquire(0).unwrap();
    let sample = Ds18b20::new(rom())
        .with_power_mode(PowerMode::Parasite)
        .with_conversion_delay_ms(20)
        .read_temperature_timed(&mut bus);
    drop(bus);
    assert_eq!(sample.as_pair(), (true, 12.5));
    let delays = sim
        .cycles()
        .iter()
        .filter(|c| matches!(c, SimCycle::Delay { .. }))
        .count();
    assert_eq!(delays, 20);
}
