use std::{
    error::Error, fs::OpenOptions, num::ParseIntError, ptr::NonNull, thread, time::Duration,
};

use clap::Parser;
use ds18b20::{Ds18b20, PowerMode};
use embedded_hal::delay::DelayNs;
use embedded_onewire::{DeviceRom, OneWire};
use linux_embedded_hal::Delay;
use log::{debug, info, warn};
use memmap2::{MmapMut, MmapOptions};
use sockit_owm::{
    InitError, MmioRegister, Owm, OwmBuilder, Register,
    sim::{SimBus, SimSensor},
};

/// Read DS18B20 temperature sensors through a SoCkit 1-Wire master
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Physical address of the controller register (e.g., 0xff200100), mapped from /dev/mem
    #[arg(short, long, value_parser = parse_address)]
    base: Option<usize>,
    /// Number of ports implemented by the controller
    #[arg(long, default_value_t = 1)]
    ports: u8,
    /// Port the sensors are attached to
    #[arg(short, long, default_value_t = 0)]
    port: u8,
    /// Interrupt line of the controller; cycles are polled when omitted.
    /// Only with --simulate: a user process cannot service the interrupt.
    #[arg(long)]
    irq: Option<u32>,
    /// ROM code of a sensor in transmission order (e.g., 28:01:02:03:04:05:06:9e).
    /// Without any, the single sensor on the port is used.
    #[arg(short, long)]
    rom: Vec<DeviceRom>,
    /// Sensors are parasite powered; detected with Read Power Supply otherwise
    #[arg(long)]
    parasite: bool,
    /// Use a simulated controller instead of the hardware
    #[arg(short, long)]
    simulate: bool,
    /// Time conversions with delay cycles of the controller instead of the host clock
    #[arg(long)]
    hw_delay: bool,
    /// Read once and exit
    #[arg(long)]
    once: bool,
    /// Seconds between readings
    #[arg(short, long, default_value_t = 1)]
    interval: u64,
}

fn parse_address(s: &str) -> Result<usize, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// Interrupts of the hardware cannot reach [`Owm::on_interrupt`] from a user process.
fn check_interrupt(args: &Args) -> Result<(), &'static str> {
    match (args.irq, args.simulate) {
        (Some(_), false) => Err("--irq needs an interrupt handler and only works with --simulate"),
        _ => Ok(()),
    }
}

const PAGE_SIZE: usize = 4096;

/// Map the page holding the register at physical address `base` from `/dev/mem`.
///
/// The register stays valid as long as the returned mapping is alive.
fn map_register(base: usize) -> Result<(MmapMut, MmioRegister), Box<dyn Error>> {
    if base % 4 != 0 {
        return Err(format!("register address {base:#x} is not word aligned").into());
    }
    let page = base & !(PAGE_SIZE - 1);
    let file = OpenOptions::new().read(true).write(true).open("/dev/mem")?;
    // SAFETY: /dev/mem is not truncated while mapped; the page holds device registers only.
    let mut map = unsafe {
        MmapOptions::new()
            .offset(page as u64)
            .len(PAGE_SIZE)
            .map_mut(&file)?
    };
    // SAFETY: `base - page` is a word aligned offset inside the mapped page.
    let ptr = unsafe { map.as_mut_ptr().add(base - page) }.cast::<u32>();
    let ptr = NonNull::new(ptr).ok_or("mapping of /dev/mem failed")?;
    debug!("mapped register {base:#x} at {ptr:p}");
    // SAFETY: the mapping is returned along with the register and outlives every access.
    let reg = unsafe { MmioRegister::new(ptr) };
    Ok((map, reg))
}

fn build<R: Register>(
    builder: OwmBuilder,
    reg: R,
    irq: Option<u32>,
) -> Result<Owm<R, Delay>, InitError> {
    match irq {
        Some(_) => builder.initialize(reg, Delay, irq),
        None => builder.build_polling(reg, Delay),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize the logger
    env_logger::init();
    // Parse command line arguments
    let args = Args::parse();
    check_interrupt(&args)?;
    let builder = OwmBuilder::default().with_ports(args.ports);
    if args.simulate {
        let sim = SimBus::new();
        let roms = if args.rom.is_empty() {
            vec![DeviceRom::new(Ds18b20::family(), [0x01, 0x02, 0x03, 0x04, 0x05, 0x06])]
        } else {
            args.rom.clone()
        };
        for (idx, rom) in roms.into_iter().enumerate() {
            let sensor = SimSensor::new(rom)
                .with_raw(0x00c8 + 8 * idx as u16)
                .with_parasite(args.parasite);
            sim.attach(args.port, sensor);
        }
        let owm = build(builder, sim.clone(), args.irq)?;
        if let Some(flag) = owm.irq_flag() {
            sim.attach_irq(flag);
        }
        run(&owm, &args)
    } else {
        let base = args.base.ok_or("either --base or --simulate is required")?;
        let (_map, reg) = map_register(base)?;
        let owm = build(builder, reg, None)?;
        run(&owm, &args)
    }
}

fn run<R: Register, D: DelayNs>(owm: &Owm<R, D>, args: &Args) -> Result<(), Box<dyn Error>> {
    let mut delay = Delay;
    let readers = {
        let mut bus = owm.acquire(args.port)?;
        let readers = if args.rom.is_empty() {
            match bus.read_rom() {
                Ok(rom) => vec![Ds18b20::new(rom)],
                Err(e) => {
                    warn!("Read ROM failed ({e:?}), addressing with Skip ROM");
                    vec![Ds18b20::single()]
                }
            }
        } else {
            args.rom.iter().map(|rom| Ds18b20::new(*rom)).collect()
        };
        readers
            .into_iter()
            .map(|reader| {
                let power = if args.parasite {
                    PowerMode::Parasite
                } else {
                    reader
                        .read_power_supply(&mut bus)
                        .unwrap_or(PowerMode::External)
                };
                reader.with_power_mode(power)
            })
            .collect::<Vec<_>>()
    };
    for reader in readers.iter() {
        info!(
            "Sensor {}: {:?} power",
            label(reader),
            reader.power_mode()
        );
    }
    loop {
        for (idx, reader) in readers.iter().enumerate() {
            let mut bus = owm.acquire(args.port)?;
            let sample = if args.hw_delay {
                reader.read_temperature_timed(&mut bus)
            } else {
                reader.read_temperature(&mut bus, &mut delay)
            };
            if sample.success() {
                println!("({idx}) {} {:5.1} Celsius", label(reader), sample.celsius());
                continue;
            }
            let present = match reader.rom() {
                Some(rom) => bus.select_device(rom).is_ok(),
                None => bus.reset().unwrap_or(false),
            };
            let failure = sample
                .failure()
                .map(|f| f.to_string())
                .unwrap_or_default();
            println!(
                "({idx}) {}  Convert failed ({failure}).  Device is{} present.",
                label(reader),
                if present { "" } else { " not" }
            );
        }
        if args.once {
            break;
        }
        thread::sleep(Duration::from_secs(args.interval));
    }
    Ok(())
}

fn label(reader: &Ds18b20) -> String {
    reader
        .rom()
        .map(|rom| rom.to_string())
        .unwrap_or_else(|| "single".into())
}
