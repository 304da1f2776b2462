//! Register-level simulator of the controller with attached temperature sensors.
//!
//! [`SimBus`] implements [`Register`] and reacts to the written command words the way the
//! hardware does: cycles complete immediately (or after a configurable number of busy polls),
//! reset cycles sample the presence of attached [`SimSensor`]s, bit slots are the wired-AND of
//! the master and every sensor on the selected port.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use embedded_onewire::{
    DeviceRom, ONEWIRE_MATCH_ROM_CMD, ONEWIRE_MATCH_ROM_CMD_OD, ONEWIRE_READ_ROM_CMD,
    ONEWIRE_SKIP_ROM_CMD, ONEWIRE_SKIP_ROM_CMD_OD, OneWireCrc,
};

use crate::{ControlRegister, IrqFlag, Register};

const CONVERT_T: u8 = 0x44;
const READ_SCRATCHPAD: u8 = 0xbe;
const WRITE_SCRATCHPAD: u8 = 0x4e;
const READ_POWER_SUPPLY: u8 = 0xb4;
/// Temperature register content after power-on, 85 °C.
const POWER_ON_RAW: u16 = 0x0550;

/// A bus cycle seen by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCycle {
    /// Reset pulse with presence detect.
    Reset {
        /// Selected port.
        port: u8,
    },
    /// Time slot, carrying the bit written by the master.
    Slot {
        /// Selected port.
        port: u8,
        /// Written bit, `true` for read slots.
        bit: bool,
    },
    /// Delay cycle without line activity.
    Delay {
        /// Selected port.
        port: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for a reset pulse.
    Idle,
    /// Receiving the ROM command.
    Rom,
    /// Receiving the ROM code of a Match ROM, byte index.
    Match(usize),
    /// Receiving a function command.
    Function,
    /// Receiving the TH, TL and configuration bytes, byte index.
    WriteScratchpad(usize),
}

/// A simulated DS18B20-style temperature sensor.
#[derive(Debug, Clone)]
pub struct SimSensor {
    rom: DeviceRom,
    raw: u16,
    th: u8,
    tl: u8,
    config: u8,
    parasite: bool,
    corrupt_reads: u32,
    conversions: u32,
    scratch_raw: u16,
    converting: Option<bool>,
    phase: Phase,
    rx: u8,
    rx_bits: u8,
    tx: VecDeque<bool>,
}

impl SimSensor {
    /// Externally powered sensor with ROM code `rom`, measuring 25 °C.
    pub fn new(rom: DeviceRom) -> Self {
        Self {
            rom,
            raw: 0x0190,
            th: 0x4b,
            tl: 0x46,
            config: 0x7f,
            parasite: false,
            corrupt_reads: 0,
            conversions: 0,
            scratch_raw: POWER_ON_RAW,
            converting: None,
            phase: Phase::Idle,
            rx: 0,
            rx_bits: 0,
            tx: VecDeque::new(),
        }
    }

    /// Sets the temperature word the next conversions produce, in 1/16 °C.
    pub fn with_raw(mut self, raw: u16) -> Self {
        self.raw = raw;
        self
    }

    /// Makes the sensor parasite powered: a conversion only succeeds while the strong
    /// pull-up of its port is on.
    pub fn with_parasite(mut self, parasite: bool) -> Self {
        self.parasite = parasite;
        self
    }

    /// Corrupts the next `reads` scratchpad transfers.
    pub fn with_corrupt_reads(mut self, reads: u32) -> Self {
        self.corrupt_reads = reads;
        self
    }

    /// ROM code of the sensor.
    pub fn rom(&self) -> DeviceRom {
        self.rom
    }

    /// Number of conversions that completed.
    pub fn conversions(&self) -> u32 {
        self.conversions
    }

    /// Alarm thresholds and configuration register, as written by Write Scratchpad.
    pub fn settings(&self) -> (u8, u8, u8) {
        (self.th, self.tl, self.config)
    }

    fn scratchpad(&self) -> [u8; 9] {
        let [lo, hi] = self.scratch_raw.to_le_bytes();
        let mut pad = [lo, hi, self.th, self.tl, self.config, 0xff, 0x0c, 0x10, 0];
        pad[8] = OneWireCrc::compute(&pad[..8]);
        pad
    }

    fn queue(&mut self, bytes: &[u8]) {
        self.tx.clear();
        self.tx
            .extend(bytes.iter().flat_map(|b| (0..8).map(move |i| (b >> i) & 0x1 == 0x1)));
    }

    fn finish_conversion(&mut self) {
        match self.converting.take() {
            Some(true) => {
                self.scratch_raw = self.raw;
                self.conversions += 1;
            }
            Some(false) => self.scratch_raw = POWER_ON_RAW,
            None => {}
        }
    }

    fn powered(&mut self) {
        if let Some(powered) = self.converting.as_mut() {
            *powered = true;
        }
    }

    fn reset(&mut self) -> bool {
        self.finish_conversion();
        self.phase = Phase::Rom;
        self.rx = 0;
        self.rx_bits = 0;
        self.tx.clear();
        true
    }

    /// Take part in a time slot; returns the level the sensor leaves on the line.
    fn slot(&mut self, bit: bool) -> bool {
        if let Some(out) = self.tx.pop_front() {
            return out;
        }
        if self.phase == Phase::Idle {
            return true;
        }
        if bit {
            self.rx |= 1 << self.rx_bits;
        }
        self.rx_bits += 1;
        if self.rx_bits == 8 {
            let byte = self.rx;
            self.rx = 0;
            self.rx_bits = 0;
            self.receive(byte);
        }
        true
    }

    fn receive(&mut self, byte: u8) {
        let phase = self.phase;
        self.phase = match phase {
            Phase::Rom => match byte {
                ONEWIRE_MATCH_ROM_CMD | ONEWIRE_MATCH_ROM_CMD_OD => Phase::Match(0),
                ONEWIRE_SKIP_ROM_CMD | ONEWIRE_SKIP_ROM_CMD_OD => Phase::Function,
                ONEWIRE_READ_ROM_CMD => {
                    let rom = *self.rom.as_bytes();
                    self.queue(&rom);
                    Phase::Function
                }
                _ => Phase::Idle,
            },
            Phase::Match(idx) if self.rom.as_bytes()[idx] != byte => Phase::Idle,
            Phase::Match(idx) if idx + 1 == DeviceRom::BYTES => Phase::Function,
            Phase::Match(idx) => Phase::Match(idx + 1),
            Phase::Function => self.function(byte),
            Phase::WriteScratchpad(idx) => {
                match idx {
                    0 => self.th = byte,
                    1 => self.tl = byte,
                    _ => self.config = byte,
                }
                if idx == 2 {
                    Phase::Idle
                } else {
                    Phase::WriteScratchpad(idx + 1)
                }
            }
            Phase::Idle => Phase::Idle,
        };
    }

    fn function(&mut self, cmd: u8) -> Phase {
        match cmd {
            CONVERT_T => {
                self.converting = Some(!self.parasite);
                Phase::Idle
            }
            READ_SCRATCHPAD => {
                let mut pad = self.scratchpad();
                if self.corrupt_reads > 0 {
                    self.corrupt_reads -= 1;
                    pad[0] ^= 0x01;
                }
                self.queue(&pad);
                Phase::Idle
            }
            READ_POWER_SUPPLY => {
                self.tx.clear();
                self.tx.push_back(!self.parasite);
                Phase::Idle
            }
            WRITE_SCRATCHPAD => Phase::WriteScratchpad(0),
            _ => Phase::Idle,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    value: u32,
    busy_reads: u32,
    latency: u32,
    stalled: bool,
    pullup_stuck: bool,
    irq: Option<IrqFlag>,
    sensors: Vec<(u8, SimSensor)>,
    writes: Vec<u32>,
    cycles: Vec<SimCycle>,
}

impl SimState {
    fn on_port(&mut self, port: u8) -> impl Iterator<Item = &mut SimSensor> {
        self.sensors
            .iter_mut()
            .filter(move |(p, _)| *p == port)
            .map(|(_, s)| s)
    }

    fn execute(&mut self, cmd: ControlRegister) -> bool {
        let port = cmd.sel();
        if cmd.rst() && cmd.dat() {
            self.cycles.push(SimCycle::Delay { port });
            true
        } else if cmd.rst() {
            self.cycles.push(SimCycle::Reset { port });
            let mut presence = false;
            for sensor in self.on_port(port) {
                presence |= sensor.reset();
            }
            !presence
        } else {
            let bit = cmd.dat();
            self.cycles.push(SimCycle::Slot { port, bit });
            let mut line = bit;
            for sensor in self.on_port(port) {
                line &= sensor.slot(bit);
            }
            line
        }
    }
}

/// Simulated controller register, see the [module documentation](self).
///
/// Clones share the same simulated hardware, so a test can keep a handle for inspection
/// while the driver owns another.
#[derive(Debug, Clone, Default)]
pub struct SimBus {
    inner: Arc<Mutex<SimState>>,
}

impl SimBus {
    /// A controller with no sensors attached.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `sensor` to `port`, returning its index for [`SimBus::sensor`].
    pub fn attach(&self, port: u8, sensor: SimSensor) -> usize {
        let mut state = self.lock();
        state.sensors.push((port, sensor));
        state.sensors.len() - 1
    }

    /// Snapshot of an attached sensor.
    pub fn sensor(&self, index: usize) -> Option<SimSensor> {
        self.lock().sensors.get(index).map(|(_, s)| s.clone())
    }

    /// Post `flag` at the end of every cycle started with `IEN` set.
    pub fn attach_irq(&self, flag: IrqFlag) {
        self.lock().irq = Some(flag);
    }

    /// Keep `CYC` set for `reads` status reads after each cycle request.
    pub fn set_latency(&self, reads: u32) {
        self.lock().latency = reads;
    }

    /// Never complete a cycle.
    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }

    /// Ignore writes to the `POWER` field.
    pub fn set_pullup_stuck(&self, stuck: bool) {
        self.lock().pullup_stuck = stuck;
    }

    /// Current register content, without the read side effects.
    pub fn value(&self) -> u32 {
        self.lock().value
    }

    /// Every value written to the register.
    pub fn writes(&self) -> Vec<u32> {
        self.lock().writes.clone()
    }

    /// Every bus cycle generated so far.
    pub fn cycles(&self) -> Vec<SimCycle> {
        self.lock().cycles.clone()
    }
}

impl Register for SimBus {
    fn read(&self) -> u32 {
        let mut state = self.lock();
        let value = ControlRegister::from_bits(state.value);
        state.value = value.with_irq(false).into_bits();
        if state.busy_reads > 0 {
            state.busy_reads -= 1;
            return value.with_cyc(true).into_bits();
        }
        value.into_bits()
    }

    fn write(&self, value: u32) {
        let mut state = self.lock();
        state.writes.push(value);
        let mut cmd = ControlRegister::from_bits(value);
        if state.pullup_stuck {
            cmd.set_power(ControlRegister::from_bits(state.value).power());
        }
        for (port, sensor) in state.sensors.iter_mut() {
            if cmd.port_power(*port) {
                sensor.powered();
            }
        }
        if !cmd.cyc() {
            state.value = cmd.with_irq(false).into_bits();
            return;
        }
        if state.stalled {
            state.value = cmd.into_bits();
            return;
        }
        let dat = state.execute(cmd);
        let done = cmd.with_cyc(false).with_dat(dat).with_irq(cmd.ien());
        state.value = done.into_bits();
        state.busy_reads = state.latency;
        if cmd.ien() {
            if let Some(flag) = &state.irq {
                flag.post();
            }
        }
    }
}
