//! Simulated hardware for unit tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::clock::Clock;
use crate::portio::{IoWidth, PortIo, PortIoResult};

/// Clock that only moves when something sleeps
pub struct FakeClock {
    now: Cell<u64>,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock { now: Cell::new(0) }
    }
}

impl Clock for FakeClock {
    fn now_us(&self) -> u64 {
        self.now.get()
    }
    fn sleep_us(&self, micros: u64) {
        self.now.set(self.now.get() + micros);
    }
}

/// A device answering on some ports of the simulated bus
pub trait SimDevice {
    fn claims(&self, port: u16) -> bool;
    fn read(&mut self, port: u16) -> u8;
    fn write(&mut self, port: u16, value: u8);
}

/// Port space where unclaimed ports behave like plain memory, or like an
/// empty bus when created with [`SimBus::floating`]
pub struct SimBus {
    mem: Vec<u8>,
    /// Unclaimed ports read 0xFF and drop writes
    floating: bool,
    devices: Vec<Rc<RefCell<dyn SimDevice>>>,
    /// Number of read/write calls issued on the bus
    pub transactions: usize,
}

impl SimBus {
    pub fn new() -> Self {
        SimBus {
            mem: vec![0; 0x10000],
            floating: false,
            devices: vec![],
            transactions: 0,
        }
    }

    /// Unclaimed ports read back as 0xFF, like a floating bus
    pub fn floating() -> Self {
        SimBus {
            mem: vec![0xFF; 0x10000],
            floating: true,
            devices: vec![],
            transactions: 0,
        }
    }

    pub fn attach(&mut self, device: Rc<RefCell<dyn SimDevice>>) {
        self.devices.push(device);
    }

    fn read_byte(&mut self, port: u16) -> u8 {
        for dev in &self.devices {
            let mut dev = dev.borrow_mut();
            if dev.claims(port) {
                return dev.read(port);
            }
        }
        self.mem[usize::from(port)]
    }

    fn write_byte(&mut self, port: u16, value: u8) {
        for dev in &self.devices {
            let mut dev = dev.borrow_mut();
            if dev.claims(port) {
                dev.write(port, value);
                return;
            }
        }
        if !self.floating {
            self.mem[usize::from(port)] = value;
        }
    }
}

impl PortIo for SimBus {
    fn read(&mut self, port: u16, width: IoWidth) -> PortIoResult<u32> {
        self.transactions += 1;
        let mut value = 0_u32;
        for i in 0..width.bytes() {
            value |= u32::from(self.read_byte(port.wrapping_add(i as u16))) << (8 * i);
        }
        Ok(value)
    }

    fn write(&mut self, port: u16, width: IoWidth, value: u32) -> PortIoResult<()> {
        self.transactions += 1;
        for i in 0..width.bytes() {
            self.write_byte(port.wrapping_add(i as u16), (value >> (8 * i)) as u8);
        }
        Ok(())
    }
}

/// How a fake SuperIO leaves configuration mode
#[derive(Clone, Copy)]
pub enum FakeExit {
    /// Magic byte written to the index port
    Byte(u8),
    /// Bit set in a global configuration register
    RegisterBit { reg: u8, bit: u8 },
}

/// Index/data SuperIO chip with a configuration mode key
pub struct FakeSuperIo {
    pub port: u16,
    key: Vec<u8>,
    exit: FakeExit,
    progress: usize,
    pub in_config: bool,
    index: u8,
    pub regs: [u8; 256],
}

impl FakeSuperIo {
    pub fn new(port: u16, key: &[u8], exit: FakeExit) -> Self {
        FakeSuperIo {
            port,
            key: key.to_vec(),
            exit,
            progress: 0,
            in_config: key.is_empty(),
            index: 0,
            regs: [0; 256],
        }
    }

    /// ITE chip with chip id and version registers populated
    pub fn ite(port: u16, id: [u8; 2], version: u8) -> Self {
        let last = if port == 0x2e { 0x55 } else { 0xaa };
        let mut chip = Self::new(
            port,
            &[0x87, 0x01, 0x55, last],
            FakeExit::RegisterBit { reg: 0x02, bit: 1 },
        );
        chip.regs[0x20] = id[0];
        chip.regs[0x21] = id[1];
        chip.regs[0x22] = version;
        chip
    }

    pub fn smsc(port: u16, id: u8, revision: u8) -> Self {
        let mut chip = Self::new(port, &[0x55], FakeExit::Byte(0xaa));
        chip.regs[0x20] = id;
        chip.regs[0x21] = revision;
        chip
    }
}

impl SimDevice for FakeSuperIo {
    fn claims(&self, port: u16) -> bool {
        port == self.port || port == self.port + 1
    }

    fn read(&mut self, port: u16) -> u8 {
        if port == self.port + 1 && self.in_config {
            self.regs[usize::from(self.index)]
        } else {
            0xFF
        }
    }

    fn write(&mut self, port: u16, value: u8) {
        if port == self.port {
            if !self.in_config {
                if value == self.key[self.progress] {
                    self.progress += 1;
                } else {
                    self.progress = usize::from(value == self.key[0]);
                }
                if self.progress == self.key.len() {
                    self.in_config = true;
                    self.progress = 0;
                }
                return;
            }
            match self.exit {
                FakeExit::Byte(b) if b == value && !self.key.is_empty() => self.in_config = false,
                _ => self.index = value,
            }
        } else if self.in_config {
            self.regs[usize::from(self.index)] = value;
            if let FakeExit::RegisterBit { reg, bit } = self.exit {
                if self.index == reg && value & (1 << bit) != 0 && !self.key.is_empty() {
                    self.in_config = false;
                }
            }
        }
    }
}

/// ENE EC with ECRAM behind an indexed I/O window
pub struct FakeEne {
    pub base: u16,
    high: u8,
    low: u8,
    pub ram: HashMap<u16, u8>,
}

impl FakeEne {
    pub fn new(base: u16, hwver: u8, ediid: u8, fwver: u8) -> Self {
        let mut ram = HashMap::new();
        ram.insert(0xff00, hwver);
        ram.insert(0xff01, fwver);
        ram.insert(0xff24, ediid);
        FakeEne {
            base,
            high: 0,
            low: 0,
            ram,
        }
    }

    fn addr(&self) -> u16 {
        u16::from(self.high) << 8 | u16::from(self.low)
    }
}

impl SimDevice for FakeEne {
    fn claims(&self, port: u16) -> bool {
        port > self.base && port <= self.base + 3
    }

    fn read(&mut self, port: u16) -> u8 {
        match port - self.base {
            1 => self.high,
            2 => self.low,
            _ => *self.ram.get(&self.addr()).unwrap_or(&0),
        }
    }

    fn write(&mut self, port: u16, value: u8) {
        match port - self.base {
            1 => self.high = value,
            2 => self.low = value,
            _ => {
                let addr = self.addr();
                self.ram.insert(addr, value);
            }
        }
    }
}

/// Which host command interfaces a fake Chrome EC understands
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum FakeEcMode {
    /// Packets (0xDA) plus args-framed commands
    V3,
    /// Args-framed commands
    V2,
    /// Only the unframed legacy exchange
    Legacy,
}

/// Chrome EC on the LPC host command interface
pub struct FakeCrosEc {
    mode: FakeEcMode,
    regs: Vec<u8>,
    /// Value the EC adds to a hello request
    pub hello_delta: u32,
    /// Add one to every response checksum
    pub corrupt_checksum: bool,
    /// Report this result code instead of running commands
    pub fail_with: Option<u8>,
    /// Status stays busy for this many reads, `u32::MAX` for ever
    pub busy_polls: u32,
    /// Commands the EC executed: (command, version, params)
    pub seen: Vec<(u16, u8, Vec<u8>)>,
}

const DATA: u16 = 0x200;
const CMD: u16 = 0x204;
const ARGS: u16 = 0x800;
const PARAM: u16 = 0x804;
const OLD_PARAM: u16 = 0x880;
const MEMMAP: u16 = 0x900;

impl FakeCrosEc {
    pub fn new(mode: FakeEcMode) -> Self {
        let mut ec = FakeCrosEc {
            mode,
            regs: vec![0; 0x10000],
            hello_delta: 0x0102_0304,
            corrupt_checksum: false,
            fail_with: None,
            busy_polls: 0,
            seen: vec![],
        };
        ec.regs[usize::from(MEMMAP + 0x20)] = b'E';
        ec.regs[usize::from(MEMMAP + 0x21)] = b'C';
        ec.regs[usize::from(MEMMAP + 0x27)] = match mode {
            FakeEcMode::V3 => 0x03,
            FakeEcMode::V2 => 0x01,
            FakeEcMode::Legacy => 0x00,
        };
        ec
    }

    /// Old Google EC without a memory map
    pub fn gec() -> Self {
        let mut ec = Self::new(FakeEcMode::Legacy);
        for b in &mut ec.regs[usize::from(MEMMAP)..usize::from(MEMMAP) + 0x100] {
            *b = 0;
        }
        ec
    }

    fn mem(&self, port: u16, len: usize) -> Vec<u8> {
        self.regs[usize::from(port)..usize::from(port) + len].to_vec()
    }

    fn set_mem(&mut self, port: u16, data: &[u8]) {
        self.regs[usize::from(port)..usize::from(port) + data.len()].copy_from_slice(data);
    }

    fn run(&mut self, command: u16, version: u8, params: &[u8]) -> (u8, Vec<u8>) {
        self.seen.push((command, version, params.to_vec()));
        if let Some(code) = self.fail_with {
            return (code, vec![]);
        }
        match command {
            // Hello
            0x01 => {
                let mut input = [0_u8; 4];
                input.copy_from_slice(&params[..4]);
                let out = u32::from_le_bytes(input).wrapping_add(self.hello_delta);
                (0, out.to_le_bytes().to_vec())
            }
            // Get version
            0x02 => {
                let mut resp = vec![0_u8; 100];
                resp[..11].copy_from_slice(b"fake_v1.0ro");
                resp[32..43].copy_from_slice(b"fake_v1.1rw");
                resp[96] = 2;
                (0, resp)
            }
            // Get build info
            0x04 => (0, b"fake 2012-06-01 builder\0".to_vec()),
            // Get chip info
            0x05 => {
                let mut resp = vec![0_u8; 96];
                resp[..3].copy_from_slice(b"ite");
                resp[32..38].copy_from_slice(b"it8518");
                resp[64..66].copy_from_slice(b"B1");
                (0, resp)
            }
            // Read memmap
            0x07 => {
                let (offset, size) = (params[0], params[1]);
                (0, self.mem(MEMMAP + u16::from(offset), usize::from(size)))
            }
            // Get protocol info
            0x0b => {
                let mut resp = vec![0_u8; 12];
                resp[0] = (1 << 2) | (1 << 3);
                resp[4..6].copy_from_slice(&0xf8_u16.to_le_bytes());
                resp[6..8].copy_from_slice(&0xf8_u16.to_le_bytes());
                (0, resp)
            }
            // Invalid command
            _ => (1, vec![]),
        }
    }

    fn run_legacy(&mut self, command: u8) {
        let params = self.mem(OLD_PARAM, 0x80);
        let (result, data) = self.run(command.into(), 0, &params);
        self.set_mem(OLD_PARAM, &data);
        self.regs[usize::from(DATA)] = result;
    }

    fn run_args(&mut self, command: u8) {
        let args = self.mem(ARGS, 4);
        let (flags, version, size, checksum) = (args[0], args[1], args[2], args[3]);
        let params = self.mem(PARAM, usize::from(size));
        let sum = params
            .iter()
            .fold(command.wrapping_add(flags).wrapping_add(version).wrapping_add(size), |acc, b| {
                acc.wrapping_add(*b)
            });
        if sum != checksum {
            self.regs[usize::from(DATA)] = 7;
            return;
        }
        let (result, data) = self.run(command.into(), version, &params);
        self.regs[usize::from(DATA)] = result;
        if result != 0 {
            return;
        }
        let flags = 0x02;
        let size = data.len() as u8;
        let mut checksum = data
            .iter()
            .fold(command.wrapping_add(flags).wrapping_add(version).wrapping_add(size), |acc, b| {
                acc.wrapping_add(*b)
            });
        if self.corrupt_checksum {
            checksum = checksum.wrapping_add(1);
        }
        self.set_mem(ARGS, &[flags, version, size, checksum]);
        self.set_mem(PARAM, &data);
    }

    fn run_packet(&mut self) {
        let header = self.mem(ARGS, 8);
        let len = usize::from(u16::from_le_bytes([header[6], header[7]]));
        let packet = self.mem(ARGS, 8 + len);
        if header[0] != 3 || packet.iter().fold(0_u8, |a, b| a.wrapping_add(*b)) != 0 {
            self.regs[usize::from(DATA)] = 7;
            return;
        }
        let command = u16::from_le_bytes([header[2], header[3]]);
        let (result, data) = self.run(command, header[4], &packet[8..]);
        self.regs[usize::from(DATA)] = result;

        let mut resp = vec![3, 0];
        resp.extend_from_slice(&u16::from(result).to_le_bytes());
        resp.extend_from_slice(&(data.len() as u16).to_le_bytes());
        resp.extend_from_slice(&[0, 0]);
        resp.extend_from_slice(&data);
        let mut checksum = resp.iter().fold(0_u8, |a, b| a.wrapping_add(*b)).wrapping_neg();
        if self.corrupt_checksum {
            checksum = checksum.wrapping_add(1);
        }
        resp[1] = checksum;
        self.set_mem(ARGS, &resp);
    }
}

impl SimDevice for FakeCrosEc {
    fn claims(&self, port: u16) -> bool {
        port == DATA || port == CMD || (ARGS..MEMMAP + 0x100).contains(&port)
    }

    fn read(&mut self, port: u16) -> u8 {
        if port == CMD {
            if self.busy_polls > 0 {
                if self.busy_polls != u32::MAX {
                    self.busy_polls -= 1;
                }
                return 0x02;
            }
            return 0;
        }
        self.regs[usize::from(port)]
    }

    fn write(&mut self, port: u16, value: u8) {
        if port != CMD {
            self.regs[usize::from(port)] = value;
            return;
        }
        if value == 0xda && self.mode == FakeEcMode::V3 {
            self.run_packet();
        } else if self.mode != FakeEcMode::Legacy && self.regs[usize::from(ARGS)] & 0x01 != 0 {
            self.run_args(value);
        } else {
            self.run_legacy(value);
        }
    }
}

/// Shorthand to attach a device and keep a handle to inspect it later
pub fn attach<T: SimDevice + 'static>(bus: &mut SimBus, device: T) -> Rc<RefCell<T>> {
    let device = Rc::new(RefCell::new(device));
    bus.attach(device.clone());
    device
}
