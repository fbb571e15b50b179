//! Module to factor out commandline interaction
//! Parsing lives in [`clap_std`], this module runs what was asked for.

pub mod clap_std;

use std::error::Error;
use std::path::PathBuf;

use crate::built_info;
use crate::chromium_ec::{self, EcDriver, EcDriverType, LpcEc, LpcProtocol};
use crate::clock::{Clock, SystemClock};
use crate::config::{self, Config};
use crate::portio::{self, IoWidth, PortIo, PortIoBackend};
use crate::superio::{self, SuperIoDetector};
use crate::util;

#[derive(Debug)]
pub struct LogLevel(log::LevelFilter);

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel(log::LevelFilter::Error)
    }
}

#[derive(Debug, Default)]
pub struct Cli {
    pub verbosity: LogLevel,
    pub version: bool,
    pub ec_hello: bool,
    pub ec_info: bool,
    /// Offset and length
    pub ec_memmap: Option<(u16, u16)>,
    pub superio: bool,
    pub io_read: Option<u16>,
    /// Port and value
    pub io_write: Option<(u16, u32)>,
    pub width: Option<IoWidth>,
    /// Index port and register
    pub sio_read: Option<(u16, u8)>,
    /// Index port, register and value
    pub sio_write: Option<(u16, u8, u8)>,
    pub driver: Option<EcDriverType>,
    pub protocol: Option<LpcProtocol>,
    pub io: Option<PortIoBackend>,
    pub config: Option<PathBuf>,
}

pub fn parse(args: &[String]) -> Cli {
    clap_std::parse(args)
}

type CmdResult = Result<i32, Box<dyn Error>>;

fn print_tool_version() {
    println!("Tool Version: {}", built_info::PKG_VERSION);
    println!("Build version:  ");
    println!(
        "  {} ({})",
        built_info::GIT_VERSION.unwrap_or("?"),
        built_info::GIT_COMMIT_HASH.unwrap_or("?")
    );
    println!("  Dirty:     {:?}", built_info::GIT_DIRTY.unwrap_or(false));
    println!("  Built at:  {}", built_info::BUILT_TIME_UTC);
    println!("  Target:    {}", built_info::TARGET);
}

fn ec_hello(ec: &mut LpcEc) -> CmdResult {
    if chromium_ec::hello(ec)? {
        println!("EC says hello");
        Ok(0)
    } else {
        println!("Unexpected answer to hello");
        Ok(1)
    }
}

fn ec_info(ec: &mut LpcEc) -> CmdResult {
    if !chromium_ec::detect_ec(ec)? {
        println!("No {} EC found", ec.name());
        return Ok(1);
    }
    println!("EC");
    println!("  Driver:         {}", ec.name());
    println!("  Protocol:       {:?}", ec.protocol()?);

    match chromium_ec::version_info(ec) {
        Ok(ver) => println!("  Build version:  {:?}", ver),
        Err(err) => {
            debug!("Build info: {}", err);
            println!("  Build version:  Unknown");
        }
    }
    match chromium_ec::flash_version(ec) {
        Ok((ro, rw, curr)) => {
            println!("  RO Version:     {:?}", ro);
            println!("  RW Version:     {:?}", rw);
            println!("  Current image:  {:?}", curr);
        }
        Err(err) => {
            debug!("Version: {}", err);
            println!("  RO Version:     Unknown");
            println!("  RW Version:     Unknown");
            println!("  Current image:  Unknown");
        }
    }
    if let Ok(chip) = chromium_ec::chip_info(ec) {
        println!("  Chip Vendor:    {}", chip.vendor);
        println!("  Chip Name:      {}", chip.name);
        println!("  Chip Revision:  {}", chip.revision);
    }
    if let Ok(info) = chromium_ec::protocol_info(ec) {
        let versions: Vec<String> = (0..32)
            .filter(|v| info.supports(*v))
            .map(|v| v.to_string())
            .collect();
        println!("  Protocols:      {}", versions.join(", "));
        println!("  Max Request:    {} B", info.max_request_packet_size);
        println!("  Max Response:   {} B", info.max_response_packet_size);
    }
    Ok(0)
}

fn ec_memmap(ec: &mut LpcEc, offset: u16, length: u16) -> CmdResult {
    let data = ec.read_memory(offset, length)?;
    util::print_multiline_buffer(&data, usize::from(offset));
    Ok(0)
}

fn print_superio(detector: &mut SuperIoDetector, io: &mut dyn PortIo) -> CmdResult {
    match detector.probe(io)? {
        Some(chip) => {
            println!("SuperIO");
            println!("  Vendor:   {}", chip.vendor);
            println!("  Chip:     {}", chip.name);
            println!("  Port:     {:#06X}", chip.port);
            println!("  ID:       {}", util::format_buffer(&chip.id));
            println!("  Version:  {:#04X}", chip.version);
            Ok(0)
        }
        None => {
            println!("No known SuperIO found");
            Ok(1)
        }
    }
}

fn format_value(value: u32, width: IoWidth) -> String {
    format!("{:#0w$X}", value, w = 2 + 2 * width.bytes())
}

/// Everything that touches hardware, on whichever port I/O the caller opened
fn run_commands(args: &Cli, config: &Config, io: &mut dyn PortIo, clock: &dyn Clock) -> CmdResult {
    let width = args.width.unwrap_or(IoWidth::Byte);

    if let Some(port) = args.io_read {
        let value = io.read(port, width)?;
        println!("{:#06X}: {}", port, format_value(value, width));
        Ok(0)
    } else if let Some((port, value)) = args.io_write {
        io.write(port, width, value)?;
        Ok(0)
    } else if let Some((port, reg)) = args.sio_read {
        let value = superio::sio_read(io, port, reg)?;
        println!("{:#06X}[{:#04X}]: {:#04X}", port, reg, value);
        Ok(0)
    } else if let Some((port, reg, value)) = args.sio_write {
        superio::sio_write(io, port, reg, value)?;
        Ok(0)
    } else if args.superio {
        let mut detector =
            SuperIoDetector::new().with_extra_ports(&config.superio.extra_ports);
        print_superio(&mut detector, io)
    } else if args.ec_hello || args.ec_info || args.ec_memmap.is_some() {
        let family = args.driver.unwrap_or(config.ec_driver());
        let mut ec_config = config.lpc_ec();
        if let Some(protocol) = args.protocol {
            ec_config.protocol = protocol;
        }
        let mut ec = LpcEc::new(io, clock, family, ec_config);
        if args.ec_hello {
            ec_hello(&mut ec)
        } else if args.ec_info {
            ec_info(&mut ec)
        } else if let Some((offset, length)) = args.ec_memmap {
            ec_memmap(&mut ec, offset, length)
        } else {
            Ok(0)
        }
    } else {
        Ok(0)
    }
}

pub fn run_with_args(args: &Cli) -> i32 {
    let level = args.verbosity.0.as_str();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .format_timestamp(None)
        .init();

    if args.version {
        print_tool_version();
        return 0;
    }

    let config = match config::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return 1;
        }
    };

    let backend = args.io.unwrap_or(config.io_backend());
    let mut io = match portio::open_port_io(backend, config.io_ranges()) {
        Ok(io) => io,
        Err(err) => {
            error!("{}", err);
            return 1;
        }
    };
    let clock = SystemClock::new();

    match run_commands(args, &config, io.as_mut(), &clock) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            1
        }
    }
}
