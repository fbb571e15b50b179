//! Commandline parsing with clap
use clap::error::ErrorKind;
use clap::{command, Args, Command, FromArgMatches};
use clap_num::maybe_hex;

use crate::chromium_ec::{EcDriverType, LpcProtocol};
use crate::commandline::{Cli, LogLevel};
use crate::portio::{IoWidth, PortIoBackend};

/// Inspect SuperIO chips and the embedded controller
#[derive(clap::Parser)]
#[command(arg_required_else_help = true)]
struct ClapCli {
    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity,

    /// Show tool version information
    #[arg(long)]
    version: bool,

    /// Check that the EC answers a hello command
    #[arg(long)]
    ec_hello: bool,

    /// Show EC firmware, chip and protocol information
    #[arg(long)]
    ec_info: bool,

    /// Dump part of the EC memory map
    #[arg(long, value_parser=maybe_hex::<u16>, num_args = 2, value_names = ["OFFSET", "LENGTH"])]
    ec_memmap: Vec<u16>,

    /// Detect the SuperIO chip
    #[arg(long)]
    superio: bool,

    /// Read an I/O port
    #[arg(long, value_parser=maybe_hex::<u16>, value_name = "PORT")]
    io_read: Option<u16>,

    /// Write an I/O port
    #[arg(long, value_parser=maybe_hex::<u32>, num_args = 2, value_names = ["PORT", "VALUE"])]
    io_write: Vec<u32>,

    /// Access width in bytes of --io-read and --io-write [possible values: 1, 2, 4]
    #[arg(long, value_parser=maybe_hex::<u8>)]
    width: Option<u8>,

    /// Read a SuperIO register through the index/data pair at PORT
    #[arg(long, value_parser=maybe_hex::<u16>, num_args = 2, value_names = ["PORT", "REG"])]
    sio_read: Vec<u16>,

    /// Write a SuperIO register through the index/data pair at PORT
    #[arg(long, value_parser=maybe_hex::<u16>, num_args = 3, value_names = ["PORT", "REG", "VALUE"])]
    sio_write: Vec<u16>,

    /// Select which EC family to talk to
    #[clap(value_enum)]
    #[arg(long)]
    driver: Option<EcDriverType>,

    /// Force an EC host command protocol
    #[clap(value_enum)]
    #[arg(long)]
    protocol: Option<LpcProtocol>,

    /// Select how to access I/O ports
    #[clap(value_enum)]
    #[arg(long)]
    io: Option<PortIoBackend>,

    /// Read configuration from this file instead of mosys_config.toml
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

fn invalid(cli: &mut Command, msg: &str) -> ! {
    cli.error(ErrorKind::InvalidValue, msg).exit()
}

fn byte_arg(cli: &mut Command, value: u16, what: &str) -> u8 {
    match u8::try_from(value) {
        Ok(byte) => byte,
        Err(_) => invalid(cli, &format!("{} must fit in one byte, got {:#X}", what, value)),
    }
}

/// Parse a list of commandline arguments and return the struct
pub fn parse(args: &[String]) -> Cli {
    // Step 1 - Define args that can't be derived
    let cli = command!().disable_version_flag(true);
    // Step 2 - Define args from derived struct
    let mut cli = ClapCli::augment_args(cli);

    // Step 3 - Parse from derived struct
    let matches = cli.clone().get_matches_from(args);
    let args = match ClapCli::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };

    // Step 4 - Checks clap can't express
    let width = args.width.map(|w| match IoWidth::from_bytes(w) {
        Some(width) => width,
        None => invalid(&mut cli, "--width must be 1, 2 or 4"),
    });

    let io_write = match args.io_write.as_slice() {
        [port, value] => {
            let port = match u16::try_from(*port) {
                Ok(port) => port,
                Err(_) => invalid(&mut cli, &format!("Port {:#X} is out of range", port)),
            };
            let mask = width.unwrap_or(IoWidth::Byte).mask();
            if value & !mask != 0 {
                invalid(
                    &mut cli,
                    &format!("Value {:#X} doesn't fit the access width", value),
                );
            }
            Some((port, *value))
        }
        // Checked by clap
        _ => None,
    };

    let sio_read = match args.sio_read.as_slice() {
        [port, reg] => Some((*port, byte_arg(&mut cli, *reg, "Register"))),
        _ => None,
    };
    let sio_write = match args.sio_write.as_slice() {
        [port, reg, value] => Some((
            *port,
            byte_arg(&mut cli, *reg, "Register"),
            byte_arg(&mut cli, *value, "Value"),
        )),
        _ => None,
    };
    let ec_memmap = match args.ec_memmap.as_slice() {
        [offset, length] => Some((*offset, *length)),
        _ => None,
    };

    Cli {
        verbosity: LogLevel(args.verbosity.log_level_filter()),
        version: args.version,
        ec_hello: args.ec_hello,
        ec_info: args.ec_info,
        ec_memmap,
        superio: args.superio,
        io_read: args.io_read,
        io_write,
        width,
        sio_read,
        sio_write,
        driver: args.driver,
        protocol: args.protocol,
        io: args.io,
        config: args.config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(args: &[&str]) -> Cli {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        parse(&args)
    }

    #[test]
    fn io_access() {
        let cli = parse_str(&["mosys", "--io-write", "0x80", "0x1234", "--width", "2"]);
        assert_eq!(cli.io_write, Some((0x80, 0x1234)));
        assert_eq!(cli.width, Some(IoWidth::Word));

        let cli = parse_str(&["mosys", "--io-read", "0x62"]);
        assert_eq!(cli.io_read, Some(0x62));
        assert_eq!(cli.width, None);
    }

    #[test]
    fn superio_access() {
        let cli = parse_str(&["mosys", "--sio-write", "0x2e", "0x07", "5"]);
        assert_eq!(cli.sio_write, Some((0x2e, 0x07, 0x05)));
        let cli = parse_str(&["mosys", "--sio-read", "0x4e", "0x20"]);
        assert_eq!(cli.sio_read, Some((0x4e, 0x20)));
        let cli = parse_str(&["mosys", "--superio"]);
        assert!(cli.superio);
    }

    #[test]
    fn ec_options() {
        let cli = parse_str(&[
            "mosys",
            "--ec-memmap",
            "0x20",
            "2",
            "--driver",
            "gec",
            "--protocol",
            "legacy",
            "--io",
            "file",
            "--config",
            "/etc/mosys.toml",
        ]);
        assert_eq!(cli.ec_memmap, Some((0x20, 2)));
        assert_eq!(cli.driver, Some(EcDriverType::Gec));
        assert_eq!(cli.protocol, Some(LpcProtocol::Legacy));
        assert_eq!(cli.io, Some(PortIoBackend::File));
        assert_eq!(
            cli.config,
            Some(std::path::PathBuf::from("/etc/mosys.toml"))
        );

        let cli = parse_str(&["mosys", "--ec-info", "--driver", "cros-ec"]);
        assert!(cli.ec_info);
        assert_eq!(cli.driver, Some(EcDriverType::CrosEc));
    }

    #[test]
    fn verbosity() {
        let cli = parse_str(&["mosys", "--ec-hello"]);
        assert_eq!(cli.verbosity.0, log::LevelFilter::Error);
        let cli = parse_str(&["mosys", "--ec-hello", "-vv"]);
        assert_eq!(cli.verbosity.0, log::LevelFilter::Info);
        let cli = parse_str(&["mosys", "--ec-hello", "-q"]);
        assert_eq!(cli.verbosity.0, log::LevelFilter::Off);
    }
}
