use std::time::Duration;

use log::LevelFilter;

pub const HELP: &str = "\
busaddr - find and change the bus address of a serial device

Waits for the device to broadcast its IDENT packet and prints the address
it reports. When a new address is given, the device is told to switch to
it and its confirmation is checked.

USAGE:
  busaddr [OPTIONS] <serial_port> [new_address]
  busaddr [OPTIONS] -i [new_address]

ARGS:
  <serial_port>         Serial port the device is on, e.g. /dev/ttyUSB0 or COM3
  [new_address]         1...65535, decimal, 0x-prefixed hex or 0-prefixed octal

OPTIONS:
  -h, --help            Prints help information
  -l, --list            List serial ports and exit
  -i, --interactive     Pick the serial port from a list
  -b, --baud <rate>     Baud rate (default: 9600)
  -t, --timeout <ms>    Give up on a read after this many milliseconds
                        (default: wait forever)
  -v, --verbose         Show packets and handshake progress
  -vv, --trace          Also show raw bytes on the wire (same as -v -v)
";

#[derive(Debug)]
pub struct AppArgs {
    pub help: bool,
    pub list: bool,
    /// `None` means choose interactively.
    pub port: Option<String>,
    pub new_address: Option<u16>,
    pub baud_rate: Option<u32>,
    pub read_timeout: Option<Duration>,
    pub log_level: LevelFilter,
}

pub fn parse_args() -> Result<AppArgs, pico_args::Error> {
    parse_from(pico_args::Arguments::from_env())
}

pub fn parse_from(mut pargs: pico_args::Arguments) -> Result<AppArgs, pico_args::Error> {
    if pargs.contains(["-h", "--help"]) {
        return Ok(AppArgs {
            help: true,
            list: false,
            port: None,
            new_address: None,
            baud_rate: None,
            read_timeout: None,
            log_level: LevelFilter::Warn,
        });
    }

    // -v may be repeated; -vv counts twice
    let mut verbosity = 0;
    while pargs.contains(["-vv", "--trace"]) {
        verbosity += 2;
    }
    while pargs.contains(["-v", "--verbose"]) {
        verbosity += 1;
    }
    let log_level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let list = pargs.contains(["-l", "--list"]);
    let interactive = pargs.contains(["-i", "--interactive"]);
    let baud_rate = pargs.opt_value_from_str(["-b", "--baud"])?;
    let read_timeout = pargs
        .opt_value_from_fn(["-t", "--timeout"], |s| s.parse::<u64>().map(Duration::from_millis))?;

    let port = if list || interactive {
        None
    } else {
        Some(pargs.free_from_str()?)
    };
    let new_address = if list {
        None
    } else {
        pargs.opt_free_from_fn(parse_address)?
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        return Err(pico_args::Error::ArgumentParsingFailed {
            cause: format!("unexpected arguments: {remaining:?}"),
        });
    }

    Ok(AppArgs {
        help: false,
        list,
        port,
        new_address,
        baud_rate,
        read_timeout,
        log_level,
    })
}

/// Accepts the same spellings as C's `strtoul(s, NULL, 0)`, minus trailing
/// garbage.
pub fn parse_address(s: &str) -> Result<u16, String> {
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    let invalid = || format!("invalid new address {s} supplied; valid values are 1...65535");

    // from_str_radix takes a sign, strtoul stops at one once a prefix was seen
    if radix != 10 && digits.starts_with('+') {
        return Err(invalid());
    }

    let value = u64::from_str_radix(digits, radix).map_err(|_| invalid())?;
    match u16::try_from(value) {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(addr) => Ok(addr),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::time::Duration;

    use expect_test::expect;
    use log::LevelFilter;

    use super::{parse_address, parse_from, AppArgs};

    fn parse(args: &[&str]) -> Result<AppArgs, pico_args::Error> {
        parse_from(pico_args::Arguments::from_vec(
            args.iter().map(OsString::from).collect(),
        ))
    }

    #[test]
    fn test_address_radixes() {
        assert_eq!(parse_address("8192"), Ok(0x2000));
        assert_eq!(parse_address("0x2000"), Ok(0x2000));
        assert_eq!(parse_address("0XfFfF"), Ok(0xFFFF));
        assert_eq!(parse_address("020000"), Ok(0x2000));
        assert_eq!(parse_address("1"), Ok(1));
        // strtoul takes a sign on plain decimal
        assert_eq!(parse_address("+5"), Ok(5));
    }

    #[test]
    fn test_address_out_of_range() {
        for bad in [
            "0", "0x0", "65536", "0x10000", "-1", "", "0x", "12abc", "09", "0x+5", "0X+5", "0+7",
        ] {
            assert!(parse_address(bad).is_err(), "{bad:?} should be rejected");
        }
        expect!["invalid new address 70000 supplied; valid values are 1...65535"]
            .assert_eq(&parse_address("70000").unwrap_err());
    }

    #[test]
    fn test_port_only() {
        let args = parse(&["/dev/ttyUSB0"]).unwrap();
        assert_eq!(args.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(args.new_address, None);
        assert_eq!(args.baud_rate, None);
        assert_eq!(args.read_timeout, None);
        assert_eq!(args.log_level, LevelFilter::Warn);
    }

    #[test]
    fn test_port_and_address() {
        let args = parse(&["-v", "--timeout", "1500", "COM3", "0x2000"]).unwrap();
        assert_eq!(args.port.as_deref(), Some("COM3"));
        assert_eq!(args.new_address, Some(0x2000));
        assert_eq!(args.read_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(args.log_level, LevelFilter::Debug);
    }

    #[test]
    fn test_interactive() {
        let args = parse(&["-i", "-b", "19200", "42"]).unwrap();
        assert_eq!(args.port, None);
        assert_eq!(args.baud_rate, Some(19200));
        assert_eq!(args.new_address, Some(42));
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["COM3", "0"]).is_err());
        assert!(parse(&["COM3", "1", "2"]).is_err());
        assert!(parse(&["COM3", "-b", "fast"]).is_err());
    }

    #[test]
    fn test_help() {
        assert!(parse(&["--help"]).unwrap().help);
        assert!(parse(&["-l"]).unwrap().list);
    }

    #[test]
    fn test_repeated_verbose() {
        let args = parse(&["-v", "-v", "COM3"]).unwrap();
        assert_eq!(args.log_level, LevelFilter::Trace);
        assert_eq!(args.port.as_deref(), Some("COM3"));

        assert_eq!(parse(&["--verbose", "COM3"]).unwrap().log_level, LevelFilter::Debug);
        assert_eq!(parse(&["-vv", "COM3"]).unwrap().log_level, LevelFilter::Trace);
        assert_eq!(parse(&["-vv", "-v", "COM3"]).unwrap().log_level, LevelFilter::Trace);
    }
}
