mod parse_args;

use std::path::Path;
use std::process::exit;

use busaddr::{list_ports, readdress_or_stop, Config, Outcome, Phase, PortSelector, FAILURE_EXIT_CODE};

use crate::parse_args::{parse_args, AppArgs, HELP};

fn init_logger(args: &AppArgs) {
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .parse_default_env()
        .init();
}

fn print_progress(path: &Path, phase: Phase) {
    match phase {
        Phase::AwaitIdent => println!("Waiting for IDENT packet on {}...", path.display()),
        Phase::IdentFound(addr) => println!("Found device address 0x{addr:04X} ({addr})"),
        Phase::BuildingWriteCommand(addr) => {
            println!("Setting new address of 0x{addr:04X} ({addr})...")
        }
        Phase::AwaitConfirm(_) => println!("Packet sent, waiting for confirmation..."),
        Phase::Done(report) if report.outcome != Outcome::Unchanged => {
            println!("{}", report.outcome)
        }
        Phase::Done(_) | Phase::Failed => {}
    }
}

fn main() {
    if let Err(e) = busaddr::color_eyre::install() {
        eprintln!("{e:?}");
    }

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}\n");
            eprint!("{HELP}");
            exit(FAILURE_EXIT_CODE);
        }
    };

    if args.help {
        print!("{HELP}");
        return;
    }

    init_logger(&args);

    if args.list {
        for port in list_ports() {
            println!("{port}");
        }
        return;
    }

    let selector = match &args.port {
        Some(name) => PortSelector::from(name),
        None => PortSelector::ChooseInteractive,
    };
    let mut config = Config::new(selector);
    if let Some(addr) = args.new_address {
        config = config.with_new_address(addr);
    }
    if let Some(baud_rate) = args.baud_rate {
        config = config.with_baud_rate(baud_rate);
    }
    if let Some(timeout) = args.read_timeout {
        config = config.with_read_timeout(timeout);
    }

    readdress_or_stop(&config, print_progress);
}
