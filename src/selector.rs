use std::io::{stdin, stdout, Write};

use color_eyre::{eyre::eyre, Result, Section};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use serial_enumerator::{get_serial_list, SerialInfo};

#[derive(Debug)]
pub enum PortSelector<'a> {
    /// Interactively choose which serial port the device is on
    ChooseInteractive,

    /// A specific, named serial port.
    /// Note that a conversion from strings exists for this
    /// variant, so you can just write `Config::new(&"/dev/ttyUSB0")` for example.
    Named(&'a str),
}

impl<'a, T: AsRef<str>> From<&'a T> for PortSelector<'a> {
    fn from(s: &'a T) -> Self {
        Self::Named(s.as_ref())
    }
}

impl PortSelector<'_> {
    pub fn resolve(&self) -> Result<String> {
        match self {
            Self::Named(n) => Ok(n.to_string()),
            Self::ChooseInteractive => choose_interactive(),
        }
    }
}

/// One line per port: name, product and USB ids when known.
pub fn describe(port: &SerialInfo) -> String {
    let mut res = port.name.clone();
    if let Some(product) = &port.product {
        res.push_str(&format!(", {product}"));
    }
    if let Some(usb_info) = &port.usb_info {
        res.push_str(&format!(", pid: {}, vid: {}", usb_info.pid, usb_info.vid));
    }
    res
}

pub fn list_ports() -> Vec<String> {
    get_serial_list().iter().map(describe).collect()
}

pub fn choose_interactive() -> Result<String> {
    internal_choose_interactive(get_serial_list())
}

fn warn_in_red(msg: &str) -> Result<()> {
    execute!(
        stdout(),
        Clear(ClearType::All),
        SetForegroundColor(Color::Red),
        Print(msg.to_owned()),
        ResetColor
    )?;
    Ok(())
}

fn internal_choose_interactive(mut ports: Vec<SerialInfo>) -> Result<String> {
    if ports.is_empty() {
        return Err(eyre!("No serial port to choose from")
            .suggestion("Make sure the adapter is plugged in"));
    }

    execute!(stdout(), EnterAlternateScreen, Clear(ClearType::All))?;
    let index = loop {
        println!("Which serial port is the device on? (by number)\n");
        for (index, port) in ports.iter().enumerate() {
            println!("\t{index}: {}", describe(port));
        }

        print!("\n >>> ");

        stdout().flush()?;
        let mut buf = String::new();
        stdin().read_line(&mut buf)?;

        match buf.trim().parse::<usize>() {
            Ok(i) if i < ports.len() => break i,
            Ok(_) => warn_in_red("Index out of range")?,
            Err(_) => warn_in_red("Please enter a valid number")?,
        }

        println!();
    };

    execute!(stdout(), LeaveAlternateScreen)?;
    // index < ports.len() was checked in the loop
    Ok(ports.swap_remove(index).name)
}
