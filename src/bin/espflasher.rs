// Copyright 2022 Stephen Checkoway
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{app_from_crate, arg, App, AppSettings, ArgMatches};

use espflasher::event::EventTracer;
use espflasher::serial::SerialPort;
use espflasher::Session;

const DEFAULT_SYNC_TIMEOUT_MS: u32 = 100;
const DEFAULT_CONNECT_TRIALS: u32 = 10;

fn arguments() -> ArgMatches {
    app_from_crate!()
        .global_setting(AppSettings::PropagateVersion)
        .global_setting(AppSettings::UseLongFormatForHelpSubcommand)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            arg!(-p --port <PORT> "Path to serial port")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-t --trace "Trace serial communication")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-b --baud <BAUD> "Set the serial port speed after connecting")
                .required(false)
                .global(true),
        )
        .subcommand(App::new("detect-chip").about("Detect the type of the ESP chip"))
        .subcommand(App::new("list-ports").about("List serial ports"))
        .get_matches()
}

fn open_session(args: &ArgMatches) -> Result<Session<SerialPort>> {
    let port_path = args.value_of("port").unwrap_or("/dev/ttyUSB0");
    let port = SerialPort::open(port_path, 115200).context("failed to open serial port")?;

    let mut session = Session::new(port);
    if args.is_present("trace") {
        session.add_observer(EventTracer::new(std::io::stderr(), |_| true).into());
    }

    session.connect(DEFAULT_SYNC_TIMEOUT_MS, DEFAULT_CONNECT_TRIALS)?;

    if let Some(rate) = args.value_of("baud") {
        let rate = u32::from_str(rate)?;
        session.change_transmission_rate(rate)?;
        session.port_mut().set_baud_rate(rate)?;
    }

    Ok(session)
}

fn main() -> Result<()> {
    let args = arguments();
    let (subcmd, _sub_args) = args.subcommand().unwrap();

    match subcmd {
        "detect-chip" => {
            let mut session = open_session(&args)?;
            println!("{}", session.target().expect("connect() always detects a target"));
            session.reset_target()?;
        }
        "list-ports" => {
            let ports = serialport::available_ports().context("failed to detect serial ports")?;
            println!("{ports:#?}");
        }
        _ => unreachable!(),
    }

    Ok(())
}
