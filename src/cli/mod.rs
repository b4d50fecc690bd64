pub mod commands;

use clap::{value_parser, Arg, ArgAction, Command};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Builds the command line: global overrides plus the diagnostic subcommands.
/// Without a subcommand the poller runs continuously.
pub fn build_cli() -> Command {
    Command::new("flow_poller")
        .version(crate::VERSION)
        .about("Polls Modbus RTU flowmeters and tracks which ones are reachable")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Path to the TOML configuration file")
                .value_name("FILE")
                .default_value(DEFAULT_CONFIG_PATH)
                .global(true),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .help("Serial port, overrides [serial].port")
                .value_name("PORT")
                .global(true),
        )
        .arg(
            Arg::new("baud")
                .long("baud")
                .short('b')
                .help("Baud rate, overrides [serial].baud_rate")
                .value_name("BAUD")
                .global(true),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .short('i')
                .help("Seconds between poll cycles")
                .value_name("SECONDS")
                .global(true),
        )
        .arg(
            Arg::new("devices")
                .long("devices")
                .short('d')
                .help("Comma separated device ids, e.g. 1,2,5")
                .value_name("IDS")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Enable debug logging, including raw frames")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("run").about("Poll all devices periodically and serve the status API"))
        .subcommand(Command::new("once").about("Run a single poll cycle and print a summary"))
        .subcommand(
            Command::new("probe")
                .about("Exchange one raw frame with a device and report how each field decodes")
                .arg(
                    Arg::new("device")
                        .long("device")
                        .help("Device id to probe")
                        .value_name("ID")
                        .required(true)
                        .value_parser(value_parser!(u8).range(1..=255)),
                ),
        )
        .subcommand(Command::new("ports").about("List available serial ports"))
        .subcommand(
            Command::new("init-config")
                .about("Write a configuration file with default values")
                .arg(
                    Arg::new("path")
                        .help("Where to write the file")
                        .value_name("PATH")
                        .required(true),
                ),
        )
}
