use std::env;
use std::process;

use sendrecv::config::{self, Endpoint, SenderConfig};
use sendrecv::sender::parse_command_line;
use sendrecv::{Result, Sender, error};

const USAGE: &str = "\
Usage: sender <file>... [-]
       sender -

Sends each file, then standard input if `-` is given, one line at a time.
Arguments after `-` are ignored.

Environment:
    SENDRECV_ADDR   server address (default 127.0.0.1)
    SENDRECV_PORT   server port (default 56743)
    SENDRECV_LOG    log level: error, warn, info, debug (default info)";

fn main() {
    config::init_logging();

    if parse_command_line(env::args_os()).is_empty() {
        eprintln!("{USAGE}");
        process::exit(1);
    }

    if let Err(err) = run() {
        error!("{err}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let endpoint = Endpoint::from_env()?;

    let mut sender = Sender::with_config(&endpoint.addr, endpoint.port, SenderConfig::default())?;
    sender.execute(env::args_os())
}
