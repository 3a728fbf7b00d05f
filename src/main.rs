mod cli;

use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells::Bash};
use itertools::Itertools;
use log::error;

use gpib_utils::channel::{self, Channel};
use gpib_utils::config::{AddressSpec, CommunicatorOptions};
use gpib_utils::GpibCommunicator;

use cli::{Cli, Commands};

enum OutputFormat {
    Plain,
    Json,
}

type Communicator = GpibCommunicator<Box<dyn Channel + Send>>;

fn open_channel(cli: &Cli) -> Result<Box<dyn Channel + Send>> {
    let channel: Box<dyn Channel + Send> = match &cli.host {
        Some(host) => Box::new(channel::open_socket(host)?),
        None => Box::new(channel::open_port(&cli.port, cli.baudrate, cli.force)?),
    };
    Ok(channel)
}

fn open_communicator(cli: &Cli) -> Result<Communicator> {
    let options = CommunicatorOptions {
        model: cli.model,
        gpib_address: cli.address.bus(),
        timeout: cli.timeout.into(),
        sleep_interval: cli.sleep.into(),
    };

    let mut comm = GpibCommunicator::with_options(open_channel(cli)?, options)?;

    if let AddressSpec::WithDownstream(..) = cli.address {
        comm.set_address(cli.address.clone())?;
    }
    if let Some(terminator) = cli.terminator {
        comm.set_terminator(terminator)?;
    }
    Ok(comm)
}

fn cmd_send(comm: &mut Communicator, text: &str) -> Result<String> {
    comm.send_command(text).map(|_| String::new())
}

fn cmd_query(
    comm: &mut Communicator,
    text: &str,
    size: Option<usize>,
    fmt: OutputFormat,
) -> Result<String> {
    comm.query(text, size).map(|response| match fmt {
        OutputFormat::Plain => response,
        OutputFormat::Json => json::stringify(response),
    })
}

fn cmd_read(comm: &mut Communicator, size: Option<usize>, fmt: OutputFormat) -> Result<String> {
    comm.read(size).map(|response| match fmt {
        OutputFormat::Plain => response.trim().to_string(),
        OutputFormat::Json => json::stringify(response.trim()),
    })
}

fn cmd_write(comm: &mut Communicator, text: &str) -> Result<String> {
    comm.write(text).map(|_| String::new())
}

fn cmd_status(comm: &Communicator, fmt: OutputFormat) -> Result<String> {
    let (bus, downstream) = comm.address();
    let version = comm
        .version()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());

    Ok(match fmt {
        OutputFormat::Plain => [
            format!("model      {}", comm.model()),
            format!("firmware   {}", version),
            format!("address    {} ({})", bus, downstream),
            format!("timeout    {:?}", comm.timeout()),
            format!("eoi        {}", comm.eoi()),
            format!("eos        {:?}", comm.eos()),
            format!("terminator {:?}", comm.terminator().to_string()),
            format!("sleep      {:?}", comm.sleep_interval()),
        ]
        .iter()
        .join("\n"),
        OutputFormat::Json => {
            let mut obj = json::JsonValue::new_object();
            obj["model"] = comm.model().to_string().into();
            obj["firmware"] = match comm.version() {
                Some(v) => v.into(),
                None => json::JsonValue::Null,
            };
            obj["address"] = bus.into();
            obj["downstream"] = downstream.into();
            obj["timeout"] = comm.timeout().as_secs_f64().into();
            obj["eoi"] = comm.eoi().into();
            obj["eos"] = comm.eos().to_string().into();
            obj["terminator"] = comm.terminator().to_string().into();
            obj["sleep"] = comm.sleep_interval().as_secs_f64().into();
            obj.dump()
        }
    })
}

fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(Bash, &mut Cli::command(), "gpib-tool", &mut io::stdout());
        return Ok(String::default());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    let mut comm = open_communicator(&cli)?;

    let res = match &cli.command {
        Commands::Send { text } => cmd_send(&mut comm, text),
        Commands::Query { text, size } => cmd_query(&mut comm, text, *size, fmt),
        Commands::Read { size } => cmd_read(&mut comm, *size, fmt),
        Commands::Write { text } => cmd_write(&mut comm, text),
        Commands::Status => cmd_status(&comm, fmt),
    };

    comm.close()?;
    res
}

fn main() {
    match do_main() {
        Ok(s) if s.is_empty() => (),
        Ok(s) => println!("{}", s),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
