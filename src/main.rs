use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use std::io::{self, BufRead, Read, Write};
use std::process::ExitCode;
use std::time::Duration;
use vc_mini::{Session, SessionConfig, Simulator};

#[derive(Parser, Debug)]
#[command(name = "valve_cli", version, about = "Control a VC Mini valve controller over a serial port")]
struct Cli {
    /// Serial port path or name (e.g. /dev/ttyUSB0, COM3).
    #[arg(short, long, env = "VALVE_PORT", required_unless_present = "simulate")]
    port: Option<String>,

    #[arg(short, long, default_value_t = 38400)]
    baud: u32,

    /// Per-read timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Give up after this many empty reads instead of waiting forever.
    #[arg(long)]
    max_idle_reads: Option<u32>,

    /// Talk to the built-in simulator instead of a serial port.
    #[arg(long)]
    simulate: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Load bank 0, set the shot parameters and fire one shot.
    Fire {
        #[arg(long, default_value_t = 400)]
        peak_time: u32,
        #[arg(long, default_value_t = 1000)]
        open_time: u32,
        #[arg(long, default_value_t = 60000)]
        cycle_time: u32,
        #[arg(long, default_value_t = 13)]
        peak_current: u8,
        #[arg(long, default_value_t = 100)]
        shot_count: u32,
        /// Fire both valves instead of valve 1 only.
        #[arg(long)]
        both: bool,
    },
    /// Send one raw command after initialisation and print the reply.
    Send { raw: String },
    /// Print the bus address the controller reports.
    Address,
    /// Enter raw commands line by line.
    Interactive,
}

// The main entry point for the command-line driver.
fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = SessionConfig::new(cli.port.clone().unwrap_or_default())
        .baud_rate(cli.baud)
        .read_timeout(Duration::from_millis(cli.timeout_ms));
    if let Some(reads) = cli.max_idle_reads {
        config = config.idle_read_limit(reads);
    }

    let result = if cli.simulate {
        println!("Using simulated controller.");
        run(Session::with_config(Simulator::new(), &config), cli.mode)
    } else {
        Session::open(&config).and_then(|session| run(session, cli.mode))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn run<T: Read + Write>(mut session: Session<T>, mode: Mode) -> vc_mini::Result<()> {
    session.init()?;

    match mode {
        Mode::Fire {
            peak_time,
            open_time,
            cycle_time,
            peak_current,
            shot_count,
            both,
        } => {
            session.load_parameters(0, 0)?;
            session.set_peak_time(peak_time)?;
            session.set_open_time(open_time)?;
            session.set_cycle_time(cycle_time)?;
            session.set_peak_current(peak_current)?;
            session.set_shot_count(shot_count)?;
            let reply = session.single_shot(true, both)?;
            println!(
                "Fired (peak current {} mA). < {}",
                vc_mini::command::peak_current_milliamps(peak_current),
                reply.trim_end()
            );
        }
        Mode::Send { raw } => {
            let reply = session.command(&raw)?;
            println!("< {}", reply.trim_end());
        }
        Mode::Address => {
            println!("Address: {}", session.get_address()?);
        }
        Mode::Interactive => run_interactive(&mut session)?,
    }

    session.disconnect();
    Ok(())
}

// Handles the manual command input mode.
fn run_interactive<T: Read + Write>(session: &mut Session<T>) -> vc_mini::Result<()> {
    println!("\n--- Manual Mode ---");
    println!("Enter raw commands, or type 'exit' to quit.");
    prompt()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = line?;
        let command = input.trim();

        if command == "exit" {
            break;
        }

        if !command.is_empty() {
            match session.command(command) {
                Ok(reply) => println!("< {}", reply.trim_end()),
                Err(e) => print_error(&e),
            }
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}

fn print_error(error: &vc_mini::Error) {
    eprintln!("{} {}", "[ERROR]".red().bold(), error);
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("        caused by: {}", cause);
        source = std::error::Error::source(cause);
    }
}
