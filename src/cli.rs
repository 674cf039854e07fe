//! Command-line argument parsing for clinic-visor

use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the public display (default)
    Display,
    Login { username: String, password: String },
    Queue,
    History,
    Register {
        name: String,
        cpf: String,
        phone: String,
        age: String,
        kind: String,
    },
    Call { id: String },
    Finish { id: String },
    /// Patient self-service: look up today's ticket by CPF
    Patient { cpf: String },
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub command: Command,
    pub once: bool,
    /// Keep refreshing the patient status until interrupted
    pub watch: bool,
    pub validate: bool,
    pub help: bool,
}

pub fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_from(&args)
}

/// Parse arguments without the program name
pub fn parse_from(args: &[String]) -> Result<Args> {
    let mut once = false;
    let mut watch = false;
    let mut validate = false;
    let mut help = false;
    let mut positional: Vec<&str> = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--once" => once = true,
            "--watch" => watch = true,
            "--validate" => validate = true,
            "--help" | "-h" => help = true,
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            value => positional.push(value),
        }
    }

    let command = match positional.split_first() {
        None => Command::Display,
        Some((name, rest)) => build_command(name, rest)?,
    };

    if watch && !matches!(command, Command::Patient { .. }) {
        bail!("--watch only applies to: clinic-visor patient CPF --watch");
    }

    Ok(Args {
        command,
        once,
        watch,
        validate,
        help,
    })
}

fn build_command(name: &str, rest: &[&str]) -> Result<Command> {
    let operands = |count: usize, usage: &str| -> Result<Vec<String>> {
        if rest.len() != count {
            bail!("Usage: clinic-visor {}", usage);
        }
        Ok(rest.iter().map(|s| s.to_string()).collect())
    };

    Ok(match name {
        "display" => {
            operands(0, "display [--once]")?;
            Command::Display
        }
        "login" => {
            let mut v = operands(2, "login USER PASSWORD")?.into_iter();
            Command::Login {
                username: v.next().unwrap_or_default(),
                password: v.next().unwrap_or_default(),
            }
        }
        "queue" => {
            operands(0, "queue")?;
            Command::Queue
        }
        "history" => {
            operands(0, "history")?;
            Command::History
        }
        "register" => {
            let mut v = operands(5, "register NAME CPF PHONE AGE NORMAL|PREFERENCIAL")?.into_iter();
            Command::Register {
                name: v.next().unwrap_or_default(),
                cpf: v.next().unwrap_or_default(),
                phone: v.next().unwrap_or_default(),
                age: v.next().unwrap_or_default(),
                kind: v.next().unwrap_or_default(),
            }
        }
        "call" => Command::Call {
            id: operands(1, "call PATIENT_ID")?.remove(0),
        },
        "finish" => Command::Finish {
            id: operands(1, "finish PATIENT_ID")?.remove(0),
        },
        "patient" => Command::Patient {
            cpf: operands(1, "patient CPF [--watch]")?.remove(0),
        },
        other => bail!("Unknown command: {} (see --help)", other),
    })
}

pub fn print_help() {
    println!("clinic-visor - Clinic queue display and attendant console\n");
    println!("USAGE:");
    println!("    clinic-visor [COMMAND] [OPTIONS]\n");
    println!("COMMANDS:");
    println!("    display                      Run the public call display (default)");
    println!("    login USER PASSWORD          Print an attendant token");
    println!("    queue                        List patients waiting or in service");
    println!("    history                      List finished services");
    println!("    register NAME CPF PHONE AGE TYPE");
    println!("                                 Register a patient (TYPE: NORMAL|PREFERENCIAL)");
    println!("    call ID                      Call a patient");
    println!("    finish ID                    Finish a patient's service");
    println!("    patient CPF                  Show a patient's ticket and forecast\n");
    println!("OPTIONS:");
    println!("    --once              Refresh the display once, show queued calls and exit");
    println!("    --watch             With `patient`, refresh the status every POLL_INTERVAL_MS");
    println!("    --validate          Validate configuration and exit");
    println!("    --help, -h          Show this help message\n");
    println!("ENVIRONMENT:");
    println!("    API_BASE_URL, POLL_INTERVAL_MS, DWELL_SECS, HTTP_TIMEOUT_SECS,");
    println!("    WAITING_LIMIT, RECENT_LIMIT, FINISHED_LIMIT, DISPLAY_TIMEZONE,");
    println!("    HEALTH_PORT, QUEUE_API_TOKEN (a .env file is read if present)");
}
