//! Command-line driver for the flight surety ledger.
//!
//! Besides a few helpers for deriving keys and writing configuration files,
//! the binary can replay a JSON script of operations against a fresh ledger
//! and print the outcome of every step.

use flight_surety::{
    encode_timestamp, format_units, parse_units, Address, Balance, EngineConfig, FlightKey,
    FlightSurety, NetworkConfig, NetworkEndpoint, OracleReport, ResponseOutcome, StatusCode,
    SuretyError,
};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing_subscriber::EnvFilter;

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_help() {
    println!("Usage: surety <command> ...");
    println!("  timestamp <year> <month> <day> <hour> <minute>");
    println!("  flight-key <airline> <code> <timestamp>");
    println!("  config <init|show> <path>");
    println!("  network init <path> <name> <url> <data_address> <app_address>");
    println!("  replay <ops.json> [--config <engine.json>] [--events <out.jsonl>]");
    println!();
    println!("Identities are 0x-prefixed addresses or labels hashed into one.");
    println!("Amounts are decimal units, e.g. 10 or 0.5.");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let command = args.next();
    match command.as_deref() {
        Some("timestamp") => cmd_timestamp(args.collect()),
        Some("flight-key") => cmd_flight_key(args.collect()),
        Some("config") => {
            let sub = args
                .next()
                .unwrap_or_else(|| fatal("Usage: surety config <init|show> <path>"));
            handle_config(&sub, args.collect());
        }
        Some("network") => {
            let sub = args.next().unwrap_or_else(|| {
                fatal("Usage: surety network init <path> <name> <url> <data_address> <app_address>")
            });
            handle_network(&sub, args.collect());
        }
        Some("replay") => cmd_replay(args.collect()),
        Some("-h") | Some("--help") => print_help(),
        _ => {
            eprintln!("Usage: surety <timestamp|flight-key|config|network|replay> ...");
            std::process::exit(1);
        }
    }
}

fn identity(raw: &str) -> Address {
    if raw.starts_with("0x") {
        raw.parse()
            .unwrap_or_else(|err| fatal(&format!("invalid address {raw}: {err}")))
    } else {
        Address::from_label(raw)
    }
}

fn amount(raw: &str) -> Balance {
    parse_units(raw).unwrap_or_else(|err| fatal(&format!("invalid amount {raw}: {err}")))
}

fn cmd_timestamp(args: Vec<String>) {
    if args.len() < 5 {
        fatal("Usage: surety timestamp <year> <month> <day> <hour> <minute>");
    }
    let year: i32 = args[0].parse().unwrap_or_else(|_| fatal("invalid year"));
    let mut fields = [0u32; 4];
    for (slot, raw) in fields.iter_mut().zip(&args[1..5]) {
        *slot = raw
            .parse()
            .unwrap_or_else(|_| fatal(&format!("invalid calendar field {raw}")));
    }
    match encode_timestamp(year, fields[0], fields[1], fields[2], fields[3]) {
        Ok(ts) => println!("{ts}"),
        Err(err) => fatal(&err.to_string()),
    }
}

fn cmd_flight_key(args: Vec<String>) {
    if args.len() < 3 {
        fatal("Usage: surety flight-key <airline> <code> <timestamp>");
    }
    let airline = identity(&args[0]);
    let timestamp: i64 = args[2]
        .parse()
        .unwrap_or_else(|_| fatal("invalid timestamp"));
    println!("{}", FlightKey::derive(&airline, &args[1], timestamp));
}

fn handle_config(sub: &str, tail: Vec<String>) {
    let path = tail
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| fatal("Usage: surety config <init|show> <path>"));
    match sub {
        "init" => {
            if path.exists() {
                fatal(&format!("refusing to overwrite {}", path.display()));
            }
            EngineConfig::default()
                .save(&path)
                .unwrap_or_else(|err| fatal(&format!("failed to write {}: {err}", path.display())));
            println!("wrote {}", path.display());
        }
        "show" => {
            let config = EngineConfig::load(&path)
                .unwrap_or_else(|err| fatal(&format!("failed to load {}: {err}", path.display())));
            let pretty = serde_json::to_string_pretty(&config)
                .unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
            println!("{pretty}");
        }
        other => fatal(&format!("unknown config command: {other}")),
    }
}

fn handle_network(sub: &str, tail: Vec<String>) {
    if sub != "init" {
        fatal(&format!("unknown network command: {sub}"));
    }
    if tail.len() < 5 {
        fatal("Usage: surety network init <path> <name> <url> <data_address> <app_address>");
    }
    let path = Path::new(&tail[0]);
    let mut networks = if path.exists() {
        NetworkConfig::load(path)
            .unwrap_or_else(|err| fatal(&format!("failed to load {}: {err}", path.display())))
    } else {
        NetworkConfig::default()
    };
    networks.insert(
        tail[1].clone(),
        NetworkEndpoint {
            url: tail[2].clone(),
            data_address: tail[3].clone(),
            app_address: tail[4].clone(),
        },
    );
    networks
        .save(path)
        .unwrap_or_else(|err| fatal(&format!("failed to write {}: {err}", path.display())));
    println!("wrote network {} to {}", tail[1], path.display());
}

/// One step of a replay script.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Op {
    Apply {
        caller: String,
        name: String,
        airline: String,
    },
    Vote {
        caller: String,
        name: String,
        airline: String,
    },
    Fund {
        caller: String,
        amount: String,
    },
    RegisterFlight {
        caller: String,
        code: String,
        timestamp: i64,
    },
    RegisterOracle {
        caller: String,
        #[serde(default)]
        fee: Option<String>,
    },
    RegisterOracles {
        prefix: String,
        count: u32,
        #[serde(default)]
        fee: Option<String>,
    },
    Fetch {
        caller: String,
        airline: String,
        code: String,
        timestamp: i64,
    },
    Respond {
        caller: String,
        airline: String,
        code: String,
        timestamp: i64,
        status: StatusCode,
        #[serde(default)]
        index: Option<u8>,
    },
    RespondAll {
        airline: String,
        code: String,
        timestamp: i64,
        status: StatusCode,
    },
    Buy {
        passenger: String,
        airline: String,
        code: String,
        timestamp: i64,
        amount: String,
    },
    Withdraw {
        passenger: String,
    },
    SetOperating {
        caller: String,
        operational: bool,
    },
}

fn cmd_replay(args: Vec<String>) {
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("Usage: surety replay <ops.json> [--config <engine.json>] [--events <out.jsonl>]");
        return;
    }
    let mut script: Option<String> = None;
    let mut config_path: Option<String> = None;
    let mut events_path: Option<String> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(
                    iter.next()
                        .unwrap_or_else(|| fatal("--config expects a value")),
                );
            }
            "--events" => {
                events_path = Some(
                    iter.next()
                        .unwrap_or_else(|| fatal("--events expects a value")),
                );
            }
            other if other.starts_with("--") => fatal(&format!("unknown argument: {other}")),
            other => {
                if script.replace(other.to_string()).is_some() {
                    fatal("replay takes a single script");
                }
            }
        }
    }
    let script = script.unwrap_or_else(|| fatal("replay requires a script path"));

    let config = match config_path {
        Some(path) => EngineConfig::load(Path::new(&path))
            .unwrap_or_else(|err| fatal(&format!("failed to load {path}: {err}"))),
        None => EngineConfig::default(),
    };
    let raw = fs::read_to_string(&script)
        .unwrap_or_else(|err| fatal(&format!("failed to read {script}: {err}")));
    let ops: Vec<Op> = serde_json::from_str(&raw)
        .unwrap_or_else(|err| fatal(&format!("invalid script {script}: {err}")));

    let mut ledger =
        FlightSurety::new(config).unwrap_or_else(|err| fatal(&format!("invalid config: {err}")));
    let mut failures = 0usize;
    for (step, op) in ops.iter().enumerate() {
        match apply_op(&mut ledger, op) {
            Ok(summary) => println!("[{step}] ok: {summary}"),
            Err(err) => {
                failures += 1;
                println!("[{step}] rejected: {err}");
            }
        }
    }

    if let Some(path) = events_path {
        let written = ledger
            .events()
            .write_jsonl(Path::new(&path), 0)
            .unwrap_or_else(|err| fatal(&format!("failed to write {path}: {err}")));
        println!("events: {written} written to {path}");
    }
    println!(
        "steps: {} rejected: {failures} pool: {}",
        ops.len(),
        format_units(ledger.pool())
    );
}

fn apply_op(ledger: &mut FlightSurety, op: &Op) -> Result<String, SuretyError> {
    match op {
        Op::Apply {
            caller,
            name,
            airline,
        } => {
            let outcome = ledger.apply_airline(&identity(caller), name, identity(airline))?;
            Ok(format!("apply {name}: {outcome:?}"))
        }
        Op::Vote {
            caller,
            name,
            airline,
        } => {
            let outcome = ledger.vote_airline(&identity(caller), name, identity(airline))?;
            Ok(format!("vote {name}: {outcome:?}"))
        }
        Op::Fund { caller, amount: raw } => {
            let outcome = ledger.fund(&identity(caller), amount(raw))?;
            Ok(format!("fund {caller}: {outcome:?}"))
        }
        Op::RegisterFlight {
            caller,
            code,
            timestamp,
        } => {
            let key = ledger.register_flight(&identity(caller), code, *timestamp)?;
            Ok(format!("flight {code} registered as {key}"))
        }
        Op::RegisterOracle { caller, fee } => {
            let fee = match fee {
                Some(raw) => amount(raw),
                None => ledger.config().registration_fee,
            };
            let indices = ledger.register_oracle(&identity(caller), fee)?;
            Ok(format!("oracle {caller} holds {indices:?}"))
        }
        Op::RegisterOracles { prefix, count, fee } => {
            let fee = match fee {
                Some(raw) => amount(raw),
                None => ledger.config().registration_fee,
            };
            for n in 1..=*count {
                ledger.register_oracle(&identity(&format!("{prefix}-{n}")), fee)?;
            }
            Ok(format!("registered {count} oracles as {prefix}-1..{prefix}-{count}"))
        }
        Op::Fetch {
            caller,
            airline,
            code,
            timestamp,
        } => {
            let key = ledger.fetch_flight_status(&identity(caller), identity(airline), code, *timestamp)?;
            Ok(format!("status request for {code} on index {}", key.index))
        }
        Op::Respond {
            caller,
            airline,
            code,
            timestamp,
            status,
            index,
        } => {
            let airline = identity(airline);
            let index = match index {
                Some(index) => *index,
                None => request_index(ledger, &airline, code, *timestamp)?,
            };
            let report = OracleReport {
                index,
                airline,
                code: code.clone(),
                timestamp: *timestamp,
                status: *status,
            };
            let outcome = ledger.submit_response(&identity(caller), &report)?;
            Ok(format!("response from {caller}: {outcome:?}"))
        }
        Op::RespondAll {
            airline,
            code,
            timestamp,
            status,
        } => {
            let airline = identity(airline);
            let index = request_index(ledger, &airline, code, *timestamp)?;
            let responders: Vec<Address> = ledger
                .oracles()
                .into_iter()
                .filter(|oracle| oracle.holds(index))
                .map(|oracle| oracle.address)
                .collect();
            let report = OracleReport {
                index,
                airline,
                code: code.clone(),
                timestamp: *timestamp,
                status: *status,
            };
            let mut counted = 0usize;
            for oracle in responders {
                counted += 1;
                if let ResponseOutcome::Finalized { status, .. } =
                    ledger.submit_response(&oracle, &report)?
                {
                    return Ok(format!(
                        "{code} finalized as {status} after {counted} responses"
                    ));
                }
            }
            Ok(format!(
                "{counted} oracles responded on index {index}; quorum not reached"
            ))
        }
        Op::Buy {
            passenger,
            airline,
            code,
            timestamp,
            amount: raw,
        } => {
            let flight = FlightKey::derive(&identity(airline), code, *timestamp);
            let total = ledger.buy(&identity(passenger), flight, amount(raw))?;
            Ok(format!(
                "{passenger} holds {} units on {code}",
                format_units(total)
            ))
        }
        Op::Withdraw { passenger } => {
            let address = identity(passenger);
            let moved = ledger.withdraw(&address)?;
            Ok(format!(
                "{passenger} withdrew {} (withdrawable {})",
                format_units(moved),
                format_units(ledger.withdrawable(&address))
            ))
        }
        Op::SetOperating {
            caller,
            operational,
        } => {
            ledger.set_operating_status(&identity(caller), *operational)?;
            Ok(format!("operational = {operational}"))
        }
    }
}

fn request_index(
    ledger: &FlightSurety,
    airline: &Address,
    code: &str,
    timestamp: i64,
) -> Result<u8, SuretyError> {
    let flight = FlightKey::derive(airline, code, timestamp);
    ledger
        .status_request(&flight)
        .map(|request| request.key.index)
        .ok_or(SuretyError::RequestNotFound)
}
