mod session;

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use session::{Session, SessionOptions, SessionOutcome};
use tfc_core::config::{RigConfig, apply_overrides};
use tfc_core::time::Millis;

const USAGE: &str = "Usage: tfc-emulator [--config <path>] [--seed <n>] [--trials <n>] [--debug] \
                     [--lick-interval <ms>] [--secondary]";

const DEFAULT_SEED: u64 = 1;
const DEFAULT_LICK_INTERVAL_MS: Millis = 250;

#[derive(Clone, Debug, Eq, PartialEq)]
struct CliArgs {
    config_path: Option<PathBuf>,
    seed: u64,
    trials: Option<u16>,
    debug: bool,
    lick_interval_ms: Millis,
    secondary: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config_path: None,
            seed: DEFAULT_SEED,
            trials: None,
            debug: false,
            lick_interval_ms: DEFAULT_LICK_INTERVAL_MS,
            secondary: false,
        }
    }
}

fn main() -> io::Result<()> {
    let args = parse_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });
    let config = build_config(&args).unwrap_or_else(|err| {
        eprintln!("{err}");
        process::exit(2);
    });

    let options = SessionOptions {
        seed: args.seed,
        lick_interval_ms: args.lick_interval_ms,
        primary_pulses: args.secondary,
    };
    let mut session = Session::new(&config, options).unwrap_or_else(|err| {
        eprintln!("invalid configuration: {err}");
        process::exit(2);
    });

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    writeln!(
        writer,
        "Conditioning rig emulator: {} rig, {} trials, seed {}",
        config.sync.role, config.session.number_of_trials, args.seed
    )?;

    let summary = session.run(&mut writer)?;
    writeln!(writer, "{summary}")?;

    if summary.outcome != SessionOutcome::Completed {
        writeln!(writer, "Session did not complete.")?;
        process::exit(1);
    }
    Ok(())
}

fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config_path = Some(PathBuf::from(expect_value(&mut args, &arg)?)),
            "--seed" => parsed.seed = parse_number(&expect_value(&mut args, &arg)?, &arg)?,
            "--trials" => parsed.trials = Some(parse_number(&expect_value(&mut args, &arg)?, &arg)?),
            "--lick-interval" => {
                parsed.lick_interval_ms = parse_number(&expect_value(&mut args, &arg)?, &arg)?;
            }
            "--debug" => parsed.debug = true,
            "--secondary" => parsed.secondary = true,
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }

    Ok(parsed)
}

fn expect_value<I: Iterator<Item = String>>(args: &mut I, flag: &str) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("Expected value after {flag}"))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value `{value}` for {flag}"))
}

/// Defaults for the chosen role, then the override file, then command-line flags.
fn build_config(args: &CliArgs) -> Result<RigConfig, String> {
    let mut config = if args.secondary {
        RigConfig::secondary_defaults()
    } else {
        RigConfig::defaults()
    };

    if let Some(path) = &args.config_path {
        let text = fs::read_to_string(path)
            .map_err(|err| format!("Cannot read {}: {err}", path.display()))?;
        apply_overrides(&text, &mut config)
            .map_err(|err| format!("{}: {err}", path.display()))?;
    }

    if let Some(trials) = args.trials {
        config.session.number_of_trials = trials;
    }
    if args.debug {
        config.debug.enabled = true;
    }
    Ok(config)
}
