#![warn(clippy::all, clippy::pedantic, clippy::cargo, clippy::nursery)]
use std::error::Error;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use log::LevelFilter;

use racetrack::config::{DEFAULT_DRIVER_TIME_SECS, DEFAULT_MAX_ROUNDS, DEFAULT_MOVE_DELAY_SECS};
use racetrack::{DriverRegistry, Race, RaceConfig, RaceHandle, RaceResult, SetupError, TrackMap};

#[derive(Debug, Parser)]
#[clap(
    name = "racetrack",
    version,
    about = "Grid race simulator for scripted drivers"
)]
struct Opts {
    /// Let driver faults abort the race and print full error reports
    #[clap(short, long)]
    debug: bool,

    /// Print every move
    #[clap(short, long)]
    verbose: bool,

    /// Randomize the start order of the drivers
    #[clap(short, long)]
    shuffle: bool,

    /// Print race events as JSON lines instead of log messages
    #[clap(short, long)]
    json: bool,

    /// Track file to race on
    #[clap(short, long, default_value = "maps/map.txt")]
    mapfile: PathBuf,

    /// Maximum number of rounds, cars might get stuck
    #[clap(short = 'r', long, default_value_t = DEFAULT_MAX_ROUNDS)]
    max_rounds: u32,

    /// Delay in seconds after each move
    #[clap(short = 't', long, default_value_t = DEFAULT_MOVE_DELAY_SECS)]
    time_delay: f64,

    /// Total driver time in seconds before a car is disqualified
    #[clap(short = 'e', long, default_value_t = DEFAULT_DRIVER_TIME_SECS)]
    driver_time: f64,

    /// Drivers: Lua scripts (`drivers/simple.lua`) or built-ins (`builtin:simple`)
    #[clap(required = true)]
    drivers: Vec<String>,
}

fn setup(opts: &Opts) -> Result<Race, SetupError> {
    let mut config = RaceConfig::from_secs(opts.max_rounds, opts.time_delay, opts.driver_time)?;
    config.debug = opts.debug;
    config.shuffle = opts.shuffle;

    let track = TrackMap::from_file(&opts.mapfile)?;
    Race::setup(track, opts.drivers.as_slice(), &DriverRegistry::default(), config)
}

// "error: cause: cause" on one line
fn diagnostic(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// Typing `p` pauses the race, `r` resumes it.
fn spawn_console(handle: RaceHandle) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match line.trim() {
                "p" | "pause" => {
                    handle.pause();
                }
                "r" | "resume" => {
                    handle.resume();
                }
                _ => {}
            }
        }
    });
}

fn print_standings(result: &RaceResult) {
    println!("--------------- !!! Race finished !!! -----------------");
    for standing in &result.standings {
        let distance = standing
            .distance
            .map_or_else(|| "none".to_string(), |d| d.to_string());
        println!(
            "{}: <{}> in {} car #{}, rounds={}, distance={}, time={:.3}s",
            standing.rank,
            standing.driver,
            standing.color,
            standing.car,
            standing.moves,
            distance,
            standing.driver_time_secs
        );
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let opts = Opts::parse();

    let level = if opts.json {
        LevelFilter::Off
    } else if opts.verbose || opts.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .try_init()
        .wrap_err("cannot install logger")?;

    let mut race = match setup(&opts) {
        Ok(race) => race,
        Err(err) if opts.debug => return Err(err).wrap_err("race setup failed"),
        Err(err) => {
            eprintln!("Error: {}", diagnostic(&err));
            std::process::exit(1);
        }
    };

    let events = opts.json.then(|| race.subscribe());
    let handle = race.handle();

    if !opts.json {
        println!(
            "Starting race. Time delay: {}, max rounds: {}, max driver time: {}",
            opts.time_delay, opts.max_rounds, opts.driver_time
        );
    }
    let racer = thread::spawn(move || race.run());
    handle.start();
    spawn_console(handle);

    if let Some(events) = events {
        for event in events.iter() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    let result = racer
        .join()
        .map_err(|_| eyre!("race thread panicked"))?
        .wrap_err("race aborted")?;
    if !opts.json {
        print_standings(&result);
    }
    Ok(())
}
