//! A small interactive harness around [`uslos_sim::Simulator`]: wires up a
//! simulator against a working directory, installs pass-through interrupt
//! handlers that just log, and drives `tick()` and `seek`/`status` from
//! stdin commands.
//!
//! This exists so the device/dispatch core can be explored by hand instead
//! of only through `cargo test`. `read`/`write`/`tracks` aren't exposed
//! here: their buffer pointers must stay valid for the whole
//! request-to-action gap (see `disk::DiskRequest`'s safety contract), which
//! a one-command-per-stdin-line harness can't guarantee without a much
//! bigger scripted-sequence feature than this harness needs.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use uslos_sim::{DeviceClass, DeviceRequest, DiskRequest, SimError, Simulator};

#[derive(Parser)]
#[command(about = "Interactive USLOSS-style device/dispatch harness")]
struct Args {
    /// Directory to scan for disk0, disk1, … backing files.
    #[arg(long, default_value = ".")]
    disk_dir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut sim = match Simulator::new(&args.disk_dir, || true) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("failed to start simulator: {err}");
            std::process::exit(1);
        }
    };

    sim.vector_mut().install(DeviceClass::Clock, |dev, _| {
        tracing::info!(?dev, "clock interrupt delivered");
    });
    sim.vector_mut().install(DeviceClass::Disk, |dev, arg| {
        tracing::info!(?dev, ?arg, "disk interrupt delivered");
    });

    println!("uslos-sim ready. commands: tick | seek U T | status U | quit");
    let stdin = io::stdin();
    print!("> ");
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                report(Err(SimError::from(err)));
                continue;
            }
        };
        run_command(&mut sim, line.trim());
        print!("> ");
        let _ = io::stdout().flush();
    }
}

fn run_command(sim: &mut Simulator, line: &str) {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("quit") => std::process::exit(0),
        Some("tick") => report(sim.tick().map(|_| "ticked".to_string())),
        Some("status") => {
            let Some(unit) = parts.next().and_then(|s| s.parse::<usize>().ok()) else {
                return println!("usage: status U");
            };
            report(
                sim.input(DeviceClass::Disk, unit)
                    .map(|(result, status)| format!("{result:?} {status:?}")),
            );
        }
        Some("seek") => {
            let unit = parts.next().and_then(|s| s.parse::<usize>().ok());
            let track = parts.next().and_then(|s| s.parse::<i32>().ok());
            let (Some(unit), Some(track)) = (unit, track) else {
                return println!("usage: seek U T");
            };
            report(
                sim.output(DeviceClass::Disk, unit, DeviceRequest::Disk(DiskRequest::Seek { track }))
                    .map(|r| format!("{r:?}")),
            );
        }
        Some(other) => println!("unknown command: {other}"),
    }
}

fn report(result: Result<String, SimError>) {
    match result {
        Ok(msg) => println!("{msg}"),
        Err(err) => {
            eprintln!("fatal: {err}");
            std::process::exit(1);
        }
    }
}
