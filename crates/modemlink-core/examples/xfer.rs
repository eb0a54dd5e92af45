//! XMODEM/YMODEM transfer tool
//!
//! Sends or receives files over a serial port.
//!
//! Usage:
//!   cargo run --example xfer -- send [OPTIONS] FILE...
//!   cargo run --example xfer -- receive [OPTIONS] DEST
//!
//! Options:
//!   --port PORT       Serial port (default: /dev/ttyUSB0)
//!   --baud RATE       Baud rate (default: 115200)
//!   --protocol NAME   xmodem or ymodem (default: xmodem)
//!   --variant NAME    checksum, crc, 1k or g (default: crc)
//!   --text            Pad with CTRL-Z instead of NUL
//!   --config FILE     JSON timeout/retry settings
//!
//! Set RUST_LOG=modemlink_core=debug to trace the protocol exchange.

use anyhow::{bail, Context, Result};
use modemlink_core::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

enum Mode {
    Send,
    Receive,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut mode = None;
    let mut port_name = "/dev/ttyUSB0".to_string();
    let mut baud_rate = 115200u32;
    let mut protocol = Protocol::Xmodem;
    let mut variant = Variant::Crc;
    let mut text_mode = false;
    let mut config = TransferConfig::default();
    let mut paths: Vec<PathBuf> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "send" => mode = Some(Mode::Send),
            "receive" | "recv" => mode = Some(Mode::Receive),
            "--port" | "-p" => {
                i += 1;
                port_name = value(&args, i, "--port")?.to_string();
            }
            "--baud" | "-b" => {
                i += 1;
                baud_rate = value(&args, i, "--baud")?
                    .parse()
                    .context("--baud expects a number")?;
            }
            "--protocol" => {
                i += 1;
                protocol = match value(&args, i, "--protocol")? {
                    "xmodem" => Protocol::Xmodem,
                    "ymodem" => Protocol::Ymodem,
                    other => bail!("unknown protocol '{}'", other),
                };
            }
            "--variant" => {
                i += 1;
                variant = match value(&args, i, "--variant")? {
                    "checksum" => Variant::Checksum,
                    "crc" => Variant::Crc,
                    "1k" => Variant::OneK,
                    "g" => Variant::G,
                    other => bail!("unknown variant '{}'", other),
                };
            }
            "--text" => text_mode = true,
            "--config" => {
                i += 1;
                let path = value(&args, i, "--config")?;
                config = TransferConfig::from_file(path)
                    .with_context(|| format!("loading {}", path))?;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            arg if arg.starts_with('-') => bail!("unknown option '{}'", arg),
            arg => paths.push(PathBuf::from(arg)),
        }
        i += 1;
    }

    let Some(mode) = mode else {
        print_help();
        bail!("expected 'send' or 'receive'");
    };

    let options = TransferOptions::new(protocol, variant)
        .with_text_mode(text_mode)
        .with_config(config);
    options.validate()?;

    let abort = AbortSignal::new();
    let mut port = open_port(&port_name, Some(baud_rate))
        .with_context(|| format!("opening {}", port_name))?
        .with_abort(abort.clone());

    let mut show_progress = |report: &ProgressReport| {
        let name = report.file_name.as_deref().unwrap_or("-");
        match report.file_length {
            Some(len) => eprint!("\r{}: {}/{} bytes", name, report.bytes, len),
            None => eprint!("\r{}: {} bytes", name, report.bytes),
        }
        let _ = std::io::stderr().flush();
    };

    println!(
        "{} on {} @ {} baud",
        match mode {
            Mode::Send => "Sending",
            Mode::Receive => "Receiving",
        },
        port_name,
        baud_rate
    );

    let outcome = match mode {
        Mode::Send => {
            if paths.is_empty() {
                bail!("nothing to send");
            }
            send_files(&mut port, &paths, &options, Some(&mut show_progress), &abort)?
        }
        Mode::Receive => {
            let destination = match paths.as_slice() {
                [one] => one.clone(),
                [] if protocol == Protocol::Ymodem => PathBuf::from("."),
                _ => bail!("receive takes exactly one destination"),
            };
            receive_file(&mut port, &destination, &options, Some(&mut show_progress), &abort)?
        }
    };
    eprintln!();

    match outcome {
        TransferOutcome::Completed(summary) => {
            for file in &summary.files {
                println!(
                    "  {} ({} bytes)",
                    file.name.as_deref().unwrap_or("<unnamed>"),
                    file.bytes
                );
            }
            println!(
                "Done: {} bytes, {} blocks, {} retries in {:.1}s",
                summary.bytes,
                summary.blocks,
                summary.retries,
                summary.elapsed.as_secs_f64()
            );
        }
        TransferOutcome::Aborted => println!("Aborted"),
    }
    Ok(())
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    match args.get(i) {
        Some(v) => Ok(v.as_str()),
        None => bail!("{} expects a value", flag),
    }
}

fn print_help() {
    println!("XMODEM/YMODEM transfer tool");
    println!();
    println!("Usage:");
    println!("  xfer send [OPTIONS] FILE...");
    println!("  xfer receive [OPTIONS] DEST");
    println!();
    println!("Options:");
    println!("  --port PORT       Serial port (default: /dev/ttyUSB0)");
    println!("  --baud RATE       Baud rate (default: 115200)");
    println!("  --protocol NAME   xmodem or ymodem (default: xmodem)");
    println!("  --variant NAME    checksum, crc, 1k or g (default: crc)");
    println!("  --text            Pad with CTRL-Z instead of NUL");
    println!("  --config FILE     JSON timeout/retry settings");
}
