use anyhow::{Context, Result};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::Read;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use kwl_bus::io::{Driver, BAUD_RATE};
use kwl_bus::keys::{ChannelKeys, KeySource, NoKeys};
use kwl_bus::lock::DeviceLock;
use kwl_bus::options::{self, Options, Parsed, HELP};
use kwl_bus::Event;

const BANNER: &str = "In interactive mode -- abort with Ctrl-C or ESC.
↑..increase fan, ↓..decrease fan, a..auto mode, b..toggle bypass.";

fn main() -> ExitCode {
    env_logger::init();
    println!("Helios KWL control");

    let mut args = std::env::args();
    args.next(); // Skip program name
    let options = match options::parse(args) {
        Ok(Parsed::Run(options)) => options,
        Ok(Parsed::Help) => {
            println!("{}", HELP);
            return ExitCode::from(2);
        }
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::from(1);
        }
    };

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run(options: Options) -> Result<()> {
    let _lock = DeviceLock::acquire(&options.device)?;

    let serial = serialport::new(&options.device, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()
        .with_context(|| format!("Cannot setup {}", options.device))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))
            .context("Failed to install the Ctrl-C handler")?;
    }

    let mut driver = Driver::new(serial, options.config);
    for request in options.requests {
        driver.engine_mut().request(request);
    }

    let mut print = |event: &Event| println!("{}", event);
    if options.config.interactive {
        println!("{}", BANNER);
        let mut keys = stdin_keys();
        run_driver(&mut driver, &mut print, &mut keys, &shutdown)?;
    } else {
        run_driver(&mut driver, &mut print, &mut NoKeys, &shutdown)?;
    }

    if let Some(status) = driver.engine().final_status() {
        println!("{}", status);
    }
    Ok(())
}

fn run_driver(
    driver: &mut Driver<Box<dyn serialport::SerialPort>>,
    print: &mut impl FnMut(&Event),
    keys: &mut impl KeySource,
    shutdown: &AtomicBool,
) -> Result<()> {
    driver.run(print, keys, shutdown).context("Bus failure")
}

/// Read stdin on a separate thread, one chunk per read.
fn stdin_keys() -> ChannelKeys {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 16];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(len) => {
                    if tx.send(buf[..len].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    ChannelKeys::new(rx)
}
