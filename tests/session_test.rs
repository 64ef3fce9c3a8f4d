use std::time::Duration;

use kwl_bus::catalog::id;
use kwl_bus::options::{self, Parsed};
use kwl_bus::turn::{CUE, IDLE_GAP};
use kwl_bus::{Command, Engine, FanControl};

/// Grant one turn and return what the engine sends, if anything.
fn grant_turn(engine: &mut Engine) -> Option<Vec<u8>> {
    let mut transmit = None;
    for (n, byte) in CUE.iter().enumerate() {
        let idle = if n == 0 { IDLE_GAP } else { Duration::from_millis(1) };
        let step = engine.receive_byte(*byte, idle);
        if let Some(frame) = step.transmit {
            transmit = Some(frame.to_vec());
        }
    }
    transmit
}

fn engine(args: &[&str]) -> Engine {
    let options = match options::parse(args).unwrap() {
        Parsed::Run(options) => options,
        Parsed::Help => panic!("help"),
    };
    let mut engine = Engine::new(options.config);
    for request in options.requests {
        engine.request(request);
    }
    engine
}

#[test]
fn one_shot_session() {
    let mut engine = engine(&["-t", "12:30", "--get-hours-on"]);

    assert_eq!(grant_turn(&mut engine), None);
    assert_eq!(
        grant_turn(&mut engine),
        Some(Command::GetVar(id::SENSORS_TEMP).encode().to_vec())
    );
    assert_eq!(
        grant_turn(&mut engine),
        Some(Command::SetVar16(id::TIME_OF_DAY, 12 | 30 << 8).encode().to_vec())
    );
    assert_eq!(
        grant_turn(&mut engine),
        Some(Command::GetVar(id::HOURS_ON).encode().to_vec())
    );
    assert!(!engine.is_terminated());
    assert_eq!(grant_turn(&mut engine), None);
    assert!(engine.is_terminated());
}

#[test]
fn manual_fan_disables_auto_first() {
    let mut engine = engine(&["-f", "m:2"]);
    grant_turn(&mut engine);
    grant_turn(&mut engine);

    assert_eq!(
        grant_turn(&mut engine),
        Some(Command::fan(FanControl::Manual).encode().to_vec())
    );
    assert_eq!(
        grant_turn(&mut engine),
        Some(Command::fan(FanControl::Level(2)).encode().to_vec())
    );
    assert_eq!(grant_turn(&mut engine), None);
    assert!(engine.is_terminated());
}

#[test]
fn loop_session_keeps_polling() {
    let mut engine = engine(&["--loop"]);
    assert!(engine.config().continuous);

    let sent: Vec<Option<Vec<u8>>> = (0..12).map(|_| grant_turn(&mut engine)).collect();
    assert!(!engine.is_terminated());
    // reads queued by --loop come right after the bootstrap read
    assert_eq!(
        sent[2],
        Some(Command::GetVar(id::BYPASS1_TEMP).encode().to_vec())
    );
    assert_eq!(
        sent[3],
        Some(Command::GetVar(id::PARTY_REMAINING).encode().to_vec())
    );
    assert_eq!(
        sent[4],
        Some(Command::GetVar(id::QUIET_REMAINING).encode().to_vec())
    );
    // then the temperature sensors every fourth turn
    let sensors = Some(Command::GetVar(id::SENSORS_TEMP).encode().to_vec());
    assert_eq!(sent[6], sensors);
    assert_eq!(sent[10], sensors);
    assert_eq!(sent[5], None);
}
