mod common;

use common::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use kwl_bus::frame::{encode_raw, Malformed};
use kwl_bus::io::{Driver, Error};
use kwl_bus::keys::{Key, NoKeys};
use kwl_bus::{EngineConfig, Event};

fn driver(serial_sim: &Rc<RefCell<SerialInterface>>) -> Driver<SerialIOPlane> {
    Driver::new(SerialIOPlane::new(serial_sim), EngineConfig::default())
        .with_settle_delay(Duration::ZERO)
}

#[test]
fn bootstrap_then_terminate() {
    let _ = env_logger::builder().is_test(true).try_init();
    let serial_sim = SerialInterface::new(turns(3));
    let mut driver = driver(&serial_sim);

    let mut events = Vec::new();
    let result = driver.run(
        &mut |event: &Event| events.push(event.clone()),
        &mut NoKeys,
        &AtomicBool::new(false),
    );
    assert!(result.is_ok());
    assert!(driver.engine().is_terminated());
    // first turn observed, second used, third ends the run
    assert_eq!(serial_sim.borrow().tx(), &[0x13, 0x00, 0x01, 0x3a, 0x4f]);
    assert_eq!(serial_sim.borrow().remaining(), 1);
    assert!(events.is_empty());
}

#[test]
fn events_are_rendered() {
    let hours = encode_raw(0x11, 1, &[0x15, 0x10, 0x27, 0x00, 0x00]).unwrap();
    let script = vec![
        gap(),
        Chunk::Bytes(hours.to_vec()),
        gap(),
        Chunk::Bytes(vec![0x13, 0x00, 0x01, 0x3a, 0x50]),
    ];
    let serial_sim = SerialInterface::new(script);
    let mut driver = driver(&serial_sim);

    let mut events = Vec::new();
    driver
        .run(
            &mut |event: &Event| events.push(event.clone()),
            &mut NoKeys,
            &AtomicBool::new(false),
        )
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Event::HoursOn(10000));
    assert_eq!(events[0].to_string(), "hours on = 10000h (1.1yrs)");
    assert!(matches!(
        events[1],
        Event::Ignored {
            reason: Malformed::Checksum,
            ..
        }
    ));
    assert!(serial_sim.borrow().tx().is_empty());
}

#[test]
fn quit_key_stops_the_run() {
    let serial_sim = SerialInterface::new(turns(3));
    let mut driver = driver(&serial_sim);

    let mut keys = ScriptedKeys(vec![Some(Key::Quit)].into());
    driver
        .run(&mut |_: &Event| {}, &mut keys, &AtomicBool::new(false))
        .unwrap();
    assert!(driver.engine().is_terminated());
    assert!(serial_sim.borrow().tx().is_empty());
    assert!(serial_sim.borrow().remaining() > 1);
}

#[test]
fn quit_on_cue_byte_sends_nothing() {
    let serial_sim = SerialInterface::new(turns(3));
    let mut driver = driver(&serial_sim);

    // one poll per byte, the eighth byte completes the second cue
    let mut polls = vec![None; 7];
    polls.push(Some(Key::Quit));
    let mut keys = ScriptedKeys(polls.into());
    driver
        .run(&mut |_: &Event| {}, &mut keys, &AtomicBool::new(false))
        .unwrap();
    assert!(driver.engine().is_terminated());
    assert_eq!(driver.engine().sequencer().turns(), 1);
    assert!(serial_sim.borrow().tx().is_empty());
}

#[test]
fn shutdown_flag() {
    let script = turns(3);
    let len = script.len();
    let serial_sim = SerialInterface::new(script);
    let mut driver = driver(&serial_sim);

    driver
        .run(&mut |_: &Event| {}, &mut NoKeys, &AtomicBool::new(true))
        .unwrap();
    assert_eq!(serial_sim.borrow().remaining(), len);
    assert!(!driver.engine().is_terminated());
}

#[test]
fn read_error_is_fatal() {
    let serial_sim = SerialInterface::new(vec![gap(), cue(), Chunk::ReadError, gap()]);
    let mut driver = driver(&serial_sim);

    let result = driver.run(&mut |_: &Event| {}, &mut NoKeys, &AtomicBool::new(false));
    assert!(matches!(result, Err(Error::Read { .. })));
    assert_eq!(serial_sim.borrow().remaining(), 1);
}

#[test]
fn write_error_is_not_fatal() {
    let serial_sim = SerialInterface::new(turns(3));
    let mut driver = driver(&serial_sim);

    serial_sim.borrow_mut().trigger_write_error();
    driver
        .run(&mut |_: &Event| {}, &mut NoKeys, &AtomicBool::new(false))
        .unwrap();
    assert!(driver.engine().is_terminated());
    assert!(serial_sim.borrow().tx().is_empty());
}
