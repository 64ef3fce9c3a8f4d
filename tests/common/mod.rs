#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::rc::Rc;
use std::time::Duration;

use kwl_bus::keys::{Key, KeySource};
use kwl_bus::turn::{CUE, IDLE_GAP};

/// Something the simulated line does next.
#[derive(Debug, Clone)]
pub enum Chunk {
    /// Bytes delivered one per read.
    Bytes(Vec<u8>),
    /// Quiet line: sleep, then report a read timeout.
    Pause(Duration),
    /// A failing read.
    ReadError,
}

/// A pause long enough to end a burst.
pub fn gap() -> Chunk {
    Chunk::Pause(IDLE_GAP + Duration::from_millis(5))
}

pub fn cue() -> Chunk {
    Chunk::Bytes(CUE.to_vec())
}

/// `turns` bus turns granted to our panel, each after an idle gap.
pub fn turns(turns: usize) -> Vec<Chunk> {
    let mut script = Vec::new();
    for _ in 0..turns {
        script.push(gap());
        script.push(cue());
    }
    script.push(gap());
    script
}

pub struct SerialInterface {
    script: VecDeque<Chunk>,
    tx: Vec<u8>,
    do_write_error: bool,
}

pub struct SerialIOPlane(Rc<RefCell<SerialInterface>>);

impl SerialIOPlane {
    pub fn new(serial_if: &Rc<RefCell<SerialInterface>>) -> SerialIOPlane {
        SerialIOPlane(serial_if.clone())
    }
}

impl SerialInterface {
    pub fn new(script: Vec<Chunk>) -> Rc<RefCell<SerialInterface>> {
        Rc::new(RefCell::new(SerialInterface {
            script: script.into(),
            tx: Vec::new(),
            do_write_error: false,
        }))
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }

    pub fn tx(&self) -> &[u8] {
        &self.tx
    }

    /// Script items not consumed yet.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl std::io::Read for SerialIOPlane {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        match inner.script.pop_front() {
            None => Ok(0),
            Some(Chunk::Pause(pause)) => {
                std::thread::sleep(pause);
                Err(Error::new(ErrorKind::TimedOut, "no data"))
            }
            Some(Chunk::ReadError) => Err(Error::new(ErrorKind::PermissionDenied, "read failed")),
            Some(Chunk::Bytes(mut bytes)) => {
                if bytes.is_empty() {
                    return Ok(0);
                }
                buf[0] = bytes.remove(0);
                if !bytes.is_empty() {
                    inner.script.push_front(Chunk::Bytes(bytes));
                }
                Ok(1)
            }
        }
    }
}

impl std::io::Write for SerialIOPlane {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.do_write_error {
            inner.do_write_error = false;
            Err(Error::new(ErrorKind::PermissionDenied, "write failed"))
        } else {
            inner.tx.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Hands out a fixed sequence of keys, one per poll.
pub struct ScriptedKeys(pub VecDeque<Option<Key>>);

impl KeySource for ScriptedKeys {
    fn poll_key(&mut self) -> Option<Key> {
        self.0.pop_front().flatten()
    }
}
