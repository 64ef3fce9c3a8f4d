use arrayvec::ArrayVec;

/// Bytes kept between two idle gaps before the buffer counts as overflowed.
pub const RX_CAPACITY: usize = 128;

/// Receive buffer collecting the bytes of one burst of bus traffic.
#[derive(Debug, Default, Clone)]
pub(crate) struct RxBuffer {
    data: ArrayVec<u8, RX_CAPACITY>,
}

impl RxBuffer {
    pub fn new() -> RxBuffer {
        RxBuffer {
            data: ArrayVec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_full(&self) -> bool {
        self.data.is_full()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Append a byte. Returns `false`, leaving the buffer untouched, when it is full.
    pub fn push(&mut self, byte: u8) -> bool {
        self.data.try_push(byte).is_ok()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut buf = RxBuffer::new();
        for n in 0..RX_CAPACITY {
            assert!(buf.push(n as u8));
        }
        assert!(buf.is_full());
        assert!(!buf.push(0xff));
        assert_eq!(buf.len(), RX_CAPACITY);
        assert_eq!(buf.as_slice()[RX_CAPACITY - 1], (RX_CAPACITY - 1) as u8);

        buf.clear();
        assert_eq!(buf.len(), 0);
        assert!(buf.push(0x13));
        assert_eq!(buf.as_slice(), &[0x13]);
    }
}
