/// Byte-addressed physical memory as seen by the simulated firmware.
///
/// Firmware only ever copies whole records (info blocks, descriptors) in and
/// out, so the bus is byte-wide with block helpers on top.
pub trait MemoryBus {
    fn read_u8(&self, addr: u32) -> u8;
    fn write_u8(&mut self, addr: u32, value: u8);

    fn read_bytes(&self, addr: u32, buf: &mut [u8]) {
        for (addr, out) in (addr..).zip(buf.iter_mut()) {
            *out = self.read_u8(addr);
        }
    }

    fn write_bytes(&mut self, addr: u32, bytes: &[u8]) {
        for (addr, &b) in (addr..).zip(bytes) {
            self.write_u8(addr, b);
        }
    }
}

/// Flat RAM. Reads past the end return `0xFF` (open bus) and writes are dropped.
#[derive(Debug, Clone)]
pub struct VecMemory {
    data: Vec<u8>,
}

impl VecMemory {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains(&self, addr: u32, len: usize) -> bool {
        (addr as usize)
            .checked_add(len)
            .is_some_and(|end| end <= self.data.len())
    }

    fn range(&self, addr: u32, len: usize) -> Option<core::ops::Range<usize>> {
        self.contains(addr, len)
            .then(|| addr as usize..addr as usize + len)
    }
}

impl MemoryBus for VecMemory {
    fn read_u8(&self, addr: u32) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or(0xFF)
    }

    fn write_u8(&mut self, addr: u32, value: u8) {
        if let Some(slot) = self.data.get_mut(addr as usize) {
            *slot = value;
        }
    }

    fn read_bytes(&self, addr: u32, buf: &mut [u8]) {
        match self.range(addr, buf.len()) {
            Some(range) => buf.copy_from_slice(&self.data[range]),
            None => {
                for (addr, out) in (addr..).zip(buf.iter_mut()) {
                    *out = self.read_u8(addr);
                }
            }
        }
    }

    fn write_bytes(&mut self, addr: u32, bytes: &[u8]) {
        match self.range(addr, bytes.len()) {
            Some(range) => self.data[range].copy_from_slice(bytes),
            None => {
                for (addr, &b) in (addr..).zip(bytes) {
                    self.write_u8(addr, b);
                }
            }
        }
    }
}
