//! Abstract view of the instrumented program's memory.
//!
//! The reporter never touches raw pointers: every dereference goes through
//! this trait, so the same reporting code serves the VM's flat memory and
//! the plain byte buffers the tests use.

/// Read-only byte-addressed memory with an ELF-style text boundary.
pub trait Memory {
    /// Read `len` bytes starting at `addr`, or `None` when any part of the
    /// range is unmapped.
    fn read(&self, addr: u64, len: usize) -> Option<Vec<u8>>;

    /// First address past the text segment of the running image. Pointers
    /// below this boundary are never dereferenced.
    fn etext(&self) -> u64;

    fn read_u8(&self, addr: u64) -> Option<u8> {
        self.read(addr, 1).map(|b| b[0])
    }

    fn read_i8(&self, addr: u64) -> Option<i8> {
        self.read_u8(addr).map(|b| b as i8)
    }

    fn read_u16(&self, addr: u64) -> Option<u16> {
        self.read(addr, 2).map(|b| u16::from_ne_bytes([b[0], b[1]]))
    }

    fn read_i16(&self, addr: u64) -> Option<i16> {
        self.read_u16(addr).map(|v| v as i16)
    }

    fn read_u32(&self, addr: u64) -> Option<u32> {
        self.read(addr, 4)
            .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&self, addr: u64) -> Option<i32> {
        self.read_u32(addr).map(|v| v as i32)
    }

    fn read_u64(&self, addr: u64) -> Option<u64> {
        self.read(addr, 8).map(|b| {
            u64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })
    }

    fn read_i64(&self, addr: u64) -> Option<i64> {
        self.read_u64(addr).map(|v| v as i64)
    }

    fn read_f32(&self, addr: u64) -> Option<f32> {
        self.read_u32(addr).map(f32::from_bits)
    }

    fn read_f64(&self, addr: u64) -> Option<f64> {
        self.read_u64(addr).map(f64::from_bits)
    }

    /// Read a pointer-sized value.
    fn read_ptr(&self, addr: u64) -> Option<u64> {
        self.read_u64(addr)
    }
}

/// A byte buffer mapped at a fixed base address. The test workhorse; also
/// handy for inspecting snapshots.
pub struct BufferMemory {
    base: u64,
    bytes: Vec<u8>,
    etext: u64,
}

impl BufferMemory {
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self {
            base,
            bytes,
            etext: base,
        }
    }

    pub fn with_etext(mut self, etext: u64) -> Self {
        self.etext = etext;
        self
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) {
        let start = (addr - self.base) as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
    }
}

impl Memory for BufferMemory {
    fn read(&self, addr: u64, len: usize) -> Option<Vec<u8>> {
        let start = addr.checked_sub(self.base)? as usize;
        let end = start.checked_add(len)?;
        self.bytes.get(start..end).map(|s| s.to_vec())
    }

    fn etext(&self) -> u64 {
        self.etext
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_reads_use_native_endianness() {
        let mut mem = BufferMemory::new(0x1000, vec![0u8; 32]);
        mem.write(0x1000, &42i32.to_ne_bytes());
        mem.write(0x1008, &2.5f64.to_ne_bytes());
        assert_eq!(mem.read_i32(0x1000), Some(42));
        assert_eq!(mem.read_f64(0x1008), Some(2.5));
        assert_eq!(mem.read_i32(0x0fff), None);
        assert_eq!(mem.read_i32(0x101d), None);
    }
}
