//! Constant pool.
//!
//! Read-only literals referenced by instructions through RIP-relative
//! memory operands. A constant has no address until the pool is laid out
//! during finalization; until then every referencing instruction carries a
//! pending relocation. Identical constants are deduplicated.

use hashbrown::HashMap;

use crate::x64::operand::{Mem, Size};

/// Handle to a pool constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstId(pub(crate) u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConstData {
    bytes: Vec<u8>,
    alignment: u32,
}

/// Pool of deduplicated constants for one function.
#[derive(Debug, Default, Clone)]
pub struct ConstantPool {
    entries: Vec<ConstData>,
    dedup: HashMap<(Vec<u8>, u32), ConstId>,
    /// Offsets from the start of the pool, filled in by `layout`.
    offsets: Vec<u32>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, bytes: Vec<u8>, alignment: u32) -> ConstId {
        if let Some(&id) = self.dedup.get(&(bytes.clone(), alignment)) {
            return id;
        }
        let id = ConstId(self.entries.len() as u32);
        self.dedup.insert((bytes.clone(), alignment), id);
        self.entries.push(ConstData { bytes, alignment });
        id
    }

    /// Scalar constants; alignment equals the value size.
    pub fn uint32(&mut self, value: u32) -> Mem {
        let id = self.intern(value.to_le_bytes().to_vec(), 4);
        Mem::literal(id, Size::Dword)
    }

    pub fn uint64(&mut self, value: u64) -> Mem {
        let id = self.intern(value.to_le_bytes().to_vec(), 8);
        Mem::literal(id, Size::Qword)
    }

    pub fn float32(&mut self, value: f32) -> Mem {
        let id = self.intern(value.to_le_bytes().to_vec(), 4);
        Mem::literal(id, Size::Dword)
    }

    pub fn float64(&mut self, value: f64) -> Mem {
        let id = self.intern(value.to_le_bytes().to_vec(), 8);
        Mem::literal(id, Size::Qword)
    }

    /// 128-bit vector of repeated 32-bit lanes.
    pub fn uint32x4(&mut self, value: u32) -> Mem {
        let mut bytes = Vec::with_capacity(16);
        for _ in 0..4 {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let id = self.intern(bytes, 16);
        Mem::literal(id, Size::Oword)
    }

    /// 128-bit vector of repeated 64-bit lanes.
    pub fn uint64x2(&mut self, value: u64) -> Mem {
        let mut bytes = Vec::with_capacity(16);
        for _ in 0..2 {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let id = self.intern(bytes, 16);
        Mem::literal(id, Size::Oword)
    }

    /// 256-bit vector of repeated 32-bit lanes.
    pub fn uint32x8(&mut self, value: u32) -> Mem {
        let mut bytes = Vec::with_capacity(32);
        for _ in 0..8 {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let id = self.intern(bytes, 32);
        Mem::literal(id, Size::Hword)
    }

    /// Raw bytes with explicit alignment.
    pub fn bytes(&mut self, bytes: &[u8], alignment: u32) -> Mem {
        debug_assert!(alignment.is_power_of_two());
        let size = Size::from_bytes(bytes.len() as u8).unwrap_or(Size::Byte);
        let id = self.intern(bytes.to_vec(), alignment);
        Mem::literal(id, size)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Assign pool offsets, largest alignment first to avoid padding waste.
    /// Returns the total pool size.
    pub fn layout(&mut self) -> u32 {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.entries[i].alignment));
        self.offsets = vec![0; self.entries.len()];
        let mut offset = 0u32;
        for i in order {
            let align = self.entries[i].alignment;
            offset = (offset + align - 1) & !(align - 1);
            self.offsets[i] = offset;
            offset += self.entries[i].bytes.len() as u32;
        }
        offset
    }

    /// Offset of a constant inside the laid-out pool.
    pub fn offset(&self, id: ConstId) -> u32 {
        self.offsets[id.0 as usize]
    }

    /// Emit the laid-out pool into a buffer whose current length is the
    /// pool base.
    pub fn emit(&self, out: &mut Vec<u8>) {
        let base = out.len();
        let total = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| self.offsets[i] as usize + e.bytes.len())
            .max()
            .unwrap_or(0);
        out.resize(base + total, 0);
        for (i, entry) in self.entries.iter().enumerate() {
            let at = base + self.offsets[i] as usize;
            out[at..at + entry.bytes.len()].copy_from_slice(&entry.bytes);
        }
    }
}

/// A pending patch: `field_width` bytes at `offset` must receive the
/// RIP-relative distance to `constant` once the image is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Offset of the field inside the code buffer.
    pub offset: u32,
    /// End of the referencing instruction, the RIP base for the fixup.
    pub program_counter: u32,
    pub constant: ConstId,
    pub field_width: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduplication() {
        let mut pool = ConstantPool::new();
        let a = pool.uint32x4(0x3f80_0000);
        let b = pool.uint32x4(0x3f80_0000);
        assert_eq!(a.literal, b.literal);
        let c = pool.uint32x4(0);
        assert_ne!(a.literal, c.literal);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn layout_respects_alignment() {
        let mut pool = ConstantPool::new();
        let d = pool.uint32(7);
        let v = pool.uint32x8(1);
        let total = pool.layout();
        let d_off = pool.offset(d.literal.unwrap());
        let v_off = pool.offset(v.literal.unwrap());
        assert_eq!(v_off % 32, 0);
        assert_eq!(d_off % 4, 0);
        assert!(total >= 36);
    }

    #[test]
    fn emit_places_bytes() {
        let mut pool = ConstantPool::new();
        let m = pool.uint64(0x0102030405060708);
        pool.layout();
        let mut out = vec![0xCC; 3];
        pool.emit(&mut out);
        let off = 3 + pool.offset(m.literal.unwrap()) as usize;
        assert_eq!(&out[off..off + 8], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }
}
