//! Builds syntactically valid (or deliberately broken) FDT blobs for tests,
//! byte-for-byte in the on-wire big-endian format.

const FDT_MAGIC: u32 = 0xd00d_feed;
const FDT_BEGIN_NODE: u32 = 0x0000_0001;
const FDT_END_NODE: u32 = 0x0000_0002;
const FDT_PROP: u32 = 0x0000_0003;
const FDT_NOP: u32 = 0x0000_0004;
const FDT_END: u32 = 0x0000_0009;

const FDT_VERSION: u32 = 17;
const FDT_LAST_COMP_VERSION: u32 = 16;
const HEADER_SIZE: usize = 40;
// One all-zero terminator entry.
const RSVMAP_SIZE: usize = 16;

#[derive(Default)]
pub struct FdtBuilder {
    structure: Vec<u8>,
    strings: Vec<u8>,
}

impl FdtBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        self.push_word(FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.pad();
        self
    }

    pub fn end_node(&mut self) -> &mut Self {
        self.push_word(FDT_END_NODE);
        self
    }

    pub fn property(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let name_offset = self.intern(name);
        self.push_word(FDT_PROP);
        self.push_word(value.len() as u32);
        self.push_word(name_offset);
        self.structure.extend_from_slice(value);
        self.pad();
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        self.push_word(FDT_NOP);
        self
    }

    /// Emits an arbitrary token word, for exercising the parser's reaction
    /// to tokens it does not know.
    pub fn raw_token(&mut self, token: u32) -> &mut Self {
        self.push_word(token);
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        self.finish_with_magic(FDT_MAGIC)
    }

    pub fn finish_with_magic(&mut self, magic: u32) -> Vec<u8> {
        self.push_word(FDT_END);

        let off_struct = HEADER_SIZE + RSVMAP_SIZE;
        let off_strings = off_struct + self.structure.len();
        let totalsize = off_strings + self.strings.len();

        let mut blob = Vec::with_capacity(totalsize);
        for word in [
            magic,
            totalsize as u32,
            off_struct as u32,
            off_strings as u32,
            HEADER_SIZE as u32,
            FDT_VERSION,
            FDT_LAST_COMP_VERSION,
            0, // boot_cpuid_phys
            self.strings.len() as u32,
            self.structure.len() as u32,
        ] {
            blob.extend_from_slice(&word.to_be_bytes());
        }
        blob.extend_from_slice(&[0u8; RSVMAP_SIZE]);
        blob.extend_from_slice(&self.structure);
        blob.extend_from_slice(&self.strings);
        blob
    }

    /// Offset of `name` in the strings block, interned once the way dtc
    /// deduplicates property names.
    fn intern(&mut self, name: &str) -> u32 {
        let bytes = name.as_bytes();
        let mut offset = 0;
        while offset < self.strings.len() {
            let len = self.strings[offset..]
                .iter()
                .position(|&b| b == 0)
                .unwrap();
            if &self.strings[offset..offset + len] == bytes {
                return offset as u32;
            }
            offset += len + 1;
        }

        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(bytes);
        self.strings.push(0);
        offset
    }

    fn push_word(&mut self, word: u32) {
        self.structure.extend_from_slice(&word.to_be_bytes());
    }

    fn pad(&mut self) {
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }
}

/// Encodes a `reg` value as one (address, size) pair of 64-bit cells, the
/// layout qemu-virt uses for its memory node.
pub fn reg_value(address: u64, size: u64) -> [u8; 16] {
    let mut value = [0u8; 16];
    value[..8].copy_from_slice(&address.to_be_bytes());
    value[8..].copy_from_slice(&size.to_be_bytes());
    value
}

/// Leaks a finished blob so parsers can borrow from it for `'static`.
pub fn leak(blob: Vec<u8>) -> &'static [u8] {
    blob.leak()
}
