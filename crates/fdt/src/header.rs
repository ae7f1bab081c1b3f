use crate::FdtError;

/// The on-wire FDT header: ten big-endian 32-bit fields.
///
/// See devicetree-specification.readthedocs.io/en/stable/flattened-format.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtHeader {
    pub magic: u32,
    pub totalsize: u32,
    pub off_dt_struct: u32,
    pub off_dt_strings: u32,
    pub off_mem_rsvmap: u32,
    pub version: u32,
    pub last_comp_version: u32,
    pub boot_cpuid_phys: u32,
    pub size_dt_strings: u32,
    pub size_dt_struct: u32,
}

impl FdtHeader {
    pub const MAGIC: u32 = 0xd00d_feed;
    pub const SIZE: usize = 40;

    /// Reads and validates the header. The magic field is checked before
    /// any other field is interpreted.
    pub fn read(blob: &[u8]) -> Result<Self, FdtError> {
        let magic = read_be32(blob, 0).ok_or(FdtError::Truncated)?;
        if magic != Self::MAGIC {
            return Err(FdtError::BadMagic(magic));
        }

        let field = |index: usize| read_be32(blob, index * 4).ok_or(FdtError::Truncated);
        Ok(Self {
            magic,
            totalsize: field(1)?,
            off_dt_struct: field(2)?,
            off_dt_strings: field(3)?,
            off_mem_rsvmap: field(4)?,
            version: field(5)?,
            last_comp_version: field(6)?,
            boot_cpuid_phys: field(7)?,
            size_dt_strings: field(8)?,
            size_dt_struct: field(9)?,
        })
    }
}

/// One big-endian 32-bit read with bounds checking; the whole parser funnels
/// through here.
pub(crate) fn read_be32(bytes: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let raw = bytes.get(offset..end)?;
    Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}
