use crate::header::read_be32;
use crate::FdtError;

pub(crate) const FDT_BEGIN_NODE: u32 = 0x0000_0001;
pub(crate) const FDT_END_NODE: u32 = 0x0000_0002;
pub(crate) const FDT_PROP: u32 = 0x0000_0003;
pub(crate) const FDT_NOP: u32 = 0x0000_0004;
pub(crate) const FDT_END: u32 = 0x0000_0009;

/// One decoded token out of the struct block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FdtToken {
    BeginNode { name: &'static str },
    EndNode,
    Prop { name_offset: usize, value: &'static [u8] },
    Nop,
    End,
}

/// Linear cursor over the struct block. Both parsing passes run the same
/// scanner, so they agree exactly on what the stream contains.
pub(crate) struct TokenScanner {
    block: &'static [u8],
    offset: usize,
}

impl TokenScanner {
    pub(crate) fn new(block: &'static [u8]) -> Self {
        Self { block, offset: 0 }
    }

    pub(crate) fn next_token(&mut self) -> Result<FdtToken, FdtError> {
        let token = self.read_word()?;
        match token {
            FDT_BEGIN_NODE => {
                let name = self.read_name()?;
                Ok(FdtToken::BeginNode { name })
            }
            FDT_END_NODE => Ok(FdtToken::EndNode),
            FDT_PROP => {
                let len = self.read_word()? as usize;
                let name_offset = self.read_word()? as usize;

                let end = self.offset.checked_add(len).ok_or(FdtError::Truncated)?;
                let value = self.block.get(self.offset..end).ok_or(FdtError::Truncated)?;
                self.offset = self
                    .offset
                    .checked_add(align_to_word(len))
                    .ok_or(FdtError::Truncated)?;

                Ok(FdtToken::Prop { name_offset, value })
            }
            FDT_NOP => Ok(FdtToken::Nop),
            FDT_END => Ok(FdtToken::End),
            other => Err(FdtError::UnrecognizedToken(other)),
        }
    }

    fn read_word(&mut self) -> Result<u32, FdtError> {
        let word = read_be32(self.block, self.offset).ok_or(FdtError::Truncated)?;
        self.offset += 4;
        Ok(word)
    }

    fn read_name(&mut self) -> Result<&'static str, FdtError> {
        let tail = self.block.get(self.offset..).ok_or(FdtError::Truncated)?;
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(FdtError::Truncated)?;
        let name = core::str::from_utf8(&tail[..len]).map_err(|_| FdtError::MalformedName)?;

        // The terminating NUL belongs to the name field; pad from there to
        // the next word boundary.
        self.offset += align_to_word(len + 1);
        Ok(name)
    }
}

/// Next multiple of four, measured from the end of a variable-length field.
pub(crate) const fn align_to_word(value: usize) -> usize {
    (value + 3) & !3
}
