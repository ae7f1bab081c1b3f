use address::{PhysicalAddress, PhysicalPageNum};
use arena::EternalArena;
use constants::PAGE_SIZE;

const BITS_PER_WORD: usize = u64::BITS as usize;

/// Marker: every frame tracked by this word is allocated.
const NO_FREE_FRAMES: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The global allocator has not been initialized yet.
    Uninitialized,
    /// The address is not frame-aligned.
    Misaligned,
    /// The address falls outside the managed range.
    OutOfRange,
    /// The frame is already free; a double free is rejected, not tolerated.
    AlreadyFree,
}

/// Bitmap over physical frames: bit set means allocated. The bitmap words
/// live in the eternal arena and are never released.
///
/// The free-frame counter always equals the number of clear bits in
/// `[0, frame_count)` between calls.
pub struct FrameAllocator {
    base: PhysicalPageNum,
    bitmap: &'static mut [u64],
    frame_count: usize,
    free_frames: usize,
}

impl FrameAllocator {
    /// Tracks `memory_size / PAGE_SIZE` frames starting at `base`, with
    /// bitmap storage taken from `arena`.
    pub fn new(base: PhysicalAddress, memory_size: usize, arena: &mut EternalArena) -> Self {
        let frame_count = memory_size / PAGE_SIZE;
        let word_count = frame_count.div_ceil(BITS_PER_WORD);

        // The arena hands out uninitialized memory; clear every word.
        let bitmap = arena.allocate_slice(word_count, 0u64);

        // Frames past frame_count do not exist. Keep their bits set so the
        // scan can never hand them out.
        let tail = frame_count % BITS_PER_WORD;
        if tail != 0 {
            bitmap[word_count - 1] = NO_FREE_FRAMES << tail;
        }

        Self {
            base: PhysicalPageNum::from_addr_floor(base),
            bitmap,
            frame_count,
            free_frames: frame_count,
        }
    }

    /// Lowest free frame, marked allocated; `None` when every frame is
    /// taken. Words with no free frame are skipped whole.
    pub fn alloc_page(&mut self) -> Option<PhysicalAddress> {
        for (word_index, word) in self.bitmap.iter_mut().enumerate() {
            let bit = match *word {
                NO_FREE_FRAMES => continue,
                // A completely free word: take bit 0.
                0 => 0,
                partial => (!partial).trailing_zeros() as usize,
            };

            *word |= 1 << bit;
            self.free_frames -= 1;

            let frame = word_index * BITS_PER_WORD + bit;
            return Some((self.base + frame).start_addr());
        }

        None
    }

    /// Returns the frame at `address` to circulation. Misaligned and
    /// out-of-range addresses are rejected without touching any state, as
    /// is freeing a frame that is already free.
    pub fn free_page(&mut self, address: PhysicalAddress) -> Result<(), FrameError> {
        if !address.is_aligned(PAGE_SIZE) {
            return Err(FrameError::Misaligned);
        }

        let frame = self.frame_index(address).ok_or(FrameError::OutOfRange)?;
        if !self.is_allocated(frame) {
            return Err(FrameError::AlreadyFree);
        }

        self.clear_bit(frame);
        self.free_frames += 1;
        Ok(())
    }

    /// Permanently marks `length / PAGE_SIZE` consecutive frames starting
    /// at `base` as allocated. Frames already allocated stay counted as
    /// they were; the free counter drops only for newly reserved frames.
    pub fn mark_region_unusable(&mut self, base: PhysicalAddress, length: usize) {
        let frames = length / PAGE_SIZE;
        let first = match self.frame_index(base.align_down(PAGE_SIZE)) {
            Some(frame) => frame,
            None => return,
        };
        let last = usize::min(first + frames, self.frame_count);

        for frame in first..last {
            if !self.is_allocated(frame) {
                self.set_bit(frame);
                self.free_frames -= 1;
            }
        }
    }

    pub fn free_frames(&self) -> usize {
        self.free_frames
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn frame_index(&self, address: PhysicalAddress) -> Option<usize> {
        let page = PhysicalPageNum::from_addr_floor(address);
        if page < self.base {
            return None;
        }

        let frame = page.diff(self.base);
        (frame < self.frame_count).then_some(frame)
    }

    fn is_allocated(&self, frame: usize) -> bool {
        self.bitmap[frame / BITS_PER_WORD] & (1 << (frame % BITS_PER_WORD)) != 0
    }

    fn set_bit(&mut self, frame: usize) {
        self.bitmap[frame / BITS_PER_WORD] |= 1 << (frame % BITS_PER_WORD);
    }

    fn clear_bit(&mut self, frame: usize) {
        self.bitmap[frame / BITS_PER_WORD] &= !(1 << (frame % BITS_PER_WORD));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utilities::memory::leaked_arena;

    const BASE: PhysicalAddress = PhysicalAddress::from_usize(0x8000_0000);

    fn allocator(frames: usize) -> FrameAllocator {
        let mut arena = leaked_arena(64 * 1024);
        FrameAllocator::new(BASE, frames * PAGE_SIZE, &mut arena)
    }

    fn frame_addr(index: usize) -> PhysicalAddress {
        BASE + index * PAGE_SIZE
    }

    #[test]
    fn test_exactly_n_allocations_succeed() {
        // 100 frames spans two bitmap words with a partial tail.
        let mut allocator = allocator(100);

        for i in 0..100 {
            assert_eq!(allocator.alloc_page(), Some(frame_addr(i)));
        }
        assert_eq!(allocator.alloc_page(), None);
        assert_eq!(allocator.free_frames(), 0);
    }

    #[test]
    fn test_lowest_free_frame_wins() {
        let mut allocator = allocator(64);

        for _ in 0..10 {
            allocator.alloc_page().unwrap();
        }
        allocator.free_page(frame_addr(5)).unwrap();

        assert_eq!(allocator.alloc_page(), Some(frame_addr(5)));
        assert_eq!(allocator.alloc_page(), Some(frame_addr(10)));
    }

    #[test]
    fn test_full_words_are_skipped() {
        // Fill the first word completely, then the scan must continue into
        // the second.
        let mut allocator = allocator(128);

        for _ in 0..64 {
            allocator.alloc_page().unwrap();
        }
        assert_eq!(allocator.alloc_page(), Some(frame_addr(64)));
    }

    #[test]
    fn test_misaligned_free_is_rejected_without_state_change() {
        let mut allocator = allocator(16);
        allocator.alloc_page().unwrap();
        let free_before = allocator.free_frames();

        assert_eq!(
            allocator.free_page(BASE + 123),
            Err(FrameError::Misaligned)
        );
        assert_eq!(allocator.free_frames(), free_before);
    }

    #[test]
    fn test_out_of_range_free_is_rejected() {
        let mut allocator = allocator(16);

        assert_eq!(
            allocator.free_page(frame_addr(16)),
            Err(FrameError::OutOfRange)
        );
        assert_eq!(
            allocator.free_page(PhysicalAddress::from_usize(0x1000)),
            Err(FrameError::OutOfRange)
        );
    }

    #[test]
    fn test_double_free_is_rejected() {
        let mut allocator = allocator(16);
        let page = allocator.alloc_page().unwrap();

        allocator.free_page(page).unwrap();
        assert_eq!(allocator.free_page(page), Err(FrameError::AlreadyFree));
        assert_eq!(allocator.free_frames(), 16);
    }

    #[test]
    fn test_reserved_region_is_never_allocated() {
        let mut allocator = allocator(30);
        allocator.mark_region_unusable(frame_addr(10), 10 * PAGE_SIZE);

        let mut handed_out = std::vec::Vec::new();
        while let Some(page) = allocator.alloc_page() {
            handed_out.push(page);
        }

        assert_eq!(handed_out.len(), 20);
        for page in handed_out {
            let frame = page.diff(BASE) / PAGE_SIZE;
            assert!(!(10..20).contains(&frame), "frame {} was reserved", frame);
        }
    }

    #[test]
    fn test_reservation_adjusts_the_free_counter() {
        let mut allocator = allocator(64);

        allocator.mark_region_unusable(frame_addr(0), 8 * PAGE_SIZE);
        assert_eq!(allocator.free_frames(), 56);

        // Overlapping reservation only counts the newly covered frames.
        allocator.mark_region_unusable(frame_addr(4), 8 * PAGE_SIZE);
        assert_eq!(allocator.free_frames(), 52);
    }

    #[test]
    fn test_reservation_is_clamped_to_the_managed_range() {
        let mut allocator = allocator(16);

        allocator.mark_region_unusable(frame_addr(12), 64 * PAGE_SIZE);
        assert_eq!(allocator.free_frames(), 12);

        allocator.mark_region_unusable(PhysicalAddress::from_usize(0x1000), 4 * PAGE_SIZE);
        assert_eq!(allocator.free_frames(), 12);
    }

    #[test]
    fn test_partial_tail_word_never_leaks_phantom_frames() {
        // 10 frames leave 54 phantom bits in the single bitmap word.
        let mut allocator = allocator(10);

        for i in 0..10 {
            assert_eq!(allocator.alloc_page(), Some(frame_addr(i)));
        }
        assert_eq!(allocator.alloc_page(), None);
    }

    #[test]
    fn test_alloc_free_cycle_keeps_the_counter_consistent() {
        let mut allocator = allocator(32);

        let a = allocator.alloc_page().unwrap();
        let b = allocator.alloc_page().unwrap();
        assert_eq!(allocator.free_frames(), 30);

        allocator.free_page(a).unwrap();
        assert_eq!(allocator.free_frames(), 31);
        allocator.free_page(b).unwrap();
        assert_eq!(allocator.free_frames(), 32);
    }
}
