use core::ops::{Add, AddAssign, Sub, SubAssign};

use crate::PhysicalAddress;
use constants::PAGE_SIZE_BITS;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalPageNum(usize);

impl PhysicalPageNum {
    pub const fn from_usize(value: usize) -> Self {
        Self(value)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    pub const fn from_addr_floor(addr: PhysicalAddress) -> Self {
        addr.page_num_floor()
    }

    pub const fn from_addr_ceil(addr: PhysicalAddress) -> Self {
        addr.page_num_ceil()
    }

    pub const fn start_addr(self) -> PhysicalAddress {
        PhysicalAddress::from_usize(self.0 << PAGE_SIZE_BITS)
    }

    pub const fn diff(self, other: Self) -> usize {
        self.0 - other.0
    }
}

impl Add<usize> for PhysicalPageNum {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<usize> for PhysicalPageNum {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}

impl Sub<usize> for PhysicalPageNum {
    type Output = Self;

    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl SubAssign<usize> for PhysicalPageNum {
    fn sub_assign(&mut self, rhs: usize) {
        self.0 -= rhs;
    }
}
