#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

mod physical_address;
mod physical_page_num;

pub use physical_address::*;
pub use physical_page_num::*;
