//! Sets constants for the model blob layout
//!
//! A blob is a length-prefixed header followed by one matrix block:
//!
//! ```text
//! | header length (u64) | header (json) | dims (u64) | num points (u64) | values (f64 ...) |
//! ```
//!
//! All integers and floats are BigEndian.

use crate::error::Error;
use std::convert::TryFrom;

pub const WORD_SIZE: usize = 8;

pub struct Value (pub usize);

/// Converts an 8 byte BigEndian integer to a usize, failing if it does not fit.
impl TryFrom<[u8; WORD_SIZE]> for Value {
    type Error = Error;

    fn try_from(arr: [u8; WORD_SIZE]) -> Result<Self, Self::Error> {
        let value = u64::from_be_bytes(arr);
        match usize::try_from(value) {
            Ok(x) => Ok(Self(x)),
            Err(_) => Err(Error::Serialization(format!("value {} does not fit in usize", value))),
        }
    }
}

//for whole blob
pub const HEADER_LENGTH_START: usize = 0;
pub const HEADER_LENGTH_SIZE: usize = WORD_SIZE;

pub const HEADER_START: usize = HEADER_LENGTH_START + HEADER_LENGTH_SIZE;

//for a matrix block, relative to the start of the block
pub const DIMS_OFFSET: usize = 0;
pub const DIMS_SIZE: usize = WORD_SIZE;

pub const NUM_POINTS_OFFSET: usize = DIMS_OFFSET + DIMS_SIZE;
pub const NUM_POINTS_SIZE: usize = WORD_SIZE;

pub const MATRIX_DATA_START: usize = NUM_POINTS_OFFSET + NUM_POINTS_SIZE;
pub const VALUE_SIZE: usize = 8;

pub fn matrix_block_size(dims: usize, num_points: usize) -> usize {
    return MATRIX_DATA_START + dims * num_points * VALUE_SIZE;
}
