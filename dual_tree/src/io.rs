//! Handles read and write of model blobs
//!
//! See [`crate::layout`] for the byte layout.

use byteorder::{ByteOrder, BigEndian};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use crate::data::{Matrix, Parser};
use crate::error::{Error, Result};
use crate::layout;

pub struct MatrixBlock {}

impl MatrixBlock {

    fn calc_offset(start: usize, index: usize) -> usize {

        return start + layout::MATRIX_DATA_START + (index * layout::VALUE_SIZE);
    }

    pub fn write(matrix: &Matrix, out: &mut Vec<u8>) {

        let start = out.len();
        out.resize(start + layout::matrix_block_size(matrix.dims(), matrix.num_points()), 0);

        BigEndian::write_u64(&mut out[start + layout::DIMS_OFFSET..start + layout::DIMS_OFFSET + layout::DIMS_SIZE], matrix.dims() as u64);
        BigEndian::write_u64(&mut out[start + layout::NUM_POINTS_OFFSET..start + layout::NUM_POINTS_OFFSET + layout::NUM_POINTS_SIZE], matrix.num_points() as u64);

        for (i, value) in matrix.as_slice().iter().enumerate() {
            let offset = Self::calc_offset(start, i);
            BigEndian::write_f64(&mut out[offset..offset + layout::VALUE_SIZE], *value);
        }
    }

    /// Reads a block starting at `start`, returning the matrix and the offset just past it.
    pub fn read(data: &[u8], start: usize) -> Result<(Matrix, usize)> {

        let dims = Parser::get_usize_from_array(data, start + layout::DIMS_OFFSET)?;
        let num_points = Parser::get_usize_from_array(data, start + layout::NUM_POINTS_OFFSET)?;

        let num_values = dims.checked_mul(num_points);
        let end = num_values
            .and_then(|x| x.checked_mul(layout::VALUE_SIZE))
            .and_then(|x| x.checked_add(start + layout::MATRIX_DATA_START));

        let (num_values, end) = match (num_values, end) {
            (Some(n), Some(e)) => (n, e),
            _ => return Err(Error::Serialization(format!("matrix shape {}x{} overflows", dims, num_points))),
        };

        if end > data.len() {
            return Err(Error::Serialization(format!("matrix block needs {} bytes, blob has {}", end - start, data.len() - start)));
        }

        let mut values: Vec<f64> = Vec::with_capacity(num_values);
        for i in 0..num_values {
            values.push(Parser::get_f64_from_array(data, Self::calc_offset(start, i))?);
        }

        let matrix = Matrix::from_vec(dims, values)?;

        return Ok((matrix, end));
    }
}

/// Builds a blob from a serialized header and the reference matrix.
pub fn write_blob(header: &[u8], matrix: &Matrix) -> Vec<u8> {

    let mut out: Vec<u8> = vec![0; layout::HEADER_START];
    BigEndian::write_u64(&mut out[layout::HEADER_LENGTH_START..layout::HEADER_LENGTH_START + layout::HEADER_LENGTH_SIZE], header.len() as u64);
    out.extend_from_slice(header);

    MatrixBlock::write(matrix, &mut out);

    return out;
}

/// Splits a blob back into its header bytes and matrix.
pub fn read_blob(data: &[u8]) -> Result<(&[u8], Matrix)> {

    let header_length = Parser::get_usize_from_array(data, layout::HEADER_LENGTH_START)?;
    let header = match layout::HEADER_START.checked_add(header_length).and_then(|end| data.get(layout::HEADER_START..end)) {
        Some(x) => x,
        None => return Err(Error::Serialization(format!("header of {} bytes is truncated", header_length))),
    };
    let header_end = layout::HEADER_START + header.len();

    let (matrix, end) = MatrixBlock::read(data, header_end)?;

    if end != data.len() {
        return Err(Error::Serialization(format!("{} trailing bytes after matrix block", data.len() - end)));
    }

    return Ok((header, matrix));
}

pub fn to_file<P: AsRef<Path>>(filename: P, blob: &[u8]) -> Result<()> {

    let mut fd = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(filename)?;

    fd.write_all(blob)?;

    Ok(())
}

pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Vec<u8>> {

    let mut fd = OpenOptions::new()
                .read(true)
                .open(filename)?;

    let mut blob: Vec<u8> = Vec::new();
    fd.read_to_end(&mut blob)?;

    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn blob_preserves_bits() {

        let mut rng = StdRng::seed_from_u64(11);
        let matrix = Matrix::random(4, 17, &mut rng);
        let header = b"{\"task\":\"kde\"}";

        let blob = write_blob(header, &matrix);
        let (read_header, read_matrix) = read_blob(&blob).unwrap();

        assert_eq!(read_header, header);
        assert_eq!(read_matrix, matrix);
    }

    #[test]
    fn truncated_blob_is_rejected() {

        let mut rng = StdRng::seed_from_u64(12);
        let matrix = Matrix::random(2, 3, &mut rng);

        let blob = write_blob(b"{}", &matrix);

        assert!(read_blob(&blob[..blob.len() - 3]).is_err());
        assert!(read_blob(&blob[..5]).is_err());
    }
}
