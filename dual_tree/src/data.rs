//! Dense point storage and parsing of raw numeric input.

use byteorder::{ByteOrder, BigEndian};
use rand::Rng;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::layout;

/// Column-major matrix of `f64`, one column per point.
#[derive(Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    dims: usize,
    num_points: usize,
}

impl Matrix {

    pub fn new(dims: usize, num_points: usize) -> Self {

        return Self {
            data: vec![0.0; dims * num_points],
            dims,
            num_points,
        }
    }

    /// Wraps column-major values. `data.len()` must be a multiple of `dims`.
    pub fn from_vec(dims: usize, data: Vec<f64>) -> Result<Self> {

        if dims == 0 {
            return Err(Error::invalid("matrix dimensionality must be greater than 0"));
        }

        if data.len() % dims != 0 {
            return Err(Error::ShapeMismatch(format!("{} values cannot be split into points of {} dimensions", data.len(), dims)));
        }

        let num_points = data.len() / dims;

        return Ok(Self {
            data,
            dims,
            num_points,
        })
    }

    pub fn from_points(points: &[Vec<f64>]) -> Result<Self> {

        let dims = match points.first() {
            None => return Err(Error::invalid("cannot build a matrix from zero points")),
            Some(x) => x.len(),
        };

        let mut data: Vec<f64> = Vec::with_capacity(dims * points.len());
        for point in points.iter() {
            if point.len() != dims {
                return Err(Error::DimensionMismatch { expected: dims, found: point.len() });
            }
            data.extend_from_slice(point);
        }

        return Self::from_vec(dims, data);
    }

    /// Uniform random points in the unit hypercube.
    pub fn random<R: Rng>(dims: usize, num_points: usize, rng: &mut R) -> Self {

        let data: Vec<f64> = (0..dims * num_points).map(|_| rng.gen::<f64>()).collect();

        return Self {
            data,
            dims,
            num_points,
        }
    }

    pub fn dims(&self) -> usize {
        return self.dims;
    }

    pub fn num_points(&self) -> usize {
        return self.num_points;
    }

    pub fn is_empty(&self) -> bool {
        return self.num_points == 0;
    }

    pub fn col(&self, index: usize) -> &[f64] {
        let start = index * self.dims;
        return &self.data[start..start + self.dims];
    }

    pub fn col_mut(&mut self, index: usize) -> &mut [f64] {
        let start = index * self.dims;
        return &mut self.data[start..start + self.dims];
    }

    pub fn as_slice(&self) -> &[f64] {
        return &self.data;
    }

    pub fn swap_cols(&mut self, a: usize, b: usize) {

        if a == b {
            return;
        }

        for d in 0..self.dims {
            self.data.swap(a * self.dims + d, b * self.dims + d);
        }
    }

    /// Appends the points of `other`, which must have the same dimensionality.
    pub fn append(&mut self, other: &Matrix) -> Result<()> {

        if other.dims != self.dims {
            return Err(Error::DimensionMismatch { expected: self.dims, found: other.dims });
        }

        self.data.extend_from_slice(&other.data);
        self.num_points += other.num_points;

        Ok(())
    }

    /// Undoes a tree permutation: column `i` of `self` moves to column `old_from_new[i]`.
    pub fn unpermute(&self, old_from_new: &[usize]) -> Result<Matrix> {

        if old_from_new.len() != self.num_points {
            return Err(Error::ShapeMismatch(format!("permutation has {} entries for {} points", old_from_new.len(), self.num_points)));
        }

        let mut out = Matrix::new(self.dims, self.num_points);
        for (new_index, old_index) in old_from_new.iter().enumerate() {
            out.col_mut(*old_index).copy_from_slice(self.col(new_index));
        }

        return Ok(out);
    }
}

impl fmt::Debug for Matrix {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matrix {{ dims: {}, num_points: {} }}", self.dims, self.num_points)
    }
}

/// Writes one line per query, values separated by commas.
pub fn rows_to_csv<T: ToString>(rows: &[Vec<T>]) -> String {

    let mut s = String::new();
    for row in rows.iter() {
        let line: Vec<String> = row.iter().map(|x| x.to_string()).collect();
        s += &line.join(",");
        s += "\n";
    }

    return s;
}

pub struct Parser {}

impl Parser {

    /// Parses a numeric CSV with one point per line. Blank lines are skipped.
    pub fn parse_csv(contents: &str, has_header: bool) -> Result<Matrix> {

        let mut data: Vec<f64> = Vec::new();
        let mut dims: Option<usize> = None;

        for (i, line) in contents.lines().enumerate() {

            if i == 0 && has_header {
                continue;
            }

            let line = line.trim();
            if line == "" {
                continue;
            }

            let mut count = 0;
            for field in line.split(",") {
                let field = field.trim();
                match field.parse::<f64>() {
                    Ok(value) => data.push(value),
                    Err(_) => {
                        return Err(Error::Parse {
                            line: i + 1,
                            message: format!("cannot parse {:?} as a number", field),
                        })
                    }
                }
                count += 1;
            }

            match dims {
                None => dims = Some(count),
                Some(expected) => {
                    if expected != count {
                        return Err(Error::Parse {
                            line: i + 1,
                            message: format!("expected {} fields, found {}", expected, count),
                        });
                    }
                }
            }
        }

        let dims = match dims {
            None => return Err(Error::Parse { line: 0, message: "no data rows found".to_string() }),
            Some(x) => x,
        };

        return Matrix::from_vec(dims, data);
    }

    pub fn read_csv<P: AsRef<Path>>(filename: P, has_header: bool) -> Result<Matrix> {

        let contents = std::fs::read_to_string(filename)?;
        return Self::parse_csv(&contents, has_header);
    }

    pub fn get_usize_from_array(data: &[u8], offset: usize) -> Result<usize> {

        let bytes = Self::get_slice(data, offset, layout::WORD_SIZE)?;
        let known_size_array = coerce_word(bytes)?;
        let layout::Value(value) = layout::Value::try_from(known_size_array)?;

        Ok(value)
    }

    pub fn get_f64_from_array(data: &[u8], offset: usize) -> Result<f64> {

        let bytes = Self::get_slice(data, offset, layout::VALUE_SIZE)?;
        Ok(BigEndian::read_f64(bytes))
    }

    fn get_slice(data: &[u8], offset: usize, length: usize) -> Result<&[u8]> {

        match data.get(offset..offset + length) {
            Some(x) => Ok(x),
            None => Err(Error::Serialization(format!("blob truncated: need {} bytes at offset {}, have {}", length, offset, data.len()))),
        }
    }
}

pub fn coerce_word(value: &[u8]) -> Result<[u8; layout::WORD_SIZE]> {
    match value.try_into() {
        Ok(x) => Ok(x),
        Err(_) => Err(Error::Serialization("slice with incorrect length".to_string())),
    }
}
