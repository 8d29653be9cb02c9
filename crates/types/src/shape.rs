//! Scalar types and dataset shapes.
//!
//! The dataset store and the codec disagree on axis ordering: the store
//! reports dimensions slowest-varying first, the codec expects them
//! fastest-varying first. [`Shape`] always holds **storage order**;
//! [`Shape::reversed`] produces the codec-order view. The conversion is
//! applied exactly once, at the store/codec boundary.

use serde::{Deserialize, Serialize};

/// Element type of a dataset or frame buffer.
///
/// The engine only ever touches these four: peak counts are `I64`, peak
/// positions are `F64`, frames are `F32`, and the flattened peak side
/// channel is `U64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    I64,
    U64,
    F32,
    F64,
}

impl ScalarType {
    /// Size of one element in bytes.
    pub fn byte_width(&self) -> usize {
        match self {
            ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => 8,
            ScalarType::F32 => 4,
        }
    }

    /// String form used in logs and metric records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::I64 => "i64",
            ScalarType::U64 => "u64",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dataset extents in storage order (slowest-varying axis first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape(Vec<u64>);

impl Shape {
    pub fn new(dims: Vec<u64>) -> Self {
        Shape(dims)
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Dimensions, storage order.
    pub fn dims(&self) -> &[u64] {
        &self.0
    }

    /// Dimensions with the axis order flipped, i.e. codec order
    /// (fastest-varying first).
    pub fn reversed(&self) -> Shape {
        let mut dims = self.0.clone();
        dims.reverse();
        Shape(dims)
    }

    /// Total number of elements. Empty shapes (rank 0) hold one scalar;
    /// any zero extent yields zero.
    pub fn element_count(&self) -> u64 {
        self.0.iter().product()
    }

    /// Shape of one record with the leading (event) axis removed.
    pub fn per_event(&self) -> Shape {
        Shape(self.0[1..].to_vec())
    }

    /// Same shape with the leading (event) axis replaced.
    pub fn with_leading(&self, count: u64) -> Shape {
        let mut dims = self.0.clone();
        dims[0] = count;
        Shape(dims)
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "x")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<u64>> for Shape {
    fn from(dims: Vec<u64>) -> Self {
        Shape(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_flips_axis_order() {
        let storage = Shape::new(vec![100, 512, 1024]);
        assert_eq!(storage.reversed().dims(), &[1024, 512, 100]);
        // A double reversal is the identity.
        assert_eq!(storage.reversed().reversed(), storage);
    }

    #[test]
    fn element_count() {
        assert_eq!(Shape::new(vec![3, 4, 5]).element_count(), 60);
        assert_eq!(Shape::new(vec![0, 4, 5]).element_count(), 0);
        assert_eq!(Shape::new(vec![]).element_count(), 1);
    }

    #[test]
    fn leading_axis_helpers() {
        let s = Shape::new(vec![100, 512, 1024]);
        assert_eq!(s.per_event().dims(), &[512, 1024]);
        assert_eq!(s.with_leading(7).dims(), &[7, 512, 1024]);
    }

    #[test]
    fn byte_widths() {
        assert_eq!(ScalarType::F32.byte_width(), 4);
        assert_eq!(ScalarType::F64.byte_width(), 8);
        assert_eq!(ScalarType::I64.byte_width(), 8);
        assert_eq!(ScalarType::U64.byte_width(), 8);
    }
}
