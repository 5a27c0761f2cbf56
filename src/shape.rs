use std::fmt;

/// Highest rank a kernel can address.
pub const MAX_RANK: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: &[usize]) -> anyhow::Result<Self> {
        anyhow::ensure!(!dims.is_empty(), "a shape needs at least one dimension");
        anyhow::ensure!(
            dims.len() <= MAX_RANK,
            "shape {dims:?} has rank {}, at most {MAX_RANK} is supported",
            dims.len()
        );
        anyhow::ensure!(
            dims.iter().all(|&d| d > 0),
            "shape {dims:?} has a zero-sized dimension"
        );
        Ok(Self {
            dims: dims.to_vec(),
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.dims.len()];
        for d in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * self.dims[d + 1];
        }
        strides
    }

    /// True when `self` collapses some axes of `src` to 1 and keeps the others.
    pub fn is_reduction_of(&self, src: &Shape) -> bool {
        self.rank() == src.rank()
            && self
                .dims
                .iter()
                .zip(&src.dims)
                .all(|(&d, &s)| d == s || d == 1)
    }
}

impl TryFrom<&[usize]> for Shape {
    type Error = anyhow::Error;

    fn try_from(dims: &[usize]) -> anyhow::Result<Self> {
        Shape::new(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        if self.dims.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_zero_dims() {
        assert!(Shape::new(&[]).is_err());
        assert!(Shape::new(&[4, 0]).is_err());
        assert!(Shape::new(&[1; MAX_RANK + 1]).is_err());
        assert!(Shape::new(&[1; MAX_RANK]).is_ok());
    }

    #[test]
    fn test_numel_and_strides() -> anyhow::Result<()> {
        let shape = Shape::new(&[2, 3, 4])?;
        assert_eq!(shape.numel(), 24);
        assert_eq!(shape.strides(), vec![12, 4, 1]);
        assert_eq!(Shape::new(&[7])?.strides(), vec![1]);
        Ok(())
    }

    #[test]
    fn test_reduction_targets() -> anyhow::Result<()> {
        let src = Shape::new(&[1024, 1024])?;
        assert!(Shape::new(&[1024, 1])?.is_reduction_of(&src));
        assert!(Shape::new(&[1, 1024])?.is_reduction_of(&src));
        assert!(Shape::new(&[1, 1])?.is_reduction_of(&src));
        assert!(src.is_reduction_of(&src));
        assert!(!Shape::new(&[1024])?.is_reduction_of(&src));
        assert!(!Shape::new(&[512, 1])?.is_reduction_of(&src));
        Ok(())
    }

    #[test]
    fn test_display() -> anyhow::Result<()> {
        assert_eq!(Shape::new(&[1024, 1])?.to_string(), "(1024, 1)");
        assert_eq!(Shape::new(&[1])?.to_string(), "(1,)");
        Ok(())
    }
}
