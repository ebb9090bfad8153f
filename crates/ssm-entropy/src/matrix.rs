// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Dense Feature Matrix
// ─────────────────────────────────────────────────────────────────────

/// Dense `rows × cols` matrix stored column-major.
///
/// One column per shape sample, so a column is a contiguous feature
/// vector that can be built or updated independently of the others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from equally sized columns.
    ///
    /// Panics if a column length differs from `rows`.
    pub fn from_columns(rows: usize, columns: Vec<Vec<f64>>) -> Self {
        let cols = columns.len();
        let mut data = Vec::with_capacity(rows * cols);
        for (j, col) in columns.into_iter().enumerate() {
            assert_eq!(col.len(), rows, "column {j} has wrong length");
            data.extend(col);
        }
        Self { rows, cols, data }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[col * self.rows + row]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[col * self.rows + row] = value;
    }

    #[inline]
    pub fn column(&self, col: usize) -> &[f64] {
        &self.data[col * self.rows..(col + 1) * self.rows]
    }

    pub fn columns(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // chunks_exact panics on 0
        self.data.chunks_exact(self.rows.max(1)).take(self.cols)
    }

    /// Row `row` as an owned vector.
    pub fn row(&self, row: usize) -> Vec<f64> {
        (0..self.cols).map(|j| self.get(row, j)).collect()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Σ of squared entries.
    pub fn frobenius_sq(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum()
    }
}
