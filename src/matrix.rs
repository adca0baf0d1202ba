//! A dense matrix for quick row and column-based data access
//!
//! [`Matrix`] is the storage behind [`MutationMatrix`](`crate::MutationMatrix`) and the
//! background [`RateModel`](`crate::RateModel`). It provides only the small set of
//! operations the statistics need: row and column sums, element-wise mapping,
//! and row or column filtering.
//!
//! Imagine the following matrix / Dataframe
//!
//! | Index |   0 |   1 |   2 |   3 |
//! |:----- | ---:| ---:| ---:| ---:|
//! | **0** |  11 |  12 |  13 |  14 |
//! | **1** |  21 |  22 |  23 |  24 |
//! | **2** |  31 |  32 |  33 |  34 |
//!
//! ```
//! use comutation::matrix::Matrix;
//! let data = vec![11u32, 12, 13, 14, 21, 22, 23, 24, 31, 32, 33, 34];
//! let m = Matrix::new(3, 4, data);
//!
//! assert_eq!(m.row(1), &[21, 22, 23, 24]);
//! assert_eq!(m.row_sums(), vec![50, 90, 130]);
//! assert_eq!(m.col_sums(), vec![63, 66, 69, 72]);
//!
//! let col: Vec<u32> = m.cols().next().unwrap().copied().collect();
//! assert_eq!(col, vec![11, 21, 31]);
//! ```
use std::fmt::Debug;

/// A dense, row-major matrix
#[derive(Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T> Matrix<T> {
    /// Crates a new Matrix from `data` with `rows` number of rows, `cols` number of columns
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` does not match the length of `data`
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(rows * cols, data.len(), "matrix shape must match the data");
        Self { rows, cols, data }
    }

    /// Creates a Matrix from a list of rows
    ///
    /// Returns `None` if the rows are not all of the same length
    ///
    /// # Examples
    /// ```
    /// use comutation::matrix::Matrix;
    /// let m = Matrix::from_rows(vec![vec![1u8, 0], vec![0, 1], vec![1, 1]]).unwrap();
    /// assert_eq!(m.dim(), (3, 2));
    ///
    /// assert!(Matrix::from_rows(vec![vec![1u8, 0], vec![0]]).is_none());
    /// ```
    pub fn from_rows(rows: Vec<Vec<T>>) -> Option<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return None;
            }
            data.extend(row);
        }
        Some(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    /// Returns the total length of the data
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the `Matrix` does not contain any data
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a Tuple with number of rows and number of columns
    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Returns the values of row `idx`
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds
    pub fn row(&self, idx: usize) -> &[T] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }

    /// Returns the value at `row`, `col`, if present
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Iterates the rows of the matrix
    pub fn rows(&self) -> RowIterator<T> {
        RowIterator::new(&self.data, self.row_indicies())
    }

    /// Iterates the columns of the matrix
    pub fn cols(&self) -> ColumnIterator<T> {
        ColumnIterator::new(&self.data, self.col_indicies())
    }

    /// Applies `f` to every element and returns the new `Matrix`
    ///
    /// This is used to clip or binarize values
    ///
    /// # Examples
    /// ```
    /// use comutation::matrix::Matrix;
    /// let m = Matrix::new(1, 3, vec![-1.0, 0.5, 7.0]);
    /// let clipped = m.map(|v: &f64| v.clamp(0.0, 1.0));
    /// assert_eq!(clipped.row(0), &[0.0, 0.5, 1.0]);
    /// ```
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Matrix<U> {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    fn row_indicies(&self) -> RowIndexIterator {
        RowIndexIterator::new(self.rows, self.cols)
    }

    fn col_indicies(&self) -> ColumnIndexIterator {
        ColumnIndexIterator::new(self.cols)
    }
}

impl<T: Clone> Matrix<T> {
    /// Returns a new `Matrix` with only the rows that are `true` in `keep`
    ///
    /// `keep` must contain one value per row
    pub fn filter_rows(&self, keep: &[bool]) -> Matrix<T> {
        debug_assert_eq!(keep.len(), self.rows);
        let mut data = Vec::new();
        let mut rows = 0;
        for (row, _) in self.rows().zip(keep.iter()).filter(|(_, k)| **k) {
            data.extend(row.cloned());
            rows += 1;
        }
        Matrix {
            rows,
            cols: self.cols,
            data,
        }
    }

    /// Returns a new `Matrix` with only the columns that are `true` in `keep`
    ///
    /// `keep` must contain one value per column
    pub fn filter_cols(&self, keep: &[bool]) -> Matrix<T> {
        debug_assert_eq!(keep.len(), self.cols);
        let selected: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(idx, k)| k.then_some(idx))
            .collect();
        self.select_cols(&selected)
    }

    /// Returns a new `Matrix` with the columns at the given indicies, in that order
    pub fn select_cols(&self, indicies: &[usize]) -> Matrix<T> {
        let mut data = Vec::with_capacity(self.rows * indicies.len());
        for row_idx in 0..self.rows {
            let row = self.row(row_idx);
            data.extend(indicies.iter().map(|idx| row[*idx].clone()));
        }
        Matrix {
            rows: self.rows,
            cols: indicies.len(),
            data,
        }
    }
}

impl<T: Copy + Into<u64>> Matrix<T> {
    /// Returns the sum of every row
    pub fn row_sums(&self) -> Vec<u64> {
        self.rows()
            .map(|row| row.map(|v| (*v).into()).sum())
            .collect()
    }

    /// Returns the sum of every column
    pub fn col_sums(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.cols];
        for row in self.rows() {
            for (sum, v) in sums.iter_mut().zip(row) {
                *sum += (*v).into();
            }
        }
        sums
    }
}

impl<T: Debug> Debug for Matrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in self.rows() {
            let v: Vec<String> = row.map(|v| format!("{v:?}")).collect();
            writeln!(f, "[{}]", v.join(", "))?;
        }
        Ok(())
    }
}

/// An iterator of the values of a single row of a `Matrix`
///
/// This struct is yielded by `RowIterator`
pub struct Row<'a, T> {
    iter: std::slice::Iter<'a, T>,
}

impl<'a, T> Row<'a, T> {
    fn new(iter: std::slice::Iter<'a, T>) -> Self {
        Row { iter }
    }
}

impl<'a, T> Iterator for Row<'a, T> {
    type Item = &'a T;
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Iterates the rows of a `Matrix`, returning an Iterator over individual row values
///
/// This struct is yielded by `Matrix::rows`
pub struct RowIterator<'a, T> {
    iter: RowIndexIterator,
    data: &'a [T],
}

impl<'a, T> RowIterator<'a, T> {
    fn new(data: &'a [T], iter: RowIndexIterator) -> Self {
        Self { iter, data }
    }
}

impl<'a, T> Iterator for RowIterator<'a, T> {
    type Item = Row<'a, T>;
    fn next(&mut self) -> Option<Self::Item> {
        self.iter
            .next()
            .map(|range| Row::new(self.data[range].iter()))
    }
}

/// Yields the index range of each row
struct RowIndexIterator {
    rows: usize,
    cols: usize,
    idx: usize,
}

impl RowIndexIterator {
    fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols, idx: 0 }
    }
}

impl Iterator for RowIndexIterator {
    type Item = std::ops::Range<usize>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.rows {
            return None;
        }
        let start = self.idx * self.cols;
        self.idx += 1;
        Some(start..start + self.cols)
    }
}

/// An iterator of the values of a single column of a `Matrix`
///
/// This struct is yielded by `ColumnIterator`
pub struct Column<'a, T> {
    iter: std::iter::StepBy<std::slice::Iter<'a, T>>,
}

impl<'a, T> Column<'a, T> {
    fn new(iter: std::iter::StepBy<std::slice::Iter<'a, T>>) -> Self {
        Self { iter }
    }
}

impl<'a, T> Iterator for Column<'a, T> {
    type Item = &'a T;
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Iterates the columns of a `Matrix`, returning an Iterator over individual column values
///
/// This struct is yielded by `Matrix::cols`
pub struct ColumnIterator<'a, T> {
    data: &'a [T],
    iter: ColumnIndexIterator,
}

impl<'a, T> ColumnIterator<'a, T> {
    fn new(data: &'a [T], iter: ColumnIndexIterator) -> Self {
        Self { data, iter }
    }
}

impl<'a, T> Iterator for ColumnIterator<'a, T> {
    type Item = Column<'a, T>;
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|range| {
            let data = self.data.get(range.idx..).unwrap_or_default();
            Column::new(data.iter().step_by(range.step))
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ColumnRange {
    idx: usize,
    step: usize,
}

impl ColumnRange {
    pub fn new(idx: usize, step: usize) -> Self {
        Self { idx, step }
    }
}

struct ColumnIndexIterator {
    cols: usize,
    idx: usize,
}

impl ColumnIndexIterator {
    fn new(cols: usize) -> Self {
        Self { cols, idx: 0 }
    }
}

impl Iterator for ColumnIndexIterator {
    type Item = ColumnRange;
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.cols {
            return None;
        }
        let res = ColumnRange::new(self.idx, self.cols);
        self.idx += 1;
        Some(res)
    }
}
