//! Partitioning of scene axes into a block grid.
//!
//! Chunked axes are read whole inside every block. Non-chunked axes span the
//! grid of blocks: one block per combination of their indices. The plan also
//! carries the transpose between the scene's axis order and the block-grid
//! order (non-chunked axes first, chunked axes last) and its inverse.

use crate::dimensions::REQUIRED_CHUNK_DIMS;
use crate::error::ReaderError;

/// How a scene is cut into independently loadable blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    dims: Vec<char>,
    shape: Vec<usize>,
    non_chunked: Vec<usize>,
    chunked: Vec<usize>,
    permutation: Vec<usize>,
    inverse: Vec<usize>,
}

impl ChunkPlan {
    /// Build a plan for a scene with `axis_order` labels and `shape`.
    ///
    /// The effective chunk axes are `requested` plus `Y`, `X` and `S`. Axes
    /// keep their relative order inside each group.
    ///
    /// # Errors
    /// `ShapeContractViolation` if `axis_order` and `shape` differ in length.
    pub fn build(axis_order: &str, shape: &[usize], requested: &[char]) -> Result<Self, ReaderError> {
        let dims: Vec<char> = axis_order.chars().collect();
        if dims.len() != shape.len() {
            return Err(ReaderError::ShapeContractViolation {
                dims: axis_order.to_string(),
                shape: shape.to_vec(),
            });
        }

        let effective = Self::effective_chunk_dims(requested);
        let (chunked, non_chunked): (Vec<usize>, Vec<usize>) =
            (0..dims.len()).partition(|&i| effective.contains(&dims[i]));

        let permutation: Vec<usize> = non_chunked.iter().chain(&chunked).copied().collect();
        let mut inverse = vec![0; permutation.len()];
        for (blocked, &original) in permutation.iter().enumerate() {
            inverse[original] = blocked;
        }

        Ok(Self {
            dims,
            shape: shape.to_vec(),
            non_chunked,
            chunked,
            permutation,
            inverse,
        })
    }

    /// `requested`, upper-cased, plus the always-chunked axes.
    pub fn effective_chunk_dims(requested: &[char]) -> Vec<char> {
        let labels = requested
            .iter()
            .map(char::to_ascii_uppercase)
            .chain(REQUIRED_CHUNK_DIMS);
        let mut dims = Vec::with_capacity(requested.len() + REQUIRED_CHUNK_DIMS.len());
        for label in labels {
            if !dims.contains(&label) {
                dims.push(label);
            }
        }
        dims
    }

    /// Scene axis labels.
    pub fn dims(&self) -> &[char] {
        &self.dims
    }

    /// Scene shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Labels of the axes spanning the block grid.
    pub fn non_chunked_dims(&self) -> Vec<char> {
        self.non_chunked.iter().map(|&i| self.dims[i]).collect()
    }

    /// Extent of the block grid along each non-chunked axis.
    pub fn grid_shape(&self) -> Vec<usize> {
        self.non_chunked.iter().map(|&i| self.shape[i]).collect()
    }

    /// Labels of the axes read whole inside each block.
    pub fn chunked_dims(&self) -> Vec<char> {
        self.chunked.iter().map(|&i| self.dims[i]).collect()
    }

    /// Shape of every block.
    pub fn block_shape(&self) -> Vec<usize> {
        self.chunked.iter().map(|&i| self.shape[i]).collect()
    }

    /// Grid shape followed by a 1 for every chunked axis.
    pub fn blocked_shape(&self) -> Vec<usize> {
        let mut shape = self.grid_shape();
        shape.extend(std::iter::repeat(1).take(self.chunked.len()));
        shape
    }

    /// Number of blocks in the grid.
    pub fn block_count(&self) -> usize {
        self.grid_shape().iter().product()
    }

    /// For each block-grid-order axis, its position in the scene order.
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// For each scene-order axis, its position in the block-grid order.
    pub fn inverse_permutation(&self) -> &[usize] {
        &self.inverse
    }

    /// Reorder per-axis values from scene order to block-grid order.
    pub fn apply_permutation<T: Clone>(&self, values: &[T]) -> Vec<T> {
        self.permutation.iter().map(|&i| values[i].clone()).collect()
    }

    /// Reorder per-axis values from block-grid order back to scene order.
    pub fn apply_inverse_permutation<T: Clone>(&self, values: &[T]) -> Vec<T> {
        self.inverse.iter().map(|&i| values[i].clone()).collect()
    }

    /// Scene-order selection for the block at `grid_index`.
    ///
    /// Non-chunked axes are fixed to their grid index, chunked axes are
    /// selected whole.
    pub fn selection_for(&self, grid_index: &[usize]) -> Vec<Option<usize>> {
        let mut selection = vec![None; self.dims.len()];
        for (&axis, &index) in self.non_chunked.iter().zip(grid_index) {
            selection[axis] = Some(index);
        }
        selection
    }
}

// =============================================================================
// Tests
// =============================================================================
