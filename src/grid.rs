//! Lazy block grids.
//!
//! A [`LazyArray`] is a grid of [`LazyBlock`]s, one per combination of
//! indices over the non-chunked axes of a [`ChunkPlan`]. A block is only a
//! descriptor: it holds a shared [`BlockLoader`] and the selection it stands
//! for, never an open file. Forcing a block asks the loader for data, which
//! opens its own handle, reads, and drops it again.
//!
//! # Evaluation
//!
//! [`LazyArray::compute_region`] forces only the blocks that intersect the
//! requested region, concurrently and in no particular order, then places
//! them on the grid and transposes the result back to the scene's axis order.
//! [`LazyArray::compute`] is the same over the full extent.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use crate::array::{unravel_index, DataType, ImageData};
use crate::chunk_plan::ChunkPlan;
use crate::error::ReaderError;

/// Default number of blocks forced at the same time.
pub const DEFAULT_BLOCK_CONCURRENCY: usize = 8;

// =============================================================================
// BlockLoader
// =============================================================================

/// Produces the data behind a block.
///
/// `selection` has one entry per scene axis: `Some(i)` fixes the axis,
/// `None` selects it whole. The returned array holds the unfixed axes in
/// scene order.
#[async_trait]
pub trait BlockLoader: Send + Sync + 'static {
    async fn load(&self, selection: &[Option<usize>]) -> Result<ImageData, ReaderError>;
}

// =============================================================================
// LazyBlock
// =============================================================================

/// A deferred load of one block.
#[derive(Clone)]
pub struct LazyBlock {
    loader: Arc<dyn BlockLoader>,
    grid_index: Vec<usize>,
    selection: Vec<Option<usize>>,
    shape: Vec<usize>,
    dtype: DataType,
}

impl fmt::Debug for LazyBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyBlock")
            .field("grid_index", &self.grid_index)
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .finish()
    }
}

impl LazyBlock {
    /// Position of the block on the grid.
    pub fn grid_index(&self) -> &[usize] {
        &self.grid_index
    }

    /// Declared shape of the block's data.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Declared element type of the block's data.
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Load the block.
    ///
    /// # Errors
    /// Loader failures are passed through. Data whose shape or element type
    /// differs from the declaration fails with `BlockShapeMismatch`.
    pub async fn load(&self) -> Result<ImageData, ReaderError> {
        let data = self.loader.load(&self.selection).await?;

        if data.shape() != self.shape.as_slice() || data.dtype() != self.dtype {
            return Err(ReaderError::BlockShapeMismatch {
                index: self.grid_index.clone(),
                expected: format!("{} {:?}", self.dtype, self.shape),
                actual: format!("{} {:?}", data.dtype(), data.shape()),
            });
        }

        debug!(index = ?self.grid_index, shape = ?self.shape, "Loaded block");
        Ok(data)
    }
}

// =============================================================================
// LazyArray
// =============================================================================

/// An array whose data is loaded block by block on demand.
#[derive(Debug, Clone)]
pub struct LazyArray {
    plan: ChunkPlan,
    dtype: DataType,
    blocks: Vec<LazyBlock>,
    concurrency: usize,
}

impl LazyArray {
    /// Wire one block per grid position of `plan`.
    pub fn new(loader: Arc<dyn BlockLoader>, plan: ChunkPlan, dtype: DataType) -> Self {
        let grid_shape = plan.grid_shape();
        let block_shape = plan.block_shape();
        let blocks = (0..plan.block_count())
            .map(|flat| {
                let grid_index = unravel_index(flat, &grid_shape);
                LazyBlock {
                    loader: Arc::clone(&loader),
                    selection: plan.selection_for(&grid_index),
                    grid_index,
                    shape: block_shape.clone(),
                    dtype,
                }
            })
            .collect();

        Self {
            plan,
            dtype,
            blocks,
            concurrency: DEFAULT_BLOCK_CONCURRENCY,
        }
    }

    /// Limit how many blocks are forced at once (at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Shape in scene axis order.
    pub fn shape(&self) -> &[usize] {
        self.plan.shape()
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.plan.shape().len()
    }

    /// Element type.
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// The plan this grid was built from.
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Blocks in row-major grid order.
    pub fn blocks(&self) -> &[LazyBlock] {
        &self.blocks
    }

    /// Block at a grid position.
    pub fn block(&self, grid_index: &[usize]) -> Option<&LazyBlock> {
        let grid_shape = self.plan.grid_shape();
        if grid_index.len() != grid_shape.len()
            || grid_index.iter().zip(&grid_shape).any(|(&i, &n)| i >= n)
        {
            return None;
        }
        let flat = grid_index
            .iter()
            .zip(&grid_shape)
            .fold(0, |acc, (&i, &n)| acc * n + i);
        self.blocks.get(flat)
    }

    /// Load every block and assemble the full array.
    pub async fn compute(&self) -> Result<ImageData, ReaderError> {
        let full: Vec<Range<usize>> = self.shape().iter().map(|&n| 0..n).collect();
        self.compute_region(&full).await
    }

    /// Load the blocks intersecting `region` and assemble that region.
    ///
    /// `region` holds one range per axis, in scene axis order.
    ///
    /// # Errors
    /// `InvalidRegion` if the region does not fit the array, otherwise the
    /// first failure of any forced block.
    pub async fn compute_region(&self, region: &[Range<usize>]) -> Result<ImageData, ReaderError> {
        self.check_region(region)?;

        let blocked = self.plan.apply_permutation(region);
        let grid_ndim = self.plan.grid_shape().len();
        let (grid_ranges, chunk_ranges) = blocked.split_at(grid_ndim);

        let sub_grid: Vec<usize> = grid_ranges.iter().map(|r| r.len()).collect();
        let sub_block: Vec<usize> = chunk_ranges.iter().map(|r| r.len()).collect();
        let count: usize = sub_grid.iter().product();

        let selected: Vec<LazyBlock> = (0..count)
            .filter_map(|flat| {
                let index: Vec<usize> = unravel_index(flat, &sub_grid)
                    .iter()
                    .zip(grid_ranges)
                    .map(|(&i, r)| r.start + i)
                    .collect();
                self.block(&index).cloned()
            })
            .collect();

        debug!(
            blocks = selected.len(),
            total = self.blocks.len(),
            "Forcing lazy blocks"
        );

        let mut loaded: Vec<(usize, ImageData)> = stream::iter(selected.into_iter().enumerate())
            .map(|(pos, block)| async move {
                let data = tokio::spawn(async move { block.load().await })
                    .await
                    .map_err(|e| ReaderError::Task(e.to_string()))??;
                Ok::<_, ReaderError>((pos, data))
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;
        loaded.sort_unstable_by_key(|(pos, _)| *pos);

        let pieces: Vec<ImageData> = loaded
            .into_iter()
            .map(|(_, data)| data.slice(chunk_ranges))
            .collect();

        let assembled = ImageData::assemble(self.dtype, &sub_grid, &sub_block, pieces).ok_or_else(|| {
            ReaderError::InvalidRegion("blocks could not be placed on the grid".to_string())
        })?;

        Ok(assembled.permuted_axes(self.plan.inverse_permutation()))
    }

    fn check_region(&self, region: &[Range<usize>]) -> Result<(), ReaderError> {
        if region.len() != self.ndim() {
            return Err(ReaderError::InvalidRegion(format!(
                "{} ranges for {} axes",
                region.len(),
                self.ndim()
            )));
        }
        for (axis, (range, &size)) in region.iter().zip(self.shape()).enumerate() {
            if range.start > range.end || range.end > size {
                return Err(ReaderError::InvalidRegion(format!(
                    "range {:?} out of bounds for axis {} of size {}",
                    range, axis, size
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
