//! Scene reader.
//!
//! [`TiffReader`] is the entry point of the crate. It opens a file once to
//! learn its structure, exposes every series as a scene (`Image:<n>`), and
//! reads the selected scene as a [`LabeledArray`], either lazily (a grid of
//! blocks that each reopen the file when forced) or immediately.
//!
//! # Usage
//!
//! ```ignore
//! use tiffscene::{LocalFileSource, ReaderOptions, TiffReader};
//!
//! let mut reader = TiffReader::open(LocalFileSource::new(), "stack.tif", ReaderOptions::default()).await?;
//! reader.set_scene("Image:1").await?;
//!
//! let lazy = reader.read_lazy().await?;
//! let first_channel = lazy.compute_region(&[0..1, 0..512, 0..512]).await?;
//! let sizes = reader.physical_pixel_sizes().await;
//! ```

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::array::{DataType, ImageData};
use crate::chunk_plan::ChunkPlan;
use crate::dimensions::{self, DEFAULT_CHUNK_DIMS};
use crate::error::{PixelSizeError, ReaderError, TiffError};
use crate::format::series::{group_series, ImageJMetadata, Series};
use crate::format::tiff::TiffFile;
use crate::format::{detect_dialect, read_selection, TiffDialect};
use crate::grid::{BlockLoader, LazyArray, DEFAULT_BLOCK_CONCURRENCY};
use crate::io::{BlockCache, RangeReader, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
use crate::metadata::{self, Attributes, PhysicalPixelSizes};
use crate::source::ImageSource;

// =============================================================================
// Constants
// =============================================================================

/// File extensions this reader handles.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

/// Prefix of scene ids.
pub const SCENE_ID_PREFIX: &str = "Image:";

/// Label of the channel axis.
pub const CHANNEL_AXIS: char = 'C';

/// Scene id for a series index.
pub fn scene_id(index: usize) -> String {
    format!("{}{}", SCENE_ID_PREFIX, index)
}

/// Coordinate label of a channel.
pub fn channel_id(scene: usize, channel: usize) -> String {
    format!("Channel:{}:{}", scene, channel)
}

// =============================================================================
// Options
// =============================================================================

/// Axis order override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimOrder {
    /// One order for every scene
    Shared(String),

    /// One entry per scene; `None` falls back to inference
    PerScene(Vec<Option<String>>),
}

/// Channel name override.
///
/// An empty list means no names were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelNames {
    /// One list for every scene
    Shared(Vec<String>),

    /// One list per scene
    PerScene(Vec<Vec<String>>),
}

/// Options for [`TiffReader::open`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Axes read whole inside each lazy block (`Y`, `X`, `S` are always added)
    pub chunk_dims: Vec<char>,

    /// Axis order override
    pub dim_order: Option<DimOrder>,

    /// Channel name override
    pub channel_names: Option<ChannelNames>,

    /// Block size of each handle's block cache
    pub block_size: usize,

    /// Number of blocks cached per handle
    pub cache_blocks: usize,

    /// Maximum lazy blocks loaded at once
    pub concurrency: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            chunk_dims: DEFAULT_CHUNK_DIMS.to_vec(),
            dim_order: None,
            channel_names: None,
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_BLOCK_CACHE_CAPACITY,
            concurrency: DEFAULT_BLOCK_CONCURRENCY,
        }
    }
}

impl ReaderOptions {
    /// Set the chunk axes; labels are upper-cased.
    pub fn with_chunk_dims(mut self, dims: impl IntoIterator<Item = char>) -> Self {
        self.chunk_dims = dimensions::normalize_chunk_dims(dims);
        self
    }

    /// Set the axis order override.
    pub fn with_dim_order(mut self, dim_order: DimOrder) -> Self {
        self.dim_order = Some(dim_order);
        self
    }

    /// Set the channel name override.
    pub fn with_channel_names(mut self, names: ChannelNames) -> Self {
        self.channel_names = Some(names);
        self
    }

    /// Set the block cache geometry of every handle.
    pub fn with_block_cache(mut self, block_size: usize, cache_blocks: usize) -> Self {
        self.block_size = block_size;
        self.cache_blocks = cache_blocks;
        self
    }

    /// Set how many lazy blocks may load at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    fn dim_order_for(&self, scene: usize) -> Option<&str> {
        match &self.dim_order {
            Some(DimOrder::Shared(order)) => Some(order),
            Some(DimOrder::PerScene(orders)) => orders.get(scene).and_then(|o| o.as_deref()),
            None => None,
        }
    }

    fn channel_names_for(&self, scene: usize) -> Option<&[String]> {
        let names = match &self.channel_names {
            Some(ChannelNames::Shared(names)) => Some(names.as_slice()),
            Some(ChannelNames::PerScene(names)) => names.get(scene).map(Vec::as_slice),
            None => None,
        };
        names.filter(|n| !n.is_empty())
    }

    /// Check per-scene overrides against the number of scenes.
    fn validate(&self, scene_count: usize) -> Result<(), ReaderError> {
        if let Some(DimOrder::PerScene(orders)) = &self.dim_order {
            if orders.len() != scene_count {
                return Err(ReaderError::ConflictingConfiguration(format!(
                    "{} dimension orders given for {} scenes",
                    orders.len(),
                    scene_count
                )));
            }
        }
        if let Some(ChannelNames::PerScene(names)) = &self.channel_names {
            if names.len() != scene_count {
                return Err(ReaderError::ConflictingConfiguration(format!(
                    "{} channel name lists given for {} scenes",
                    names.len(),
                    scene_count
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Scene references
// =============================================================================

/// A scene given by id (`Image:<n>`) or by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneRef {
    Id(String),
    Index(usize),
}

impl From<usize> for SceneRef {
    fn from(index: usize) -> Self {
        SceneRef::Index(index)
    }
}

impl From<&str> for SceneRef {
    fn from(id: &str) -> Self {
        SceneRef::Id(id.to_string())
    }
}

impl From<String> for SceneRef {
    fn from(id: String) -> Self {
        SceneRef::Id(id)
    }
}

// =============================================================================
// Labeled arrays
// =============================================================================

/// An array with axis labels, coordinates and metadata.
#[derive(Debug, Clone)]
pub struct LabeledArray<A> {
    /// The data, in memory or lazy
    pub data: A,

    /// One label per axis
    pub dims: Vec<char>,

    /// Coordinate labels per axis (the channel axis at least)
    pub coords: BTreeMap<char, Vec<String>>,

    /// Tag dump of the scene's first page
    pub attrs: Attributes,
}

impl<A> LabeledArray<A> {
    /// Axis labels as a string.
    pub fn dims_string(&self) -> String {
        self.dims.iter().collect()
    }

    /// Position of an axis label.
    pub fn axis(&self, label: char) -> Option<usize> {
        self.dims.iter().position(|&d| d == label)
    }
}

impl LabeledArray<LazyArray> {
    /// Force every block.
    pub async fn compute(&self) -> Result<LabeledArray<ImageData>, ReaderError> {
        Ok(LabeledArray {
            data: self.data.compute().await?,
            dims: self.dims.clone(),
            coords: self.coords.clone(),
            attrs: self.attrs.clone(),
        })
    }

    /// Force the blocks intersecting `region` and return that region.
    ///
    /// Coordinates are sliced along with the data.
    pub async fn compute_region(
        &self,
        region: &[Range<usize>],
    ) -> Result<LabeledArray<ImageData>, ReaderError> {
        let data = self.data.compute_region(region).await?;
        let coords = self
            .coords
            .iter()
            .map(|(&label, values)| {
                let sliced = match self.axis(label).and_then(|axis| region.get(axis)) {
                    Some(range) => values[range.clone()].to_vec(),
                    None => values.clone(),
                };
                (label, sliced)
            })
            .collect();

        Ok(LabeledArray {
            data,
            dims: self.dims.clone(),
            coords,
            attrs: self.attrs.clone(),
        })
    }
}

/// Summary of one scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSummary {
    pub id: String,
    pub index: usize,
    pub kind: &'static str,
    pub dims: String,
    pub shape: Vec<usize>,
    pub dtype: DataType,
    pub pages: usize,
}

// =============================================================================
// Block loading
// =============================================================================

/// Loads a selection of one scene through a freshly opened handle.
struct SceneBlockLoader<S: ImageSource> {
    source: Arc<S>,
    path: String,
    scene: usize,
    block_size: usize,
    cache_blocks: usize,
}

#[async_trait]
impl<S: ImageSource> BlockLoader for SceneBlockLoader<S> {
    async fn load(&self, selection: &[Option<usize>]) -> Result<ImageData, ReaderError> {
        let handle = self.source.create_reader(&self.path).await?;
        let reader = BlockCache::with_capacity(handle, self.block_size, self.cache_blocks);

        let file = TiffFile::open(&reader).await?;
        let series = group_series(&file.pages, detect_dialect(&file.pages))?;
        let scene = series
            .get(self.scene)
            .ok_or_else(|| ReaderError::SceneNotFound(scene_id(self.scene)))?;

        debug!(
            file = reader.identifier(),
            scene = self.scene,
            selection = ?selection,
            "Reading block"
        );

        Ok(read_selection(&reader, &file, scene, selection).await?)
    }
}

// =============================================================================
// TiffReader
// =============================================================================

/// Reader for multi-scene TIFF files.
pub struct TiffReader<S: ImageSource> {
    source: Arc<S>,
    path: String,
    options: ReaderOptions,
    file: TiffFile,
    dialect: TiffDialect,
    imagej: Option<ImageJMetadata>,
    series: OnceCell<Vec<Series>>,
    pixel_sizes: Vec<OnceCell<PhysicalPixelSizes>>,
    current: usize,
}

impl<S: ImageSource> TiffReader<S> {
    /// Open a file and validate the options against it.
    ///
    /// The file is read through one handle that is closed before returning.
    ///
    /// # Errors
    /// - `UnsupportedFormat` if the file is not a readable TIFF
    /// - `ConflictingConfiguration` if per-scene options do not match the
    ///   number of scenes
    pub async fn open(source: S, path: &str, options: ReaderOptions) -> Result<Self, ReaderError> {
        let source = Arc::new(source);
        let unsupported = |reason: String| ReaderError::UnsupportedFormat {
            path: path.to_string(),
            reason,
        };

        let handle = source.create_reader(path).await?;
        let reader = BlockCache::with_capacity(handle, options.block_size, options.cache_blocks);

        let file = TiffFile::open(&reader)
            .await
            .map_err(|e| unsupported(e.to_string()))?;

        let dialect = detect_dialect(&file.pages);
        if dialect == TiffDialect::Ome || path.to_ascii_lowercase().contains(".ome.tif") {
            warn!(
                path,
                "File looks like OME-TIFF; OME metadata is ignored by this reader"
            );
        }
        let imagej = match dialect {
            TiffDialect::ImageJ => file
                .pages
                .iter()
                .find(|p| !p.is_reduced())
                .and_then(|p| p.description())
                .and_then(ImageJMetadata::parse),
            _ => None,
        };

        let mut tiff_reader = Self {
            source,
            path: path.to_string(),
            options,
            file,
            dialect,
            imagej,
            series: OnceCell::new(),
            pixel_sizes: Vec::new(),
            current: 0,
        };

        let scene_count = tiff_reader
            .series()
            .await
            .map_err(|e| unsupported(e.to_string()))?
            .len();
        if scene_count == 0 {
            return Err(unsupported("file contains no images".to_string()));
        }
        tiff_reader.options.validate(scene_count)?;
        tiff_reader.pixel_sizes = (0..scene_count).map(|_| OnceCell::new()).collect();

        info!(
            path,
            dialect = dialect.name(),
            scenes = scene_count,
            "Opened TIFF"
        );

        Ok(tiff_reader)
    }

    /// Whether `path` opens as a readable TIFF.
    pub async fn is_supported_image(source: S, path: &str) -> bool {
        match Self::open(source, path, ReaderOptions::default()).await {
            Ok(_) => true,
            Err(e) => {
                debug!(path, error = %e, "Not a supported image");
                false
            }
        }
    }

    /// Path the reader was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Options the reader was opened with.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Parsed file structure.
    pub fn file(&self) -> &TiffFile {
        &self.file
    }

    /// Writer convention of the file.
    pub fn dialect(&self) -> TiffDialect {
        self.dialect
    }

    async fn series(&self) -> Result<&[Series], TiffError> {
        self.series
            .get_or_try_init(|| async { group_series(&self.file.pages, self.dialect) })
            .await
            .map(Vec::as_slice)
    }

    async fn scene(&self, index: usize) -> Result<&Series, ReaderError> {
        self.series()
            .await?
            .get(index)
            .ok_or_else(|| ReaderError::SceneNotFound(scene_id(index)))
    }

    // -------------------------------------------------------------------------
    // Scenes
    // -------------------------------------------------------------------------

    /// Ids of every scene, in file order.
    pub async fn scenes(&self) -> Result<Vec<String>, ReaderError> {
        Ok((0..self.series().await?.len()).map(scene_id).collect())
    }

    /// Id of the selected scene.
    pub fn current_scene(&self) -> String {
        scene_id(self.current)
    }

    /// Index of the selected scene.
    pub fn current_scene_index(&self) -> usize {
        self.current
    }

    /// Select a scene by id or index.
    ///
    /// # Errors
    /// `SceneNotFound` if no such scene exists; the selection is unchanged.
    pub async fn set_scene(&mut self, scene: impl Into<SceneRef>) -> Result<(), ReaderError> {
        let count = self.series().await?.len();
        let index = match scene.into() {
            SceneRef::Index(index) if index < count => index,
            SceneRef::Index(index) => return Err(ReaderError::SceneNotFound(scene_id(index))),
            SceneRef::Id(id) => (0..count)
                .find(|&i| scene_id(i) == id)
                .ok_or(ReaderError::SceneNotFound(id))?,
        };
        self.current = index;
        Ok(())
    }

    /// Summaries of every scene.
    pub async fn scene_summaries(&self) -> Result<Vec<SceneSummary>, ReaderError> {
        let count = self.series().await?.len();
        let mut summaries = Vec::with_capacity(count);
        for index in 0..count {
            let series = self.scene(index).await?;
            summaries.push(SceneSummary {
                id: scene_id(index),
                index,
                kind: series.kind.name(),
                dims: self.resolve_dims(index).await?,
                shape: series.shape.clone(),
                dtype: series.dtype,
                pages: series.pages.len(),
            });
        }
        Ok(summaries)
    }

    // -------------------------------------------------------------------------
    // Scene properties
    // -------------------------------------------------------------------------

    /// Axis labels of a scene: the override if given, otherwise inferred.
    ///
    /// # Errors
    /// `ConflictingConfiguration` if an override does not have one label per
    /// axis.
    async fn resolve_dims(&self, index: usize) -> Result<String, ReaderError> {
        let series = self.scene(index).await?;
        match self.options.dim_order_for(index) {
            Some(order) if order.chars().count() != series.shape.len() => {
                Err(ReaderError::ConflictingConfiguration(format!(
                    "dimension order {:?} has {} axes but scene {} has shape {:?}",
                    order,
                    order.chars().count(),
                    scene_id(index),
                    series.shape
                )))
            }
            Some(order) => Ok(order.to_string()),
            None => Ok(dimensions::infer(&series.axes, &series.shape)),
        }
    }

    /// Channel coordinate labels of a scene, `None` without a channel axis.
    async fn resolve_channels(
        &self,
        index: usize,
        dims: &str,
    ) -> Result<Option<Vec<String>>, ReaderError> {
        let series = self.scene(index).await?;
        let axis = dims.chars().position(|d| d == CHANNEL_AXIS);
        let names = self.options.channel_names_for(index);

        match (axis, names) {
            (None, Some(_)) => Err(ReaderError::ConflictingConfiguration(format!(
                "channel names given for scene {} which has no {} axis (dims {})",
                scene_id(index),
                CHANNEL_AXIS,
                dims
            ))),
            (None, None) => Ok(None),
            (Some(axis), Some(names)) if names.len() != series.shape[axis] => {
                Err(ReaderError::ConflictingConfiguration(format!(
                    "{} channel names given for scene {} with {} channels",
                    names.len(),
                    scene_id(index),
                    series.shape[axis]
                )))
            }
            (Some(_), Some(names)) => Ok(Some(names.to_vec())),
            (Some(axis), None) => Ok(Some(
                (0..series.shape[axis]).map(|c| channel_id(index, c)).collect(),
            )),
        }
    }

    /// Axis labels of the selected scene.
    pub async fn dims(&self) -> Result<String, ReaderError> {
        self.resolve_dims(self.current).await
    }

    /// Shape of the selected scene.
    pub async fn shape(&self) -> Result<Vec<usize>, ReaderError> {
        Ok(self.scene(self.current).await?.shape.clone())
    }

    /// Element type of the selected scene.
    pub async fn dtype(&self) -> Result<DataType, ReaderError> {
        Ok(self.scene(self.current).await?.dtype)
    }

    /// Channel labels of the selected scene, `None` without a channel axis.
    pub async fn channel_names(&self) -> Result<Option<Vec<String>>, ReaderError> {
        let dims = self.dims().await?;
        self.resolve_channels(self.current, &dims).await
    }

    /// Chunk plan the selected scene would be read with.
    pub async fn chunk_plan(&self) -> Result<ChunkPlan, ReaderError> {
        let dims = self.dims().await?;
        let shape = self.shape().await?;
        ChunkPlan::build(&dims, &shape, &self.options.chunk_dims)
    }

    // -------------------------------------------------------------------------
    // Reading
    // -------------------------------------------------------------------------

    fn loader(&self, scene: usize) -> Arc<dyn BlockLoader> {
        Arc::new(SceneBlockLoader {
            source: Arc::clone(&self.source),
            path: self.path.clone(),
            scene,
            block_size: self.options.block_size,
            cache_blocks: self.options.cache_blocks,
        })
    }

    async fn labels(&self) -> Result<(Vec<char>, BTreeMap<char, Vec<String>>, Attributes), ReaderError> {
        let series = self.scene(self.current).await?;
        let dims = self.dims().await?;

        let mut coords = BTreeMap::new();
        if let Some(channels) = self.resolve_channels(self.current, &dims).await? {
            coords.insert(CHANNEL_AXIS, channels);
        }

        let attrs = self
            .file
            .pages
            .get(series.first_page())
            .map(Attributes::from_page)
            .unwrap_or_default();

        Ok((dims.chars().collect(), coords, attrs))
    }

    /// Read the selected scene as a grid of lazy blocks.
    ///
    /// No pixel data is read until the array is computed.
    pub async fn read_lazy(&self) -> Result<LabeledArray<LazyArray>, ReaderError> {
        let (dims, coords, attrs) = self.labels().await?;
        let series = self.scene(self.current).await?;

        let dims_str: String = dims.iter().collect();
        let plan = ChunkPlan::build(&dims_str, &series.shape, &self.options.chunk_dims)?;
        debug!(
            scene = self.current,
            grid = ?plan.grid_shape(),
            block = ?plan.block_shape(),
            "Built chunk plan"
        );

        let data = LazyArray::new(self.loader(self.current), plan, series.dtype)
            .with_concurrency(self.options.concurrency);

        Ok(LabeledArray {
            data,
            dims,
            coords,
            attrs,
        })
    }

    /// Read the whole selected scene into memory.
    pub async fn read(&self) -> Result<LabeledArray<ImageData>, ReaderError> {
        let (dims, coords, attrs) = self.labels().await?;
        let selection = vec![None; dims.len()];
        let data = self.loader(self.current).load(&selection).await?;

        Ok(LabeledArray {
            data,
            dims,
            coords,
            attrs,
        })
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    /// Physical pixel sizes of the selected scene, in micrometers.
    ///
    /// Failures are logged and yield unknown sizes. The result is computed
    /// once per scene.
    pub async fn physical_pixel_sizes(&self) -> PhysicalPixelSizes {
        let Some(cell) = self.pixel_sizes.get(self.current) else {
            return PhysicalPixelSizes::UNKNOWN;
        };
        *cell
            .get_or_init(|| async { self.resolve_pixel_sizes(self.current).await })
            .await
    }

    async fn resolve_pixel_sizes(&self, index: usize) -> PhysicalPixelSizes {
        let page = match self.scene(index).await {
            Ok(series) => self.file.pages.get(series.first_page()),
            Err(_) => None,
        };
        match page {
            Some(page) => metadata::resolve_or_unknown(page, self.imagej.as_ref()),
            None => {
                warn!(error = %PixelSizeError::EmptyScene(index), "Could not resolve physical pixel sizes");
                PhysicalPixelSizes::UNKNOWN
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids() {
        assert_eq!(scene_id(3), "Image:3");
        assert_eq!(channel_id(0, 2), "Channel:0:2");
    }

    #[test]
    fn test_default_options() {
        let options = ReaderOptions::default();
        assert_eq!(options.chunk_dims, vec!['Z', 'Y', 'X', 'S']);
        assert!(options.dim_order.is_none());
        assert_eq!(options.concurrency, DEFAULT_BLOCK_CONCURRENCY);
    }

    #[test]
    fn test_chunk_dims_upper_cased() {
        let options = ReaderOptions::default().with_chunk_dims("czyx".chars());
        assert_eq!(options.chunk_dims, vec!['C', 'Z', 'Y', 'X']);
    }

    #[test]
    fn test_validate_per_scene_lengths() {
        let options = ReaderOptions::default().with_dim_order(DimOrder::PerScene(vec![
            Some("ZYX".to_string()),
            None,
            None,
        ]));
        assert!(options.validate(3).is_ok());
        assert!(matches!(
            options.validate(2),
            Err(ReaderError::ConflictingConfiguration(_))
        ));

        let options = ReaderOptions::default()
            .with_channel_names(ChannelNames::PerScene(vec![vec!["a".to_string()]]));
        assert!(options.validate(1).is_ok());
        assert!(options.validate(2).is_err());

        // Shared overrides apply to any number of scenes
        let options = ReaderOptions::default()
            .with_dim_order(DimOrder::Shared("CYX".to_string()))
            .with_channel_names(ChannelNames::Shared(vec!["a".to_string()]));
        assert!(options.validate(5).is_ok());
    }

    #[test]
    fn test_overrides_per_scene() {
        let options = ReaderOptions::default()
            .with_dim_order(DimOrder::PerScene(vec![None, Some("TYX".to_string())]))
            .with_channel_names(ChannelNames::PerScene(vec![vec![], vec!["dapi".to_string()]]));
        assert_eq!(options.dim_order_for(0), None);
        assert_eq!(options.dim_order_for(1), Some("TYX"));
        assert_eq!(options.channel_names_for(0), None);
        assert_eq!(options.channel_names_for(1), Some(&["dapi".to_string()][..]));
    }

    #[test]
    fn test_scene_ref_conversions() {
        assert_eq!(SceneRef::from(2usize), SceneRef::Index(2));
        assert_eq!(SceneRef::from("Image:1"), SceneRef::Id("Image:1".to_string()));
    }
}
