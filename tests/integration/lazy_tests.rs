//! Lazy read integration tests.
//!
//! Tests verify:
//! - Lazy, region and immediate reads agree
//! - Every forced block opens its own file handle
//! - Region reads force only the blocks they intersect
//! - Chunk axes control the block grid

use tiffscene::{ImageData, ReaderError, ReaderOptions};

use super::test_utils::{open, open_with, u16_stack, TiffBuilder};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 8;

/// `[2, 3, 8, 16]` u16 stack described as `tzyx`; plane `p` holds `p * 1000 + i`.
fn tzyx_file() -> Vec<u8> {
    let mut pages = u16_stack(6, WIDTH, HEIGHT);
    pages[0] = pages[0]
        .clone()
        .with_description(r#"{"shape": [2, 3, 8, 16], "axes": "TZYX"}"#);
    TiffBuilder::new().pages(pages).build()
}

/// `[3, 8, 16]` u16 stack whose leading axis is inferred as `C`.
fn channel_file() -> Vec<u8> {
    let mut pages = u16_stack(3, WIDTH, HEIGHT);
    pages[0] = pages[0].clone().with_description(r#"{"shape": [3, 8, 16]}"#);
    TiffBuilder::new().pages(pages).build()
}

fn value(data: &ImageData, index: &[usize]) -> u16 {
    data.as_array::<u16>().unwrap()[index]
}

// =============================================================================
// Consistency
// =============================================================================

#[tokio::test]
async fn test_lazy_matches_immediate() {
    let (reader, _) = open(tzyx_file()).await;

    let lazy = reader.read_lazy().await.unwrap();
    assert_eq!(lazy.data.shape(), &[2, 3, 8, 16]);

    let computed = lazy.compute().await.unwrap();
    let immediate = reader.read().await.unwrap();
    assert_eq!(computed.data, immediate.data);
    assert_eq!(computed.dims, immediate.dims);

    // Plane (t, z) is page t * 3 + z
    assert_eq!(value(&computed.data, &[0, 0, 0, 0]), 0);
    assert_eq!(value(&computed.data, &[1, 2, 0, 5]), 5005);
    assert_eq!(value(&computed.data, &[0, 1, 7, 15]), 1000 + 127);
}

#[tokio::test]
async fn test_region_matches_full_slice() {
    let (reader, _) = open(tzyx_file()).await;
    let lazy = reader.read_lazy().await.unwrap();

    let full = lazy.compute().await.unwrap();
    let region = [1..2, 1..3, 2..6, 3..11];
    let part = lazy.compute_region(&region).await.unwrap();

    assert_eq!(part.data.shape(), &[1, 2, 4, 8]);
    assert_eq!(part.data, full.data.slice(&region));
}

#[tokio::test]
async fn test_region_slices_channel_coords() {
    let (reader, _) = open(channel_file()).await;
    let lazy = reader.read_lazy().await.unwrap();

    let part = lazy.compute_region(&[1..3, 0..8, 0..16]).await.unwrap();
    assert_eq!(
        part.coords.get(&'C'),
        Some(&vec!["Channel:0:1".to_string(), "Channel:0:2".to_string()])
    );
    assert_eq!(value(&part.data, &[0, 0, 0]), 1000);
    assert_eq!(value(&part.data, &[1, 0, 1]), 2001);
}

// =============================================================================
// File handles
// =============================================================================

#[tokio::test]
async fn test_each_block_opens_the_file() {
    let (reader, source) = open(channel_file()).await;
    assert_eq!(source.open_count(), 1);

    // Building the grid reads nothing
    let lazy = reader.read_lazy().await.unwrap();
    assert_eq!(lazy.data.blocks().len(), 3);
    assert_eq!(source.open_count(), 1);

    lazy.compute().await.unwrap();
    assert_eq!(source.open_count(), 4);

    reader.read().await.unwrap();
    assert_eq!(source.open_count(), 5);
}

#[tokio::test]
async fn test_region_forces_intersecting_blocks_only() {
    let (reader, source) = open(tzyx_file()).await;
    let lazy = reader.read_lazy().await.unwrap();

    // Default chunk axes read Z, Y and X whole: one block per T
    assert_eq!(lazy.data.plan().grid_shape(), vec![2]);
    assert_eq!(lazy.data.plan().block_shape(), vec![3, 8, 16]);

    let before = source.open_count();
    lazy.compute_region(&[1..2, 0..1, 0..2, 0..2]).await.unwrap();
    assert_eq!(source.open_count(), before + 1);
}

#[tokio::test]
async fn test_single_block_load() {
    let (reader, _) = open(channel_file()).await;
    let lazy = reader.read_lazy().await.unwrap();

    let block = lazy.data.block(&[2]).unwrap();
    assert_eq!(block.shape(), &[8, 16]);

    let data = block.load().await.unwrap();
    assert_eq!(data.shape(), &[8, 16]);
    assert_eq!(value(&data, &[0, 3]), 2003);
}

// =============================================================================
// Chunk axes
// =============================================================================

#[tokio::test]
async fn test_chunk_dims_shape_the_grid() {
    let options = ReaderOptions::default().with_chunk_dims("yx".chars());
    let (reader, source) = open_with(tzyx_file(), options).await.unwrap();
    let lazy = reader.read_lazy().await.unwrap();

    assert_eq!(lazy.data.plan().grid_shape(), vec![2, 3]);
    assert_eq!(lazy.data.blocks().len(), 6);

    let computed = lazy.compute().await.unwrap();
    assert_eq!(source.open_count(), 7);
    assert_eq!(computed.data, reader.read().await.unwrap().data);
}

#[tokio::test]
async fn test_all_axes_chunked_is_one_block() {
    let options = ReaderOptions::default().with_chunk_dims("TZ".chars());
    let (reader, source) = open_with(tzyx_file(), options).await.unwrap();
    let lazy = reader.read_lazy().await.unwrap();

    assert_eq!(lazy.data.blocks().len(), 1);
    lazy.compute().await.unwrap();
    assert_eq!(source.open_count(), 2);
}

#[tokio::test]
async fn test_leading_chunk_axis_is_permuted_back() {
    // T read whole while Z is the grid axis
    let options = ReaderOptions::default().with_chunk_dims("T".chars());
    let (reader, _) = open_with(tzyx_file(), options).await.unwrap();
    let lazy = reader.read_lazy().await.unwrap();

    assert_eq!(lazy.data.plan().grid_shape(), vec![3]);
    let computed = lazy.compute().await.unwrap();
    assert_eq!(computed.data.shape(), &[2, 3, 8, 16]);
    assert_eq!(value(&computed.data, &[1, 0, 0, 0]), 3000);
    assert_eq!(computed.data, reader.read().await.unwrap().data);
}

#[tokio::test]
async fn test_lowercase_chunk_dims_in_struct_literal() {
    let options = ReaderOptions {
        chunk_dims: vec!['t'],
        ..ReaderOptions::default()
    };
    let (reader, _) = open_with(tzyx_file(), options).await.unwrap();
    let lazy = reader.read_lazy().await.unwrap();

    assert_eq!(lazy.data.plan().grid_shape(), vec![3]);
    assert_eq!(lazy.data.plan().block_shape(), vec![2, 8, 16]);
}

#[tokio::test]
async fn test_concurrency_of_one() {
    let options = ReaderOptions::default()
        .with_chunk_dims("yx".chars())
        .with_concurrency(1);
    let (reader, _) = open_with(tzyx_file(), options).await.unwrap();
    let lazy = reader.read_lazy().await.unwrap();

    let computed = lazy.compute().await.unwrap();
    assert_eq!(computed.data, reader.read().await.unwrap().data);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_out_of_bounds_region() {
    let (reader, source) = open(channel_file()).await;
    let lazy = reader.read_lazy().await.unwrap();

    let result = lazy.compute_region(&[0..4, 0..8, 0..16]).await;
    assert!(matches!(result, Err(ReaderError::InvalidRegion(_))));

    let result = lazy.compute_region(&[0..1, 0..8]).await;
    assert!(matches!(result, Err(ReaderError::InvalidRegion(_))));

    assert_eq!(source.open_count(), 1);
}
