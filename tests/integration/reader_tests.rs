//! Scene reader integration tests.
//!
//! Tests verify:
//! - Scenes are discovered for shaped, ImageJ and generic layouts
//! - Placeholder axes are inferred from the shape
//! - Caller overrides are applied or rejected
//! - Unreadable files are reported as unsupported

use tiffscene::{
    ChannelNames, DataType, DimOrder, MemorySource, ReaderError, ReaderOptions, TiffDialect,
    TiffReader,
};

use super::test_utils::{
    open, open_with, plane_u16, u16_stack, StripCodec, TestPage, TiffBuilder, TEST_PATH,
};

/// Two shaped scenes: `[2, 4, 4]` u16 followed by a single 6x6 u8 page.
fn two_scene_file() -> Vec<u8> {
    let mut first = u16_stack(2, 4, 4);
    first[0] = first[0].clone().with_description(r#"{"shape": [2, 4, 4]}"#);
    TiffBuilder::new()
        .pages(first)
        .page(TestPage::gray_u8(6, 6, &[7; 36]).with_description(r#"{"shape": [6, 6]}"#))
        .build()
}

/// Three 16x8 u16 planes described as `[3, 8, 16]` without axes.
fn shaped_stack() -> Vec<u8> {
    let mut pages = u16_stack(3, 16, 8);
    pages[0] = pages[0].clone().with_description(r#"{"shape": [3, 8, 16]}"#);
    TiffBuilder::new().pages(pages).build()
}

// =============================================================================
// Scene discovery
// =============================================================================

#[tokio::test]
async fn test_shaped_placeholder_becomes_channels() {
    let mut pages: Vec<TestPage> = (0..3)
        .map(|_| TestPage::gray_u8(512, 512, &vec![0; 512 * 512]))
        .collect();
    pages[0] = pages[0].clone().with_description(r#"{"shape": [3, 512, 512]}"#);
    let (reader, _) = open(TiffBuilder::new().pages(pages).build()).await;

    assert_eq!(reader.scenes().await.unwrap(), vec!["Image:0"]);
    assert_eq!(reader.dims().await.unwrap(), "CYX");
    assert_eq!(reader.shape().await.unwrap(), vec![3, 512, 512]);
    assert_eq!(reader.dtype().await.unwrap(), DataType::U8);
    assert_eq!(
        reader.channel_names().await.unwrap(),
        Some(vec![
            "Channel:0:0".to_string(),
            "Channel:0:1".to_string(),
            "Channel:0:2".to_string(),
        ])
    );
}

#[tokio::test]
async fn test_shaped_axes_are_kept() {
    let mut pages = u16_stack(6, 4, 4);
    pages[0] = pages[0]
        .clone()
        .with_description(r#"{"shape": [2, 3, 4, 4], "axes": "tzyx"}"#);
    let (reader, _) = open(TiffBuilder::new().pages(pages).build()).await;

    assert_eq!(reader.dims().await.unwrap(), "TZYX");
    assert_eq!(reader.shape().await.unwrap(), vec![2, 3, 4, 4]);
    assert_eq!(reader.channel_names().await.unwrap(), None);
}

#[tokio::test]
async fn test_two_scenes() {
    let (reader, _) = open(two_scene_file()).await;

    assert_eq!(reader.scenes().await.unwrap(), vec!["Image:0", "Image:1"]);
    assert_eq!(reader.current_scene(), "Image:0");

    let summaries = reader.scene_summaries().await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].dims, "CYX");
    assert_eq!(summaries[0].shape, vec![2, 4, 4]);
    assert_eq!(summaries[0].dtype, DataType::U16);
    assert_eq!(summaries[0].pages, 2);
    assert_eq!(summaries[1].id, "Image:1");
    assert_eq!(summaries[1].dims, "YX");
    assert_eq!(summaries[1].dtype, DataType::U8);
}

#[tokio::test]
async fn test_imagej_hyperstack() {
    let mut pages = u16_stack(6, 4, 4);
    pages[0] = pages[0]
        .clone()
        .with_description("ImageJ=1.53t\nimages=6\nchannels=2\nslices=3\nhyperstack=true\n");
    let (reader, _) = open(TiffBuilder::new().pages(pages).build()).await;

    assert_eq!(reader.dims().await.unwrap(), "ZCYX");
    assert_eq!(reader.shape().await.unwrap(), vec![3, 2, 4, 4]);

    // ImageJ stores channels fastest
    let data = reader.read().await.unwrap();
    let array = data.data.as_array::<u16>().unwrap();
    assert_eq!(array[&[0usize, 0, 0, 0][..]], 0);
    assert_eq!(array[&[0usize, 1, 0, 0][..]], 1000);
    assert_eq!(array[&[2usize, 1, 0, 1][..]], 5001);
}

#[tokio::test]
async fn test_generic_stack_skips_reduced_pages() {
    let data = TiffBuilder::new()
        .pages(u16_stack(5, 8, 4))
        .page(TestPage::gray_u16(4, 2, &[0; 8]).reduced())
        .build();
    let (reader, _) = open(data).await;

    assert_eq!(reader.scenes().await.unwrap().len(), 1);
    assert_eq!(reader.dims().await.unwrap(), "CYX");
    assert_eq!(reader.shape().await.unwrap(), vec![5, 4, 8]);
}

#[tokio::test]
async fn test_rgb_page() {
    let values: Vec<u8> = (0..4 * 2 * 3).map(|v| v as u8).collect();
    let data = TiffBuilder::new().page(TestPage::rgb_u8(4, 2, &values)).build();
    let (reader, _) = open(data).await;

    assert_eq!(reader.dims().await.unwrap(), "YXS");
    assert_eq!(reader.shape().await.unwrap(), vec![2, 4, 3]);

    let image = reader.read().await.unwrap();
    let array = image.data.as_array::<u8>().unwrap();
    assert_eq!(array[&[0usize, 0, 2][..]], 2);
    assert_eq!(array[&[1usize, 3, 0][..]], 21);
}

#[tokio::test]
async fn test_deflate_strips() {
    let values = plane_u16(0, 16, 8);
    let data = TiffBuilder::new()
        .page(
            TestPage::gray_u16(16, 8, &values)
                .with_rows_per_strip(3)
                .with_deflate(),
        )
        .build();
    let (reader, _) = open(data).await;

    let image = reader.read().await.unwrap();
    assert_eq!(image.dims_string(), "YX");
    let array = image.data.as_array::<u16>().unwrap();
    assert_eq!(array.iter().copied().collect::<Vec<_>>(), values);
}

#[tokio::test]
async fn test_dialect_drives_grouping() {
    // OME-XML first description: later shaped descriptions do not split scenes
    let mut pages = u16_stack(3, 4, 4);
    pages[0] = pages[0].clone().with_description("<?xml version=\"1.0\"?><OME></OME>");
    pages[2] = pages[2].clone().with_description(r#"{"shape": [4, 4]}"#);
    let (reader, _) = open(TiffBuilder::new().pages(pages).build()).await;
    assert_eq!(reader.dialect(), TiffDialect::Ome);
    assert_eq!(reader.scenes().await.unwrap().len(), 1);
    assert_eq!(reader.shape().await.unwrap(), vec![3, 4, 4]);

    // The same page layout without OME-XML has two scenes
    let mut pages = u16_stack(3, 4, 4);
    pages[2] = pages[2].clone().with_description(r#"{"shape": [4, 4]}"#);
    let (reader, _) = open(TiffBuilder::new().pages(pages).build()).await;
    assert_eq!(reader.dialect(), TiffDialect::Plain);
    assert_eq!(reader.scenes().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_lzw_and_packbits_strips() {
    let values = plane_u16(1, 16, 8);
    for codec in [StripCodec::Lzw, StripCodec::PackBits] {
        let data = TiffBuilder::new()
            .page(
                TestPage::gray_u16(16, 8, &values)
                    .with_rows_per_strip(3)
                    .with_codec(codec),
            )
            .build();
        let (reader, _) = open(data).await;

        let image = reader.read().await.unwrap();
        let array = image.data.as_array::<u16>().unwrap();
        assert_eq!(array.iter().copied().collect::<Vec<_>>(), values, "{:?}", codec);
    }
}

#[tokio::test]
async fn test_attrs_carry_description() {
    let (reader, _) = open(shaped_stack()).await;
    let lazy = reader.read_lazy().await.unwrap();

    assert_eq!(lazy.attrs.description(), Some(r#"{"shape": [3, 8, 16]}"#));
    assert!(lazy.attrs.unprocessed.contains_key(&256));
}

// =============================================================================
// Scene selection
// =============================================================================

#[tokio::test]
async fn test_set_scene() {
    let (mut reader, _) = open(two_scene_file()).await;

    reader.set_scene("Image:1").await.unwrap();
    assert_eq!(reader.current_scene_index(), 1);
    assert_eq!(reader.shape().await.unwrap(), vec![6, 6]);

    reader.set_scene(0usize).await.unwrap();
    assert_eq!(reader.current_scene(), "Image:0");
    assert_eq!(reader.shape().await.unwrap(), vec![2, 4, 4]);
}

#[tokio::test]
async fn test_set_missing_scene_keeps_selection() {
    let (mut reader, _) = open(two_scene_file()).await;
    reader.set_scene(1usize).await.unwrap();

    let result = reader.set_scene("Image:7").await;
    assert!(matches!(result, Err(ReaderError::SceneNotFound(ref id)) if id == "Image:7"));

    let result = reader.set_scene(2usize).await;
    assert!(matches!(result, Err(ReaderError::SceneNotFound(_))));

    assert_eq!(reader.current_scene(), "Image:1");
}

// =============================================================================
// Overrides
// =============================================================================

#[tokio::test]
async fn test_per_scene_dim_order_length_mismatch() {
    let source = MemorySource::single(TEST_PATH, two_scene_file());
    let options = ReaderOptions::default().with_dim_order(DimOrder::PerScene(vec![
        Some("ZYX".to_string()),
        None,
        None,
    ]));

    let result = TiffReader::open(source.clone(), TEST_PATH, options).await;
    assert!(matches!(result, Err(ReaderError::ConflictingConfiguration(_))));

    // Only the structural read happened, no block was loaded
    assert_eq!(source.open_count(), 1);
}

#[tokio::test]
async fn test_per_scene_channel_names_length_mismatch() {
    let options = ReaderOptions::default()
        .with_channel_names(ChannelNames::PerScene(vec![vec!["a".to_string()]]));
    let result = open_with(two_scene_file(), options).await;
    assert!(matches!(result, Err(ReaderError::ConflictingConfiguration(_))));
}

#[tokio::test]
async fn test_per_scene_dim_order() {
    let options = ReaderOptions::default().with_dim_order(DimOrder::PerScene(vec![
        Some("TYX".to_string()),
        None,
    ]));
    let (mut reader, _) = open_with(two_scene_file(), options).await.unwrap();

    assert_eq!(reader.dims().await.unwrap(), "TYX");
    reader.set_scene(1usize).await.unwrap();
    assert_eq!(reader.dims().await.unwrap(), "YX");
}

#[tokio::test]
async fn test_shared_dim_order_wrong_length() {
    let options = ReaderOptions::default().with_dim_order(DimOrder::Shared("TZYX".to_string()));
    let (reader, _) = open_with(shaped_stack(), options).await.unwrap();

    assert!(matches!(
        reader.dims().await,
        Err(ReaderError::ConflictingConfiguration(_))
    ));
    assert!(matches!(
        reader.read_lazy().await,
        Err(ReaderError::ConflictingConfiguration(_))
    ));
}

#[tokio::test]
async fn test_channel_names_override() {
    let names = vec!["dapi".to_string(), "gfp".to_string(), "rfp".to_string()];
    let options = ReaderOptions::default().with_channel_names(ChannelNames::Shared(names.clone()));
    let (reader, _) = open_with(shaped_stack(), options).await.unwrap();

    let lazy = reader.read_lazy().await.unwrap();
    assert_eq!(lazy.coords.get(&'C'), Some(&names));
}

#[tokio::test]
async fn test_channel_names_wrong_count() {
    let options = ReaderOptions::default()
        .with_channel_names(ChannelNames::Shared(vec!["dapi".to_string()]));
    let (reader, _) = open_with(shaped_stack(), options).await.unwrap();

    assert!(matches!(
        reader.read_lazy().await,
        Err(ReaderError::ConflictingConfiguration(_))
    ));
}

#[tokio::test]
async fn test_channel_names_without_channel_axis() {
    let options = ReaderOptions::default()
        .with_dim_order(DimOrder::Shared("ZYX".to_string()))
        .with_channel_names(ChannelNames::Shared(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
        ]));
    let (reader, _) = open_with(shaped_stack(), options).await.unwrap();

    assert!(matches!(
        reader.channel_names().await,
        Err(ReaderError::ConflictingConfiguration(_))
    ));
}

#[tokio::test]
async fn test_dim_order_override_drops_channel_coords() {
    let options = ReaderOptions::default().with_dim_order(DimOrder::Shared("ZYX".to_string()));
    let (reader, _) = open_with(shaped_stack(), options).await.unwrap();

    let lazy = reader.read_lazy().await.unwrap();
    assert_eq!(lazy.dims_string(), "ZYX");
    assert!(lazy.coords.is_empty());
}

// =============================================================================
// Unsupported input
// =============================================================================

#[tokio::test]
async fn test_not_a_tiff() {
    let result = open_with(b"\x89PNG\r\n\x1a\nnot a tiff at all".to_vec(), ReaderOptions::default()).await;
    assert!(matches!(result, Err(ReaderError::UnsupportedFormat { .. })));
}

#[tokio::test]
async fn test_truncated_tiff() {
    let mut data = shaped_stack();
    data.truncate(data.len() - 20);
    let result = open_with(data, ReaderOptions::default()).await;
    assert!(matches!(result, Err(ReaderError::UnsupportedFormat { .. })));
}

#[tokio::test]
async fn test_missing_file() {
    let source = MemorySource::new();
    let result = TiffReader::open(source, "missing.tif", ReaderOptions::default()).await;
    assert!(matches!(result, Err(ReaderError::Io(_))));
}

#[tokio::test]
async fn test_is_supported_image() {
    let source = MemorySource::single(TEST_PATH, shaped_stack()).with_file("notes.txt", b"hello".to_vec());

    assert!(TiffReader::is_supported_image(source.clone(), TEST_PATH).await);
    assert!(!TiffReader::is_supported_image(source.clone(), "notes.txt").await);
    assert!(!TiffReader::is_supported_image(source, "missing.tif").await);
}
