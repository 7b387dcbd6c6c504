//! Physical pixel size integration tests.

use tiffscene::PhysicalPixelSizes;

use super::test_utils::{open, TestPage, TiffBuilder};

const CENTIMETER: u16 = 3;
const INCH: u16 = 2;

fn single_page(page: TestPage) -> Vec<u8> {
    TiffBuilder::new().page(page).build()
}

fn blank() -> TestPage {
    TestPage::gray_u8(4, 4, &[0; 16])
}

#[tokio::test]
async fn test_pixels_per_centimeter() {
    let data = single_page(
        blank()
            .with_resolution((4, 1), (4, 1))
            .with_resolution_unit(CENTIMETER),
    );
    let (reader, _) = open(data).await;

    let sizes = reader.physical_pixel_sizes().await;
    assert_eq!(sizes.x, Some(2500.0));
    assert_eq!(sizes.y, Some(2500.0));
    assert_eq!(sizes.z, None);
}

#[tokio::test]
async fn test_pixels_per_inch() {
    let data = single_page(
        blank()
            .with_resolution((2, 1), (254, 100))
            .with_resolution_unit(INCH),
    );
    let (reader, _) = open(data).await;

    let sizes = reader.physical_pixel_sizes().await;
    assert_eq!(sizes.x, Some(2.54e4 / 2.0));
    assert!((sizes.y.unwrap() - 1e4).abs() < 1e-9);
}

#[tokio::test]
async fn test_no_resolution_is_unknown() {
    let (reader, _) = open(single_page(blank())).await;
    assert_eq!(reader.physical_pixel_sizes().await, PhysicalPixelSizes::UNKNOWN);
}

#[tokio::test]
async fn test_zero_resolution_is_unknown() {
    let data = single_page(
        blank()
            .with_resolution((0, 1), (4, 1))
            .with_resolution_unit(CENTIMETER),
    );
    let (reader, _) = open(data).await;
    assert_eq!(reader.physical_pixel_sizes().await, PhysicalPixelSizes::UNKNOWN);

    // Unknown sizes do not prevent reading
    assert_eq!(reader.read().await.unwrap().data.shape(), &[4, 4]);
}

#[tokio::test]
async fn test_imagej_calibration() {
    let pages = (0..3).map(|i| {
        let page = blank().with_resolution((10, 1), (5, 1)).with_resolution_unit(CENTIMETER);
        if i == 0 {
            page.with_description("ImageJ=1.53t\nimages=3\nslices=3\nunit=micron\nspacing=0.5\n")
        } else {
            page
        }
    });
    let (reader, _) = open(TiffBuilder::new().pages(pages).build()).await;

    assert_eq!(reader.dims().await.unwrap(), "ZYX");
    let sizes = reader.physical_pixel_sizes().await;
    assert_eq!(sizes.z, Some(0.5));
    assert_eq!(sizes.y, Some(0.2));
    assert_eq!(sizes.x, Some(0.1));
}

#[tokio::test]
async fn test_imagej_escaped_micro_sign() {
    let description = "ImageJ=1.53t\nimages=2\nslices=2\nunit=\\u00B5m\nspacing=2\n";
    let pages = (0..2).map(|i| {
        let page = blank().with_resolution((4, 1), (4, 1));
        if i == 0 {
            page.with_description(description)
        } else {
            page
        }
    });
    let (reader, _) = open(TiffBuilder::new().pages(pages).build()).await;

    let sizes = reader.physical_pixel_sizes().await;
    assert_eq!(sizes.z, Some(2.0));
    assert_eq!(sizes.x, Some(0.25));
}

#[tokio::test]
async fn test_sizes_follow_the_selected_scene() {
    let data = TiffBuilder::new()
        .page(blank().with_description(r#"{"shape": [4, 4]}"#))
        .page(
            TestPage::gray_u8(2, 2, &[0; 4])
                .with_description(r#"{"shape": [2, 2]}"#)
                .with_resolution((2, 1), (2, 1)),
        )
        .build();
    let (mut reader, _) = open(data).await;

    assert_eq!(reader.physical_pixel_sizes().await, PhysicalPixelSizes::UNKNOWN);

    reader.set_scene("Image:1").await.unwrap();
    let sizes = reader.physical_pixel_sizes().await;
    assert_eq!(sizes.x, Some(0.5));
    assert_eq!(reader.physical_pixel_sizes().await, sizes);
}
