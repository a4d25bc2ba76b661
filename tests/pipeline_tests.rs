//! # Pipeline Tests
//!
//! End-to-end checks of the label pipeline: a label description goes in,
//! the TSPL command buffer comes out and is read back with the parser.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pretty_assertions::assert_eq;

use mise::label::{Allergen, LabelDescription, LabelHeight, LabelVariant};
use mise::protocol::{BitmapMode, CommandBuffer};
use mise::{LabelPipeline, MiseError, PhysicalSpec, PrintRequest};

fn prep_label() -> LabelDescription {
    let mut label = LabelDescription::new("Tomato Sauce", "2026-10-18", "2026-10-21");
    label.label_variant = LabelVariant::Prep;
    label.prepared_by = Some("JM".into());
    label.allergens = vec![Allergen {
        name: "Celery".into(),
    }];
    label
}

fn ppds_label() -> LabelDescription {
    let mut label = LabelDescription::new("Chicken Caesar Wrap", "2026-10-18", "2026-10-20");
    label.label_variant = LabelVariant::Ppds;
    label.ingredients = vec![
        "Tortilla (wheat)".into(),
        "Chicken".into(),
        "Parmesan (milk)".into(),
        "Caesar dressing (egg, mustard)".into(),
    ];
    label.allergens = ["Gluten", "Milk", "Egg", "Mustard"]
        .iter()
        .map(|name| Allergen {
            name: name.to_string(),
        })
        .collect();
    label.storage_info = Some("Keep refrigerated below 5°C".into());
    label.business_name = Some("Corner Deli".into());
    label
}

async fn encode(request: &PrintRequest) -> Vec<u8> {
    LabelPipeline::default()
        .encode(request)
        .await
        .unwrap()
        .into_bytes()
}

// ============================================================================
// COMMAND BUFFER SHAPE
// ============================================================================

#[tokio::test]
async fn test_compact_label_at_203_dpi() {
    let request = PrintRequest::new(prep_label(), PhysicalSpec::COMPACT_203);
    let bytes = encode(&request).await;

    let header = b"SIZE 60 mm,40 mm\r\nGAP 0 mm,0 mm\r\nDIRECTION 0,0\r\nREFERENCE 0,0\r\nCLS\r\nBITMAP 0,0,60,320,0,";
    assert_eq!(&bytes[..header.len()], &header[..]);
    assert!(bytes.ends_with(b"\r\nPRINT 1,1\r\n"));

    let parsed = CommandBuffer::parse(&bytes).unwrap();
    assert_eq!(parsed.width_mm, 60.0);
    assert_eq!(parsed.height_mm, 40.0);
    assert_eq!(parsed.bitmap.width_bytes, 60);
    assert_eq!(parsed.bitmap.height, 320);
    assert_eq!(parsed.bitmap.mode, BitmapMode::Overwrite);
    assert_eq!(parsed.bitmap.data.len(), 60 * 320);
    assert_eq!(parsed.copies, 1);
    assert!(!parsed.cut);
}

#[tokio::test]
async fn test_label_has_ink_and_paper() {
    let request = PrintRequest::new(prep_label(), PhysicalSpec::COMPACT_203);
    let parsed = CommandBuffer::parse(&encode(&request).await).unwrap();

    // The banner row is inverted, so the first row is mostly ink.
    let first_row = &parsed.bitmap.data[..60];
    assert!(first_row.iter().filter(|&&b| b == 0x00).count() > 30);
    // The bottom margin is blank paper.
    let last_row = &parsed.bitmap.data[parsed.bitmap.data.len() - 60..];
    assert!(last_row.iter().all(|&b| b == 0xFF));
}

#[tokio::test]
async fn test_copies_are_repeated_by_the_printer() {
    let single = PrintRequest::new(prep_label(), PhysicalSpec::COMPACT_203);
    let triple = single.clone().with_copies(3);

    let one = encode(&single).await;
    let three = encode(&triple).await;
    assert!(three.ends_with(b"PRINT 1,3\r\n"));
    assert_eq!(one.len(), three.len());
    assert_eq!(CommandBuffer::parse(&three).unwrap().copies, 3);
}

#[tokio::test]
async fn test_encoding_is_deterministic() {
    let request = PrintRequest::new(ppds_label(), PhysicalSpec::EXTENDED_203);
    let first = encode(&request).await;
    let second = encode(&request).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_ppds_extended_label() {
    let request = PrintRequest::new(ppds_label(), PhysicalSpec::EXTENDED_203);
    let parsed = CommandBuffer::parse(&encode(&request).await).unwrap();
    assert_eq!(parsed.height_mm, 80.0);
    assert_eq!(parsed.bitmap.width_bytes, 60);
    assert_eq!(parsed.bitmap.height, 639);
}

#[tokio::test]
async fn test_odd_width_pads_rows_with_paper() {
    // 25.4 mm at 203 dpi = 203 dots: 26 bytes per row, 5 padding bits.
    let spec = PhysicalSpec::new(25.4, 30.0, 203);
    let mut label = LabelDescription::new("Rice", "2026-10-18", "2026-10-19");
    label.label_height = Some(LabelHeight::Compact);
    let request = PrintRequest::new(label, spec);
    let parsed = CommandBuffer::parse(&encode(&request).await).unwrap();
    assert_eq!(parsed.bitmap.width_bytes, 26);
    assert_eq!(parsed.bitmap.height, 240);
    for row in parsed.bitmap.data.chunks(26) {
        assert_eq!(row[25] & 0x1F, 0x1F);
    }
}

#[tokio::test]
async fn test_process_returns_base64_of_the_buffer() {
    let request = PrintRequest::new(prep_label(), PhysicalSpec::COMPACT_203).with_copies(2);
    let pipeline = LabelPipeline::default();
    let response = pipeline.process(&request).await.unwrap();
    let buffer = pipeline.encode(&request).await.unwrap();

    assert_eq!(response.label_variant, "prep");
    assert_eq!(response.dimensions.width, 60.0);
    assert_eq!(response.dimensions.height, 40.0);
    assert_eq!(
        STANDARD.decode(&response.command_buffer_base64).unwrap(),
        buffer.into_bytes()
    );
}

#[tokio::test]
async fn test_queue_of_buffers_parses_back() {
    let a = encode(&PrintRequest::new(prep_label(), PhysicalSpec::COMPACT_203)).await;
    let b = encode(&PrintRequest::new(ppds_label(), PhysicalSpec::EXTENDED_203).with_copies(2)).await;
    let mut joined = a.clone();
    joined.extend_from_slice(&b);

    let labels = CommandBuffer::parse_all(&joined).unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[0].height_mm, 40.0);
    assert_eq!(labels[1].height_mm, 80.0);
    assert_eq!(labels[1].copies, 2);
}

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test]
async fn test_ppds_without_storage_info_is_rejected() {
    let mut label = ppds_label();
    label.storage_info = None;
    let request = PrintRequest::new(label, PhysicalSpec::EXTENDED_203);

    let err = LabelPipeline::default().encode(&request).await.unwrap_err();
    assert!(matches!(err, MiseError::Validation(_)));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_ppds_without_business_name_is_rejected() {
    let mut label = ppds_label();
    label.business_name = Some(" ".into());
    let request = PrintRequest::new(label, PhysicalSpec::EXTENDED_203);

    let err = LabelPipeline::default().encode(&request).await.unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}

#[tokio::test]
async fn test_zero_copies_is_rejected() {
    let request = PrintRequest::new(prep_label(), PhysicalSpec::COMPACT_203).with_copies(0);
    let err = LabelPipeline::default().encode(&request).await.unwrap_err();
    assert!(matches!(err, MiseError::Validation(_)));
}

#[tokio::test]
async fn test_expiry_before_printed_date_is_rejected() {
    let label = LabelDescription::new("Soup", "2026-10-18", "2026-10-17");
    let request = PrintRequest::new(label, PhysicalSpec::COMPACT_203);
    let err = LabelPipeline::default().encode(&request).await.unwrap_err();
    assert!(matches!(err, MiseError::Validation(_)));
}

#[tokio::test]
async fn test_invalid_label_size_is_rejected() {
    let request = PrintRequest::new(prep_label(), PhysicalSpec::new(0.0, 40.0, 203));
    let err = LabelPipeline::default().encode(&request).await.unwrap_err();
    assert!(matches!(err, MiseError::Validation(_)));
}

#[tokio::test]
async fn test_label_narrower_than_one_character_is_rejected() {
    let request = PrintRequest::new(prep_label(), PhysicalSpec::new(1.0, 40.0, 203));
    let err = LabelPipeline::default().encode(&request).await.unwrap_err();
    assert!(matches!(err, MiseError::Validation(_)));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_very_short_label_still_prints() {
    // 3 mm is 24 dots: the title is clipped rather than failing the render.
    let request = PrintRequest::new(prep_label(), PhysicalSpec::new(60.0, 3.0, 203));
    let parsed = CommandBuffer::parse(&encode(&request).await).unwrap();
    assert_eq!(parsed.bitmap.height, 24);
    assert!(parsed.bitmap.data.iter().any(|&b| b != 0xFF));
}
