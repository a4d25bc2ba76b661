//! # TSPL Label Encoder
//!
//! Builds the complete command buffer for one label and parses it back.
//!
//! ## Buffer Layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ SIZE 60 mm,40 mm                              │
//! │ GAP 0 mm,0 mm                                 │
//! │ DIRECTION 0,0                                 │  header (ASCII, CRLF)
//! │ REFERENCE 0,0                                 │
//! │ [DENSITY n] [SPEED n]                         │
//! │ CLS                                           │
//! ├───────────────────────────────────────────────┤
//! │ BITMAP 0,0,60,320,0,<19200 raw bytes>         │  image
//! ├───────────────────────────────────────────────┤
//! │ PRINT 1,copies                                │  trailer
//! │ [CUT]                                         │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The bitmap parameters always come from the bitmap being encoded, and the
//! bitmap bytes appear exactly once whatever the copy count.

use tracing::debug;

use super::EncodeError;
use super::commands;
use crate::printer::{PhysicalSpec, pixels_from_mm};
use crate::render::mono::PackedBitmap;

/// How `BITMAP` combines the image with the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BitmapMode {
    #[default]
    Overwrite,
    Or,
    Xor,
}

impl BitmapMode {
    pub fn code(&self) -> u8 {
        match self {
            Self::Overwrite => 0,
            Self::Or => 1,
            Self::Xor => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Overwrite),
            1 => Some(Self::Or),
            2 => Some(Self::Xor),
            _ => None,
        }
    }
}

/// Header and trailer settings that do not come from the label itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub gap_mm: f32,
    pub gap_offset_mm: f32,
    /// 0 = normal, 1 = rotated 180°.
    pub direction: u8,
    /// 0 = normal, 1 = mirrored.
    pub mirror: u8,
    pub reference: (u32, u32),
    /// 0..=15
    pub density: Option<u8>,
    pub speed: Option<u8>,
    pub cut: bool,
    pub bitmap_mode: BitmapMode,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            gap_mm: 0.0,
            gap_offset_mm: 0.0,
            direction: 0,
            mirror: 0,
            reference: (0, 0),
            density: None,
            speed: None,
            cut: false,
            bitmap_mode: BitmapMode::Overwrite,
        }
    }
}

impl EncodeOptions {
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.direction > 1 || self.mirror > 1 {
            return Err(EncodeError::InvalidOption(format!(
                "DIRECTION {},{} (each must be 0 or 1)",
                self.direction, self.mirror
            )));
        }
        if let Some(d) = self.density {
            if d > 15 {
                return Err(EncodeError::InvalidOption(format!(
                    "DENSITY {} (must be 0-15)",
                    d
                )));
            }
        }
        if !(self.gap_mm.is_finite() && self.gap_mm >= 0.0)
            || !(self.gap_offset_mm.is_finite() && self.gap_offset_mm >= 0.0)
        {
            return Err(EncodeError::InvalidOption(format!(
                "GAP {},{} (must be non-negative)",
                self.gap_mm, self.gap_offset_mm
            )));
        }
        Ok(())
    }
}

/// A complete TSPL job, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuffer {
    bytes: Vec<u8>,
}

impl CommandBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parse a single-label buffer, rejecting trailing bytes.
    pub fn parse(bytes: &[u8]) -> Result<ParsedLabel, EncodeError> {
        let mut reader = Reader::new(bytes);
        let label = reader.label()?;
        if !reader.at_end() {
            return Err(reader.malformed("trailing bytes after the label"));
        }
        Ok(label)
    }

    /// Parse a stream of concatenated labels, as sent over the bridge.
    pub fn parse_all(bytes: &[u8]) -> Result<Vec<ParsedLabel>, EncodeError> {
        let mut reader = Reader::new(bytes);
        let mut labels = Vec::new();
        while !reader.at_end() {
            labels.push(reader.label()?);
        }
        Ok(labels)
    }
}

impl AsRef<[u8]> for CommandBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Encode one label.
///
/// Either the whole buffer is produced or an error is returned; nothing is
/// partially written.
pub fn encode(
    spec: &PhysicalSpec,
    bitmap: &PackedBitmap,
    copies: u32,
    options: &EncodeOptions,
) -> Result<CommandBuffer, EncodeError> {
    spec.validate().map_err(EncodeError::InvalidSpec)?;
    options.validate()?;
    if copies == 0 {
        return Err(EncodeError::ZeroCopies);
    }

    let width_bytes = bitmap.width_bytes();
    let height = bitmap.height();
    let expected = width_bytes * height as usize;
    if bitmap.data().len() != expected {
        return Err(EncodeError::BitmapLength {
            expected,
            actual: bitmap.data().len(),
        });
    }

    let label_dots = pixels_from_mm(spec.width_mm, spec.dpi);
    if bitmap.width() > label_dots {
        return Err(EncodeError::BitmapTooWide {
            bitmap: bitmap.width(),
            label: label_dots,
        });
    }

    let mut out = Vec::with_capacity(expected + 160);
    out.extend(commands::size(spec.width_mm, spec.height_mm));
    out.extend(commands::gap(options.gap_mm, options.gap_offset_mm));
    out.extend(commands::direction(options.direction, options.mirror));
    out.extend(commands::reference(options.reference.0, options.reference.1));
    if let Some(d) = options.density {
        out.extend(commands::density(d));
    }
    if let Some(s) = options.speed {
        out.extend(commands::speed(s));
    }
    out.extend(commands::cls());
    out.extend(commands::bitmap(
        0,
        0,
        width_bytes,
        height,
        options.bitmap_mode.code(),
        bitmap.data(),
    ));
    out.extend(commands::print(1, copies));
    if options.cut {
        out.extend(commands::cut());
    }

    debug!(
        width_bytes,
        height,
        copies,
        bytes = out.len(),
        "encoded TSPL label"
    );

    Ok(CommandBuffer { bytes: out })
}

// ============================================================================
// PARSING
// ============================================================================

/// `BITMAP` parameters and data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBitmap {
    pub x: u32,
    pub y: u32,
    pub width_bytes: usize,
    pub height: u32,
    pub mode: BitmapMode,
    pub data: Vec<u8>,
}

/// One label read back from a command buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLabel {
    pub width_mm: f32,
    pub height_mm: f32,
    pub gap_mm: f32,
    pub gap_offset_mm: f32,
    pub direction: u8,
    pub mirror: u8,
    pub reference: (u32, u32),
    pub density: Option<u8>,
    pub speed: Option<u8>,
    pub bitmap: ParsedBitmap,
    pub sets: u32,
    pub copies: u32,
    pub cut: bool,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn malformed(&self, reason: impl Into<String>) -> EncodeError {
        EncodeError::Malformed {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    /// Next CRLF-terminated ASCII line, without the terminator.
    fn line(&mut self) -> Result<&'a str, EncodeError> {
        let rest = self.rest();
        let end = rest
            .windows(2)
            .position(|w| w == commands::CRLF)
            .ok_or_else(|| self.malformed("unterminated command line"))?;
        let text = std::str::from_utf8(&rest[..end])
            .map_err(|_| self.malformed("command line is not ASCII"))?;
        self.pos += end + 2;
        Ok(text)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.rest().starts_with(keyword.as_bytes())
    }

    fn label(&mut self) -> Result<ParsedLabel, EncodeError> {
        let size = self.line()?;
        let (width_mm, height_mm) = mm_pair(self, size, "SIZE ")?;
        let gap = self.line()?;
        let (gap_mm, gap_offset_mm) = mm_pair(self, gap, "GAP ")?;
        let dir = self.line()?;
        let [direction, mirror] = numbers::<u8, 2>(self, dir, "DIRECTION ")?;
        let reference = self.line()?;
        let [rx, ry] = numbers::<u32, 2>(self, reference, "REFERENCE ")?;

        let mut density = None;
        let mut speed = None;
        loop {
            let line = self.line()?;
            if line == "CLS" {
                break;
            } else if line.starts_with("DENSITY ") {
                density = Some(numbers::<u8, 1>(self, line, "DENSITY ")?[0]);
            } else if line.starts_with("SPEED ") {
                speed = Some(numbers::<u8, 1>(self, line, "SPEED ")?[0]);
            } else {
                return Err(self.malformed(format!("unexpected header command '{}'", line)));
            }
        }

        let bitmap = self.bitmap()?;

        let print = self.line()?;
        let [sets, copies] = numbers::<u32, 2>(self, print, "PRINT ")?;
        let mut cut = false;
        if self.peek_keyword("CUT\r\n") {
            self.line()?;
            cut = true;
        }

        Ok(ParsedLabel {
            width_mm,
            height_mm,
            gap_mm,
            gap_offset_mm,
            direction,
            mirror,
            reference: (rx, ry),
            density,
            speed,
            bitmap,
            sets,
            copies,
            cut,
        })
    }

    fn bitmap(&mut self) -> Result<ParsedBitmap, EncodeError> {
        const KEYWORD: &str = "BITMAP ";
        if !self.peek_keyword(KEYWORD) {
            return Err(self.malformed("expected BITMAP"));
        }
        self.pos += KEYWORD.len();

        // Five comma-terminated parameters, then raw data.
        let mut params = [0u64; 5];
        for param in params.iter_mut() {
            let rest = self.rest();
            let comma = rest
                .iter()
                .take(12)
                .position(|&b| b == b',')
                .ok_or_else(|| self.malformed("BITMAP parameter is not comma-terminated"))?;
            *param = std::str::from_utf8(&rest[..comma])
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| self.malformed("BITMAP parameter is not a number"))?;
            self.pos += comma + 1;
        }

        let [x, y, width_bytes, height, mode] = params;
        let mode = u8::try_from(mode)
            .ok()
            .and_then(BitmapMode::from_code)
            .ok_or_else(|| self.malformed(format!("unknown BITMAP mode {}", mode)))?;
        let x = u32::try_from(x).map_err(|_| self.malformed("BITMAP x out of range"))?;
        let y = u32::try_from(y).map_err(|_| self.malformed("BITMAP y out of range"))?;
        let height = u32::try_from(height).map_err(|_| self.malformed("BITMAP height out of range"))?;
        let width_bytes = usize::try_from(width_bytes)
            .map_err(|_| self.malformed("BITMAP width out of range"))?;
        let len = width_bytes
            .checked_mul(height as usize)
            .ok_or_else(|| self.malformed("BITMAP size overflows"))?;
        let available = self.rest().len().saturating_sub(2);
        if available < len {
            return Err(self.malformed(format!(
                "BITMAP declares {} bytes but only {} remain",
                len, available
            )));
        }

        let data = self.rest()[..len].to_vec();
        self.pos += len;
        if !self.rest().starts_with(commands::CRLF) {
            return Err(self.malformed("BITMAP data is not followed by CRLF"));
        }
        self.pos += 2;

        Ok(ParsedBitmap {
            x,
            y,
            width_bytes,
            height,
            mode,
            data,
        })
    }
}

fn strip<'a>(reader: &Reader<'_>, line: &'a str, keyword: &str) -> Result<&'a str, EncodeError> {
    line.strip_prefix(keyword)
        .ok_or_else(|| reader.malformed(format!("expected {}, found '{}'", keyword.trim(), line)))
}

fn mm_pair(reader: &Reader<'_>, line: &str, keyword: &str) -> Result<(f32, f32), EncodeError> {
    let args = strip(reader, line, keyword)?;
    let mut values = args.split(',').map(|part| {
        part.trim()
            .strip_suffix("mm")
            .and_then(|v| v.trim().parse::<f32>().ok())
    });
    match (values.next().flatten(), values.next().flatten(), values.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(reader.malformed(format!("bad millimetre values in '{}'", line))),
    }
}

fn numbers<T: std::str::FromStr + Copy + Default, const N: usize>(
    reader: &Reader<'_>,
    line: &str,
    keyword: &str,
) -> Result<[T; N], EncodeError> {
    let args = strip(reader, line, keyword)?;
    let mut out = [T::default(); N];
    let mut parts = args.split(',');
    for slot in out.iter_mut() {
        *slot = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(|| reader.malformed(format!("bad parameters in '{}'", line)))?;
    }
    if parts.next().is_some() {
        return Err(reader.malformed(format!("too many parameters in '{}'", line)));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn checker() -> PackedBitmap {
        PackedBitmap::from_packed(8, 2, vec![0x55, 0xAA]).unwrap()
    }

    fn tiny_spec() -> PhysicalSpec {
        // 2 mm at 203 DPI is 16 dots.
        PhysicalSpec::new(2.0, 2.0, 203)
    }

    #[test]
    fn test_exact_bytes() {
        let buffer = encode(&tiny_spec(), &checker(), 1, &EncodeOptions::default()).unwrap();
        let mut expected = b"SIZE 2 mm,2 mm\r\nGAP 0 mm,0 mm\r\nDIRECTION 0,0\r\nREFERENCE 0,0\r\nCLS\r\nBITMAP 0,0,1,2,0,".to_vec();
        expected.extend([0x55, 0xAA]);
        expected.extend(b"\r\nPRINT 1,1\r\n");
        assert_eq!(buffer.as_bytes(), expected.as_slice());
    }

    #[test]
    fn test_optional_commands() {
        let options = EncodeOptions {
            gap_mm: 2.0,
            density: Some(8),
            speed: Some(4),
            cut: true,
            ..Default::default()
        };
        let buffer = encode(&tiny_spec(), &checker(), 3, &options).unwrap();
        let text = String::from_utf8_lossy(buffer.as_bytes());
        assert!(text.contains("GAP 2 mm,0 mm\r\n"));
        assert!(text.contains("DENSITY 8\r\nSPEED 4\r\nCLS\r\n"));
        assert!(text.ends_with("PRINT 1,3\r\nCUT\r\n"));
    }

    #[test]
    fn test_copies_do_not_repeat_bitmap() {
        let one = encode(&tiny_spec(), &checker(), 1, &EncodeOptions::default()).unwrap();
        let many = encode(&tiny_spec(), &checker(), 50, &EncodeOptions::default()).unwrap();
        assert_eq!(many.len(), one.len() + 1);
    }

    #[test]
    fn test_rejects_zero_copies() {
        let err = encode(&tiny_spec(), &checker(), 0, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, EncodeError::ZeroCopies));
    }

    #[test]
    fn test_rejects_bitmap_wider_than_label() {
        let wide = PackedBitmap::from_packed(24, 1, vec![0xFF, 0xFF, 0xFF]).unwrap();
        let err = encode(&tiny_spec(), &wide, 1, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, EncodeError::BitmapTooWide { bitmap: 24, label: 16 }));
    }

    #[test]
    fn test_rejects_bad_options() {
        let options = EncodeOptions {
            density: Some(16),
            ..Default::default()
        };
        assert!(encode(&tiny_spec(), &checker(), 1, &options).is_err());
        let options = EncodeOptions {
            direction: 2,
            ..Default::default()
        };
        assert!(encode(&tiny_spec(), &checker(), 1, &options).is_err());
    }

    #[test]
    fn test_parse_round_trip() {
        let options = EncodeOptions {
            density: Some(10),
            cut: true,
            ..Default::default()
        };
        let buffer = encode(&PhysicalSpec::new(62.5, 29.0, 203), &checker(), 4, &options).unwrap();
        let parsed = CommandBuffer::parse(buffer.as_bytes()).unwrap();
        assert_eq!(parsed.width_mm, 62.5);
        assert_eq!(parsed.height_mm, 29.0);
        assert_eq!(parsed.density, Some(10));
        assert_eq!(parsed.speed, None);
        assert_eq!(parsed.bitmap.width_bytes, 1);
        assert_eq!(parsed.bitmap.height, 2);
        assert_eq!(parsed.bitmap.mode, BitmapMode::Overwrite);
        assert_eq!(parsed.bitmap.data, vec![0x55, 0xAA]);
        assert_eq!((parsed.sets, parsed.copies), (1, 4));
        assert!(parsed.cut);
    }

    #[test]
    fn test_bitmap_data_may_contain_crlf() {
        // 0x0D 0x0A inside the image must not end the command.
        let bitmap = PackedBitmap::from_packed(8, 2, vec![0x0D, 0x0A]).unwrap();
        let buffer = encode(&tiny_spec(), &bitmap, 1, &EncodeOptions::default()).unwrap();
        let parsed = CommandBuffer::parse(buffer.as_bytes()).unwrap();
        assert_eq!(parsed.bitmap.data, vec![0x0D, 0x0A]);
    }

    #[test]
    fn test_parse_detects_desync() {
        let buffer = encode(&tiny_spec(), &checker(), 1, &EncodeOptions::default()).unwrap();
        let bytes = buffer.into_bytes();

        // One image byte short.
        let mut short = bytes.clone();
        let at = short.windows(2).position(|w| w == [0x55, 0xAA]).unwrap();
        short.remove(at);
        assert!(CommandBuffer::parse(&short).is_err());

        // Trailing garbage.
        let mut long = bytes.clone();
        long.extend(b"X");
        assert!(CommandBuffer::parse(&long).is_err());
    }

    #[test]
    fn test_parse_all_concatenated() {
        let a = encode(&tiny_spec(), &checker(), 1, &EncodeOptions::default()).unwrap();
        let b = encode(&tiny_spec(), &checker(), 2, &EncodeOptions::default()).unwrap();
        let mut stream = a.into_bytes();
        stream.extend(b.into_bytes());

        let labels = CommandBuffer::parse_all(&stream).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[1].copies, 2);
        assert!(CommandBuffer::parse(&stream).is_err());
    }

    const BITMAP_HEADER: &[u8] =
        b"SIZE 2 mm,2 mm\r\nGAP 0 mm,0 mm\r\nDIRECTION 0,0\r\nREFERENCE 0,0\r\nCLS\r\n";

    #[test]
    fn test_parse_rejects_oversized_bitmap_header() {
        let cases: [&[u8]; 4] = [
            b"BITMAP 0,0,4294967295,4294967297,0,\r\nPRINT 1,1\r\n",
            b"BITMAP 0,0,4294967295,4294967295,0,\r\nPRINT 1,1\r\n",
            b"BITMAP 4294967296,0,1,1,0,\xFF\r\nPRINT 1,1\r\n",
            b"BITMAP 0,4294967296,1,1,0,\xFF\r\nPRINT 1,1\r\n",
        ];
        for tail in cases {
            let mut bytes = BITMAP_HEADER.to_vec();
            bytes.extend_from_slice(tail);
            let err = CommandBuffer::parse(&bytes).unwrap_err();
            assert!(matches!(err, EncodeError::Malformed { .. }), "{:?}", err);
            assert!(CommandBuffer::parse_all(&bytes).is_err());
        }
    }

    #[test]
    fn test_parse_keeps_full_bitmap_offsets() {
        let mut bytes = BITMAP_HEADER.to_vec();
        bytes.extend_from_slice(b"BITMAP 4294967295,7,1,1,0,\x00\r\nPRINT 1,1\r\n");
        let parsed = CommandBuffer::parse(&bytes).unwrap();
        assert_eq!(parsed.bitmap.x, u32::MAX);
        assert_eq!(parsed.bitmap.y, 7);
    }

    #[test]
    fn test_buffer_length_across_sizes() {
        // 130 mm at 203 DPI is 1039 dots.
        let spec = PhysicalSpec::new(130.0, 10.0, 203);
        let widths = (1..=17).chain([1001]);
        for width in widths {
            for height in [1u32, 2, 7, 40] {
                let dims = crate::printer::PixelDimensions::new(width, height);
                let raster = crate::render::PixelRaster::from_raw(
                    width,
                    height,
                    1,
                    vec![0; dims.pixel_count()],
                )
                .unwrap();
                let bitmap = crate::render::mono::to_packed_bitmap(&raster, dims, 128).unwrap();
                let buffer = encode(&spec, &bitmap, 1, &EncodeOptions::default()).unwrap();

                let wb = (width as usize).div_ceil(8);
                let prefix = format!(
                    "SIZE 130 mm,10 mm\r\nGAP 0 mm,0 mm\r\nDIRECTION 0,0\r\nREFERENCE 0,0\r\nCLS\r\nBITMAP 0,0,{},{},0,",
                    wb, height
                );
                let trailer = b"\r\nPRINT 1,1\r\n";
                assert_eq!(buffer.len(), prefix.len() + wb * height as usize + trailer.len());
                assert!(buffer.as_bytes().starts_with(prefix.as_bytes()));
                assert!(buffer.as_bytes().ends_with(trailer));

                let parsed = CommandBuffer::parse(buffer.as_bytes()).unwrap();
                assert_eq!(parsed.bitmap.width_bytes, wb);
                assert_eq!(parsed.bitmap.height, height);
                assert_eq!(parsed.bitmap.data.len(), wb * height as usize);

                // All ink: every data bit is 0 and every padding bit is 1.
                let pad = wb * 8 - width as usize;
                let last = ((1u16 << pad) - 1) as u8;
                for row in parsed.bitmap.data.chunks(wb) {
                    assert!(row[..wb - 1].iter().all(|&b| b == 0x00));
                    assert_eq!(row[wb - 1], last, "width {} height {}", width, height);
                }
            }
        }
    }

    #[test]
    fn test_encode_is_idempotent() {
        let options = EncodeOptions::default();
        let a = encode(&PhysicalSpec::COMPACT_203, &checker(), 2, &options).unwrap();
        let b = encode(&PhysicalSpec::COMPACT_203, &checker(), 2, &options).unwrap();
        assert_eq!(a, b);
    }
}
