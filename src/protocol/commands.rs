//! # TSPL Commands
//!
//! Builders for the individual TSPL commands a label job uses.
//!
//! ## Protocol Overview
//!
//! TSPL is a line-oriented ASCII protocol. Each command is a keyword followed
//! by comma-separated parameters and terminated by `CR LF`:
//!
//! ```text
//! SIZE 60 mm,40 mm\r\n
//! ```
//!
//! The one exception is `BITMAP`, whose raw image bytes follow the last comma
//! directly, with no length prefix beyond the width/height parameters. A
//! printer that reads the wrong number of image bytes interprets the rest of
//! the image as commands, so the parameters must match the data exactly.
//!
//! ## Units
//!
//! `SIZE` and `GAP` take millimetres. Everything positional (`REFERENCE`,
//! `BITMAP` x/y) is in dots.

/// Line terminator for every TSPL command.
pub const CRLF: &[u8] = b"\r\n";

/// Format a millimetre value without trailing zeros: `60`, `62.5`.
pub fn mm(value: f32) -> String {
    format!("{}", value)
}

fn line(text: String) -> Vec<u8> {
    let mut out = text.into_bytes();
    out.extend_from_slice(CRLF);
    out
}

/// # Label Size (SIZE m mm,n mm)
///
/// Width and length of the label stock.
///
/// ## Example
///
/// ```
/// use mise::protocol::commands;
///
/// assert_eq!(commands::size(60.0, 40.0), b"SIZE 60 mm,40 mm\r\n".to_vec());
/// assert_eq!(commands::size(62.5, 29.0), b"SIZE 62.5 mm,29 mm\r\n".to_vec());
/// ```
pub fn size(width_mm: f32, height_mm: f32) -> Vec<u8> {
    line(format!("SIZE {} mm,{} mm", mm(width_mm), mm(height_mm)))
}

/// # Gap (GAP m mm,n mm)
///
/// Distance between labels and the offset of the gap sensor. `GAP 0 mm,0 mm`
/// selects continuous stock.
pub fn gap(gap_mm: f32, offset_mm: f32) -> Vec<u8> {
    line(format!("GAP {} mm,{} mm", mm(gap_mm), mm(offset_mm)))
}

/// # Print Direction (DIRECTION n,m)
///
/// | Parameter | 0 | 1 |
/// |-----------|---|---|
/// | `n` direction | normal | rotated 180° |
/// | `m` mirror | normal | mirrored |
pub fn direction(direction: u8, mirror: u8) -> Vec<u8> {
    line(format!("DIRECTION {},{}", direction, mirror))
}

/// # Reference Point (REFERENCE x,y)
///
/// Origin of the label coordinate system, in dots.
pub fn reference(x: u32, y: u32) -> Vec<u8> {
    line(format!("REFERENCE {},{}", x, y))
}

/// # Print Darkness (DENSITY n)
///
/// 0 (lightest) to 15 (darkest).
pub fn density(level: u8) -> Vec<u8> {
    line(format!("DENSITY {}", level))
}

/// # Print Speed (SPEED n)
///
/// Inches per second. Supported values vary by model.
pub fn speed(ips: u8) -> Vec<u8> {
    line(format!("SPEED {}", ips))
}

/// # Clear Image Buffer (CLS)
///
/// Must come after `SIZE`/`GAP` and before any drawing command.
pub fn cls() -> Vec<u8> {
    line("CLS".to_string())
}

/// # Bitmap (BITMAP x,y,width,height,mode,data)
///
/// ## Parameters
///
/// - `x`, `y`: Top-left corner in dots
/// - `width_bytes`: Bytes per row (`ceil(width_px / 8)`)
/// - `height`: Rows
/// - `mode`: 0 overwrite, 1 OR, 2 XOR
/// - `data`: `width_bytes * height` bytes, MSB = leftmost dot
///
/// In overwrite mode a **0** bit prints a black dot.
///
/// ## Example
///
/// ```
/// use mise::protocol::commands;
///
/// let cmd = commands::bitmap(0, 0, 1, 2, 0, &[0x00, 0xFF]);
/// assert_eq!(cmd, b"BITMAP 0,0,1,2,0,\x00\xFF\r\n".to_vec());
/// ```
pub fn bitmap(x: u32, y: u32, width_bytes: usize, height: u32, mode: u8, data: &[u8]) -> Vec<u8> {
    let mut out = format!("BITMAP {},{},{},{},{},", x, y, width_bytes, height, mode).into_bytes();
    out.reserve(data.len() + CRLF.len());
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
    out
}

/// # Print (PRINT m,n)
///
/// Prints `sets` label sets, each repeated `copies` times. The image buffer
/// is sent once; the printer repeats it.
pub fn print(sets: u32, copies: u32) -> Vec<u8> {
    line(format!("PRINT {},{}", sets, copies))
}

/// # Cut (CUT)
///
/// Cut immediately, on printers with a cutter.
pub fn cut() -> Vec<u8> {
    line("CUT".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mm_formatting() {
        assert_eq!(mm(60.0), "60");
        assert_eq!(mm(62.5), "62.5");
        assert_eq!(mm(0.0), "0");
    }

    #[test]
    fn test_header_commands() {
        assert_eq!(gap(2.0, 0.0), b"GAP 2 mm,0 mm\r\n");
        assert_eq!(direction(1, 0), b"DIRECTION 1,0\r\n");
        assert_eq!(reference(0, 0), b"REFERENCE 0,0\r\n");
        assert_eq!(density(8), b"DENSITY 8\r\n");
        assert_eq!(speed(4), b"SPEED 4\r\n");
        assert_eq!(cls(), b"CLS\r\n");
    }

    #[test]
    fn test_trailer_commands() {
        assert_eq!(print(1, 3), b"PRINT 1,3\r\n");
        assert_eq!(cut(), b"CUT\r\n");
    }

    #[test]
    fn test_bitmap_length() {
        let data = vec![0xAA; 60 * 4];
        let cmd = bitmap(0, 0, 60, 4, 0, &data);
        let header = b"BITMAP 0,0,60,4,0,";
        assert_eq!(cmd.len(), header.len() + data.len() + 2);
        assert!(cmd.starts_with(header));
        assert!(cmd.ends_with(CRLF));
    }
}
