//! Streaming PNG decoder
//!
//! [`PngDecoder`] pulls bytes from any [`embedded_io::Read`] source and hands
//! out one decoded row at a time. Compressed data is inflated incrementally
//! and only the previous and current scanline are kept, so the whole image is
//! never held in memory.
//!
//! ## Supported formats
//!
//! | Color type      | Bit depths    |
//! |-----------------|---------------|
//! | Grayscale       | 1, 2, 4, 8, 16 |
//! | RGB             | 8, 16         |
//! | Indexed         | 1, 2, 4, 8    |
//! | Grayscale+alpha | 8, 16         |
//! | RGBA            | 8, 16         |
//!
//! Alpha (including palette `tRNS`) is composited over white. 16-bit samples
//! keep their high byte. Interlaced images are rejected.
//!
//! ## Example
//!
//! ```
//! use reterminal_e100x::png::PngDecoder;
//!
//! let bytes: &[u8] = b"GIF89a..";
//! assert!(PngDecoder::new(bytes).is_err());
//! ```

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crc32fast::Hasher;
use embedded_graphics_core::pixelcolor::{Rgb888, RgbColor};
use embedded_io::{Error as _, Read, ReadExactError};
use miniz_oxide::inflate::stream::{InflateState, inflate};
use miniz_oxide::{DataFormat, MZError, MZFlush, MZStatus};

use crate::error::{DecodeError, IoError};
use crate::pipeline::RowSource;

/// PNG file signature
pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Largest accepted image edge
pub const MAX_IMAGE_EDGE: u32 = 8192;

const INPUT_BUFFER: usize = 256;

const IHDR: [u8; 4] = *b"IHDR";
const PLTE: [u8; 4] = *b"PLTE";
const TRNS: [u8; 4] = *b"tRNS";
const IDAT: [u8; 4] = *b"IDAT";
const IEND: [u8; 4] = *b"IEND";

/// PNG color type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorType {
    /// Luminance only
    Grayscale,
    /// Red, green, blue
    Rgb,
    /// Palette index
    Indexed,
    /// Luminance and alpha
    GrayscaleAlpha,
    /// Red, green, blue and alpha
    Rgba,
}

impl ColorType {
    fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Grayscale),
            2 => Some(Self::Rgb),
            3 => Some(Self::Indexed),
            4 => Some(Self::GrayscaleAlpha),
            6 => Some(Self::Rgba),
            _ => None,
        }
    }

    /// Samples per pixel
    pub const fn channels(self) -> usize {
        match self {
            Self::Grayscale | Self::Indexed => 1,
            Self::GrayscaleAlpha => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    fn allows_depth(self, depth: u8) -> bool {
        match self {
            Self::Grayscale => matches!(depth, 1 | 2 | 4 | 8 | 16),
            Self::Indexed => matches!(depth, 1 | 2 | 4 | 8),
            Self::Rgb | Self::GrayscaleAlpha | Self::Rgba => matches!(depth, 8 | 16),
        }
    }
}

/// Image header fields
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PngHeader {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bits per sample
    pub bit_depth: u8,
    /// Color type
    pub color_type: ColorType,
}

impl PngHeader {
    fn parse(data: &[u8; 13]) -> Result<Self, DecodeError> {
        let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let bit_depth = data[8];
        let color_type = ColorType::from_byte(data[9]).ok_or(DecodeError::MalformedHeader)?;
        let (compression, filter, interlace) = (data[10], data[11], data[12]);

        if width == 0 || height == 0 || width > 0x7FFF_FFFF || height > 0x7FFF_FFFF {
            return Err(DecodeError::MalformedHeader);
        }
        if !color_type.allows_depth(bit_depth) || compression != 0 || filter != 0 {
            return Err(DecodeError::MalformedHeader);
        }
        match interlace {
            0 => {}
            1 => return Err(DecodeError::Unsupported),
            _ => return Err(DecodeError::MalformedHeader),
        }
        if width > MAX_IMAGE_EDGE || height > MAX_IMAGE_EDGE {
            return Err(DecodeError::Unsupported);
        }
        Ok(Self {
            width,
            height,
            bit_depth,
            color_type,
        })
    }

    fn bits_per_pixel(&self) -> usize {
        self.color_type.channels() * usize::from(self.bit_depth)
    }

    /// Bytes per unfiltered scanline
    pub fn stride(&self) -> usize {
        (self.width as usize * self.bits_per_pixel()).div_ceil(8)
    }

    /// Filter distance in bytes
    fn filter_bpp(&self) -> usize {
        self.bits_per_pixel().div_ceil(8)
    }
}

/// Chunk framing and CRC over a byte source
struct ChunkReader<R> {
    reader: R,
    crc: Hasher,
}

impl<R: Read> ChunkReader<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        self.reader.read_exact(buf).map_err(|e| match e {
            ReadExactError::UnexpectedEof => DecodeError::Truncated,
            ReadExactError::Other(e) => DecodeError::Source(IoError::from_kind(e.kind())),
        })
    }

    fn header(&mut self) -> Result<(u32, [u8; 4]), DecodeError> {
        let mut head = [0u8; 8];
        self.read_exact(&mut head)?;
        let len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        if len > 0x7FFF_FFFF {
            return Err(DecodeError::Corrupt);
        }
        let kind = [head[4], head[5], head[6], head[7]];
        self.crc = Hasher::new();
        self.crc.update(&kind);
        Ok((len, kind))
    }

    fn body(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        self.read_exact(buf)?;
        self.crc.update(buf);
        Ok(())
    }

    fn skip(&mut self, mut len: u32) -> Result<(), DecodeError> {
        let mut scratch = [0u8; 64];
        while len > 0 {
            let take = (len as usize).min(scratch.len());
            self.body(&mut scratch[..take])?;
            len -= take as u32;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), DecodeError> {
        let mut stored = [0u8; 4];
        self.read_exact(&mut stored)?;
        let computed = core::mem::replace(&mut self.crc, Hasher::new()).finalize();
        if u32::from_be_bytes(stored) != computed {
            return Err(DecodeError::ChunkCrc);
        }
        Ok(())
    }
}

/// Pull-based PNG decoder
pub struct PngDecoder<R> {
    chunks: ChunkReader<R>,
    header: PngHeader,
    palette: Vec<Rgb888>,
    inflater: Box<InflateState>,
    input: [u8; INPUT_BUFFER],
    input_start: usize,
    input_end: usize,
    /// Bytes of the current IDAT chunk not yet read
    remaining: u32,
    idat_done: bool,
    stream_done: bool,
    current: Vec<u8>,
    previous: Vec<u8>,
    rows_read: u32,
}

impl<R: Read> PngDecoder<R> {
    /// Read the signature and every chunk up to the first IDAT
    ///
    /// # Errors
    ///
    /// Returns `BadSignature`, `MalformedHeader`, `Unsupported`, `ChunkCrc`,
    /// `Truncated` or `Source` if the stream cannot start a decode.
    pub fn new(reader: R) -> Result<Self, DecodeError> {
        let mut chunks = ChunkReader {
            reader,
            crc: Hasher::new(),
        };

        let mut signature = [0u8; 8];
        chunks.read_exact(&mut signature).map_err(|e| match e {
            DecodeError::Truncated => DecodeError::BadSignature,
            other => other,
        })?;
        if signature != SIGNATURE {
            return Err(DecodeError::BadSignature);
        }

        let (len, kind) = chunks.header()?;
        if kind != IHDR || len != 13 {
            return Err(DecodeError::MalformedHeader);
        }
        let mut data = [0u8; 13];
        chunks.body(&mut data)?;
        chunks.finish()?;
        let header = PngHeader::parse(&data)?;
        log::debug!(
            "png: {}x{} depth {} {:?}",
            header.width,
            header.height,
            header.bit_depth,
            header.color_type
        );

        let mut palette = Vec::new();
        let remaining = loop {
            let (len, kind) = chunks.header()?;
            match kind {
                IDAT => break len,
                PLTE => {
                    if len % 3 != 0 || len == 0 || len > 768 || !palette.is_empty() {
                        return Err(DecodeError::MalformedHeader);
                    }
                    let mut data = [0u8; 768];
                    let data = &mut data[..len as usize];
                    chunks.body(data)?;
                    palette = data
                        .chunks_exact(3)
                        .map(|c| Rgb888::new(c[0], c[1], c[2]))
                        .collect();
                }
                TRNS if header.color_type == ColorType::Indexed && !palette.is_empty() => {
                    if len as usize > palette.len() {
                        return Err(DecodeError::MalformedHeader);
                    }
                    let mut alpha = [0u8; 256];
                    let alpha = &mut alpha[..len as usize];
                    chunks.body(alpha)?;
                    for (entry, &a) in palette.iter_mut().zip(alpha.iter()) {
                        *entry = Rgb888::new(
                            over_white(entry.r(), a),
                            over_white(entry.g(), a),
                            over_white(entry.b(), a),
                        );
                    }
                }
                IEND => return Err(DecodeError::Truncated),
                _ if kind[0] & 0x20 == 0 => return Err(DecodeError::Unsupported),
                _ => chunks.skip(len)?,
            }
            chunks.finish()?;
        };

        if header.color_type == ColorType::Indexed && palette.is_empty() {
            return Err(DecodeError::MalformedHeader);
        }

        let stride = header.stride();
        Ok(Self {
            chunks,
            header,
            palette,
            inflater: InflateState::new_boxed(DataFormat::Zlib),
            input: [0; INPUT_BUFFER],
            input_start: 0,
            input_end: 0,
            remaining,
            idat_done: false,
            stream_done: false,
            current: vec![0; stride + 1],
            previous: vec![0; stride + 1],
            rows_read: 0,
        })
    }

    /// Parsed image header
    pub fn header(&self) -> &PngHeader {
        &self.header
    }

    /// Rows decoded so far
    pub fn rows_read(&self) -> u32 {
        self.rows_read
    }

    /// Refill the input buffer from the IDAT sequence
    fn fill_input(&mut self) -> Result<(), DecodeError> {
        while self.remaining == 0 {
            if self.idat_done {
                return Ok(());
            }
            self.chunks.finish()?;
            let (len, kind) = self.chunks.header()?;
            if kind != IDAT {
                self.idat_done = true;
                return Ok(());
            }
            self.remaining = len;
        }
        let take = (self.remaining as usize).min(INPUT_BUFFER);
        self.chunks.body(&mut self.input[..take])?;
        self.remaining -= take as u32;
        self.input_start = 0;
        self.input_end = take;
        Ok(())
    }

    /// Inflate whatever input is at hand into `output`
    fn inflate_into(&mut self, output: &mut [u8]) -> Result<usize, DecodeError> {
        if self.input_start == self.input_end && !self.idat_done {
            self.fill_input()?;
        }
        let input = &self.input[self.input_start..self.input_end];
        let starved = input.is_empty() && self.idat_done;
        let result = inflate(&mut self.inflater, input, output, MZFlush::None);
        self.input_start += result.bytes_consumed;
        match result.status {
            Ok(MZStatus::StreamEnd) => self.stream_done = true,
            Ok(_) if starved && result.bytes_written == 0 => return Err(DecodeError::Truncated),
            Ok(_) => {}
            Err(MZError::Buf) if starved => return Err(DecodeError::Truncated),
            Err(MZError::Buf) => {}
            Err(_) => return Err(DecodeError::Corrupt),
        }
        Ok(result.bytes_written)
    }

    fn read_scanline(&mut self) -> Result<(), DecodeError> {
        let need = self.current.len();
        let mut filled = 0;
        let mut line = core::mem::take(&mut self.current);
        let outcome = loop {
            if filled == need {
                break Ok(());
            }
            if self.stream_done {
                break Err(DecodeError::Truncated);
            }
            match self.inflate_into(&mut line[filled..]) {
                Ok(written) => filled += written,
                Err(e) => break Err(e),
            }
        };
        self.current = line;
        outcome
    }

    /// Drive the inflater to its end so the zlib checksum is verified,
    /// then close the last IDAT chunk
    fn finish_stream(&mut self) -> Result<(), DecodeError> {
        let mut scratch = [0u8; 32];
        let mut trailing = 0usize;
        while !self.stream_done {
            trailing += self.inflate_into(&mut scratch)?;
        }
        if trailing > 0 {
            log::warn!("png: {} bytes after final scanline ignored", trailing);
        }
        if !self.idat_done {
            self.chunks.skip(self.remaining)?;
            self.remaining = 0;
            self.chunks.finish()?;
        }
        Ok(())
    }

    fn expand(&self, out: &mut [Rgb888]) -> Result<(), DecodeError> {
        let line = &self.previous[1..];
        let depth = self.header.bit_depth;
        let wide = depth == 16;
        let channels = self.header.color_type.channels();
        // High byte of sample `i` for 8 and 16 bit images
        let sample = |i: usize| if wide { line[i * 2] } else { line[i] };

        for (x, pixel) in out.iter_mut().enumerate() {
            *pixel = match self.header.color_type {
                ColorType::Grayscale if depth < 8 => {
                    let max = (1u16 << depth) - 1;
                    let v = (u16::from(packed_sample(line, x, depth)) * 255 / max) as u8;
                    Rgb888::new(v, v, v)
                }
                ColorType::Grayscale => {
                    let v = sample(x);
                    Rgb888::new(v, v, v)
                }
                ColorType::Indexed => {
                    let index = if depth < 8 {
                        packed_sample(line, x, depth)
                    } else {
                        line[x]
                    };
                    *self
                        .palette
                        .get(usize::from(index))
                        .ok_or(DecodeError::Corrupt)?
                }
                ColorType::GrayscaleAlpha => {
                    let v = over_white(sample(x * channels), sample(x * channels + 1));
                    Rgb888::new(v, v, v)
                }
                ColorType::Rgb => Rgb888::new(
                    sample(x * channels),
                    sample(x * channels + 1),
                    sample(x * channels + 2),
                ),
                ColorType::Rgba => {
                    let a = sample(x * channels + 3);
                    Rgb888::new(
                        over_white(sample(x * channels), a),
                        over_white(sample(x * channels + 1), a),
                        over_white(sample(x * channels + 2), a),
                    )
                }
            };
        }
        Ok(())
    }
}

impl<R: Read> RowSource for PngDecoder<R> {
    fn dimensions(&self) -> (u32, u32) {
        (self.header.width, self.header.height)
    }

    fn next_row(&mut self, out: &mut [Rgb888]) -> Result<(), DecodeError> {
        if self.rows_read >= self.header.height {
            return Err(DecodeError::Corrupt);
        }
        if out.len() != self.header.width as usize {
            return Err(DecodeError::ResolutionMismatch {
                width: self.header.width,
                height: self.header.height,
            });
        }

        self.read_scanline()?;
        let filter = self.current[0];
        unfilter(
            filter,
            self.header.filter_bpp(),
            &self.previous[1..],
            &mut self.current[1..],
        )?;
        core::mem::swap(&mut self.current, &mut self.previous);
        self.expand(out)?;
        self.rows_read += 1;

        if self.rows_read == self.header.height {
            self.finish_stream()?;
        }
        Ok(())
    }
}

fn packed_sample(line: &[u8], x: usize, depth: u8) -> u8 {
    let depth = usize::from(depth);
    let bit = x * depth;
    let shift = 8 - depth - bit % 8;
    let mask = ((1u16 << depth) - 1) as u8;
    (line[bit / 8] >> shift) & mask
}

fn over_white(c: u8, a: u8) -> u8 {
    let c = u16::from(c);
    let a = u16::from(a);
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Reverse a scanline filter in place
fn unfilter(filter: u8, bpp: usize, previous: &[u8], line: &mut [u8]) -> Result<(), DecodeError> {
    match filter {
        0 => {}
        1 => {
            for i in bpp..line.len() {
                line[i] = line[i].wrapping_add(line[i - bpp]);
            }
        }
        2 => {
            for (byte, &up) in line.iter_mut().zip(previous) {
                *byte = byte.wrapping_add(up);
            }
        }
        3 => {
            for i in 0..line.len() {
                let left = if i >= bpp { line[i - bpp] } else { 0 };
                let average = (u16::from(left) + u16::from(previous[i])) / 2;
                line[i] = line[i].wrapping_add(average as u8);
            }
        }
        4 => {
            for i in 0..line.len() {
                let (left, upper_left) = if i >= bpp {
                    (line[i - bpp], previous[i - bpp])
                } else {
                    (0, 0)
                };
                line[i] = line[i].wrapping_add(paeth(left, previous[i], upper_left));
            }
        }
        _ => return Err(DecodeError::Corrupt),
    }
    Ok(())
}

/// Assemble a PNG byte stream from raw (filter byte prefixed) scanlines
#[cfg(test)]
pub(crate) fn build_png(
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: u8,
    extra: &[(&[u8; 4], &[u8])],
    scanlines: &[u8],
) -> Vec<u8> {
    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let mut crc = Hasher::new();
        crc.update(kind);
        crc.update(data);
        out.extend_from_slice(&crc.finalize().to_be_bytes());
    }

    let mut out = Vec::from(SIGNATURE);
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[bit_depth, color_type, 0, 0, 0]);
    chunk(&mut out, b"IHDR", &ihdr);
    for (kind, data) in extra {
        chunk(&mut out, kind, data);
    }
    let compressed = miniz_oxide::deflate::compress_to_vec_zlib(scanlines, 6);
    // Split the stream over two IDAT chunks
    let (a, b) = compressed.split_at(compressed.len() / 2);
    chunk(&mut out, b"IDAT", a);
    chunk(&mut out, b"IDAT", b);
    chunk(&mut out, b"IEND", &[]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{ErrorKind, ErrorType};

    const WHITE: Rgb888 = Rgb888::new(255, 255, 255);
    const BLACK: Rgb888 = Rgb888::new(0, 0, 0);

    /// Hands out at most `step` bytes per read
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl ErrorType for Trickle<'_> {
        type Error = ErrorKind;
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let n = buf.len().min(self.step).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Fails after `ok` bytes
    struct Failing<'a> {
        data: &'a [u8],
        ok: usize,
    }

    impl ErrorType for Failing<'_> {
        type Error = ErrorKind;
    }

    impl Read for Failing<'_> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            if self.ok == 0 {
                return Err(ErrorKind::ConnectionReset);
            }
            let n = buf.len().min(self.ok).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            self.ok -= n;
            Ok(n)
        }
    }

    fn decode_all<R: Read>(mut decoder: PngDecoder<R>) -> Result<Vec<Rgb888>, DecodeError> {
        let (w, h) = decoder.dimensions();
        let mut pixels = Vec::new();
        let mut row = vec![BLACK; w as usize];
        for _ in 0..h {
            decoder.next_row(&mut row)?;
            pixels.extend_from_slice(&row);
        }
        Ok(pixels)
    }

    #[test]
    fn test_bad_signature() {
        let bytes: &[u8] = b"\x89PNX\r\n\x1a\n";
        assert_eq!(PngDecoder::new(bytes).err(), Some(DecodeError::BadSignature));
        let short: &[u8] = b"\x89P";
        assert_eq!(PngDecoder::new(short).err(), Some(DecodeError::BadSignature));
    }

    #[test]
    fn test_rgb8_with_trickling_source() {
        let scanlines = [0, 255, 0, 0, 0, 0, 255, 0, 10, 20, 30, 40, 50, 60];
        let png = build_png(2, 2, 8, 2, &[], &scanlines);
        let decoder = PngDecoder::new(Trickle {
            data: &png,
            step: 3,
        })
        .unwrap();
        let pixels = decode_all(decoder).unwrap();
        assert_eq!(
            pixels,
            [
                Rgb888::new(255, 0, 0),
                Rgb888::new(0, 0, 255),
                Rgb888::new(10, 20, 30),
                Rgb888::new(40, 50, 60),
            ]
        );
    }

    #[test]
    fn test_all_filters() {
        // Gray 8-bit, 3 pixels, one row per filter type
        let rows: [[u8; 3]; 5] = [
            [10, 20, 30],
            [40, 50, 60],
            [70, 80, 90],
            [100, 110, 120],
            [130, 140, 150],
        ];
        let mut scanlines = Vec::new();
        let mut prev = [0u8; 3];
        for (filter, row) in rows.iter().enumerate() {
            scanlines.push(filter as u8);
            for i in 0..3 {
                let left = if i > 0 { row[i - 1] } else { 0 };
                let up = prev[i];
                let upper_left = if i > 0 { prev[i - 1] } else { 0 };
                let predictor = match filter {
                    0 => 0,
                    1 => left,
                    2 => up,
                    3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                    _ => paeth(left, up, upper_left),
                };
                scanlines.push(row[i].wrapping_sub(predictor));
            }
            prev = *row;
        }
        let png = build_png(3, 5, 8, 0, &[], &scanlines);
        let pixels = decode_all(PngDecoder::new(png.as_slice()).unwrap()).unwrap();
        let expected: Vec<Rgb888> = rows
            .iter()
            .flatten()
            .map(|&v| Rgb888::new(v, v, v))
            .collect();
        assert_eq!(pixels, expected);
    }

    #[test]
    fn test_indexed_2bit_with_transparency() {
        let plte: &[u8] = &[255, 0, 0, 0, 255, 0, 0, 0, 255];
        let trns: &[u8] = &[255, 0];
        // Indices 0,1,2,1 packed at 2 bits
        let scanlines = [0, 0b0001_1001];
        let png = build_png(4, 1, 2, 3, &[(b"PLTE", plte), (b"tRNS", trns)], &scanlines);
        let pixels = decode_all(PngDecoder::new(png.as_slice()).unwrap()).unwrap();
        // Entry 1 is fully transparent and shows as white
        assert_eq!(
            pixels,
            [Rgb888::new(255, 0, 0), WHITE, Rgb888::new(0, 0, 255), WHITE]
        );
    }

    #[test]
    fn test_indexed_out_of_palette() {
        let plte: &[u8] = &[0, 0, 0];
        let png = build_png(1, 1, 8, 3, &[(b"PLTE", plte)], &[0, 5]);
        let decoder = PngDecoder::new(png.as_slice()).unwrap();
        assert_eq!(decode_all(decoder).err(), Some(DecodeError::Corrupt));
    }

    #[test]
    fn test_gray_1bit_scales() {
        let png = build_png(3, 1, 1, 0, &[], &[0, 0b1010_0000]);
        let pixels = decode_all(PngDecoder::new(png.as_slice()).unwrap()).unwrap();
        assert_eq!(pixels, [WHITE, BLACK, WHITE]);
    }

    #[test]
    fn test_rgba16_composites_over_white() {
        // One opaque black pixel, one transparent black pixel
        let scanlines = [
            0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, // opaque
            0, 0, 0, 0, 0, 0, 0, 0, // transparent
        ];
        let png = build_png(2, 1, 16, 6, &[], &scanlines);
        let pixels = decode_all(PngDecoder::new(png.as_slice()).unwrap()).unwrap();
        assert_eq!(pixels, [BLACK, WHITE]);
    }

    #[test]
    fn test_gray_alpha_half() {
        let png = build_png(1, 1, 8, 4, &[], &[0, 0, 128]);
        let pixels = decode_all(PngDecoder::new(png.as_slice()).unwrap()).unwrap();
        // 255 * 127 / 255 rounded
        assert_eq!(pixels, [Rgb888::new(127, 127, 127)]);
    }

    #[test]
    fn test_interlaced_rejected() {
        let mut png = build_png(1, 1, 8, 0, &[], &[0, 0]);
        // Interlace byte is the last IHDR data byte; patch it and its CRC
        png[28] = 1;
        let crc = crc32fast::hash(&png[12..29]);
        png[29..33].copy_from_slice(&crc.to_be_bytes());
        assert_eq!(PngDecoder::new(png.as_slice()).err(), Some(DecodeError::Unsupported));
    }

    #[test]
    fn test_bad_depth_rejected() {
        let png = build_png(1, 1, 4, 2, &[], &[0, 0]);
        assert_eq!(
            PngDecoder::new(png.as_slice()).err(),
            Some(DecodeError::MalformedHeader)
        );
    }

    #[test]
    fn test_chunk_crc_checked() {
        let mut png = build_png(1, 1, 8, 0, &[], &[0, 0]);
        png[20] ^= 0x01;
        assert_eq!(PngDecoder::new(png.as_slice()).err(), Some(DecodeError::ChunkCrc));
    }

    #[test]
    fn test_unknown_critical_chunk_rejected() {
        let png = build_png(1, 1, 8, 0, &[(b"ABCD", &[1, 2])], &[0, 0]);
        assert_eq!(PngDecoder::new(png.as_slice()).err(), Some(DecodeError::Unsupported));
    }

    #[test]
    fn test_ancillary_chunk_skipped() {
        let png = build_png(1, 1, 8, 0, &[(b"tEXt", b"Title\0frame")], &[0, 77]);
        let pixels = decode_all(PngDecoder::new(png.as_slice()).unwrap()).unwrap();
        assert_eq!(pixels, [Rgb888::new(77, 77, 77)]);
    }

    #[test]
    fn test_truncated_stream() {
        let scanlines: Vec<u8> = (0..4).flat_map(|_| [0u8, 1, 2, 3, 4]).collect();
        let png = build_png(4, 4, 8, 0, &[], &scanlines);
        // Keep the first IDAT chunk, drop the second one and IEND
        let compressed = png.len() - 33 - 36;
        let cut = 33 + 12 + compressed / 2;
        let decoder = PngDecoder::new(&png[..cut]);
        let result = decoder.and_then(decode_all);
        assert_eq!(result.err(), Some(DecodeError::Truncated));
    }

    #[test]
    fn test_bad_filter_type() {
        let png = build_png(1, 1, 8, 0, &[], &[9, 0]);
        let decoder = PngDecoder::new(png.as_slice()).unwrap();
        assert_eq!(decode_all(decoder).err(), Some(DecodeError::Corrupt));
    }

    #[test]
    fn test_source_error_is_mapped() {
        let png = build_png(2, 2, 8, 0, &[], &[0, 1, 2, 0, 3, 4]);
        let decoder = PngDecoder::new(Failing {
            data: &png,
            ok: 40,
        });
        let result = decoder.and_then(decode_all);
        assert_eq!(
            result.err(),
            Some(DecodeError::Source(IoError::Closed))
        );
    }
}
