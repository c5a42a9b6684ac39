//! FITS primary-HDU reader/writer.
//!
//! Only the primary data unit is handled: a 2D (or 3D, reduced to its first
//! plane) array of integers or floats plus the header cards. Data is stored
//! big-endian per the FITS standard; BSCALE/BZERO are applied on load so the
//! in-memory image always holds physical values as `f32`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{ArgusError, Result};
use crate::frame::{CardValue, FitsHeader, FitsImage};

/// FITS block size; header and data sections are padded to this.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// One header card is always 80 bytes.
pub const CARD_SIZE: usize = 80;

/// Keywords the writer regenerates from the data; never stored in the header.
const STRUCTURAL_KEYS: [&str; 9] = [
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BSCALE", "BZERO",
];

/// Load a FITS file's primary HDU as a 2D float image.
///
/// 3D cubes are reduced to their first plane. The source file is never
/// mutated.
pub fn load_fits(path: &Path) -> Result<FitsImage> {
    if !path.exists() {
        return Err(ArgusError::InputMissing(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < FITS_BLOCK_SIZE {
        return Err(ArgusError::InvalidFits(format!(
            "file too small for a FITS header: {} bytes",
            mmap.len()
        )));
    }

    let (header, raw, data_offset) = parse_header(&mmap)?;

    let bitpix = raw.bitpix;
    let bytes_per_value = (bitpix.unsigned_abs() / 8) as usize;
    let (height, width) = (raw.naxis2, raw.naxis1);
    let plane_values = height
        .checked_mul(width)
        .ok_or_else(|| ArgusError::InvalidFits("image dimensions overflow".into()))?;
    let plane_bytes = plane_values * bytes_per_value;

    if mmap.len() < data_offset + plane_bytes {
        return Err(ArgusError::InvalidFits(format!(
            "file truncated: expected at least {} data bytes, got {}",
            plane_bytes,
            mmap.len().saturating_sub(data_offset)
        )));
    }

    let bytes = &mmap[data_offset..data_offset + plane_bytes];
    let bscale = raw.bscale as f32;
    let bzero = raw.bzero as f32;

    let mut data = Array2::<f32>::zeros((height, width));
    {
        let slice = data.as_slice_mut().expect("freshly allocated array is contiguous");
        match bitpix {
            8 => {
                for (dst, src) in slice.iter_mut().zip(bytes.iter()) {
                    *dst = bzero + bscale * (*src as f32);
                }
            }
            16 => {
                for (i, dst) in slice.iter_mut().enumerate() {
                    *dst = bzero + bscale * (BigEndian::read_i16(&bytes[i * 2..]) as f32);
                }
            }
            32 => {
                for (i, dst) in slice.iter_mut().enumerate() {
                    *dst = bzero + bscale * (BigEndian::read_i32(&bytes[i * 4..]) as f32);
                }
            }
            -32 => {
                for (i, dst) in slice.iter_mut().enumerate() {
                    *dst = bzero + bscale * BigEndian::read_f32(&bytes[i * 4..]);
                }
            }
            -64 => {
                for (i, dst) in slice.iter_mut().enumerate() {
                    *dst = bzero + bscale * (BigEndian::read_f64(&bytes[i * 8..]) as f32);
                }
            }
            other => {
                return Err(ArgusError::InvalidFits(format!("unsupported BITPIX {other}")));
            }
        }
    }

    Ok(FitsImage::new(data, header))
}

/// Read only the header of a FITS file. Cheap: the data section is never
/// touched.
pub fn read_header(path: &Path) -> Result<FitsHeader> {
    if !path.exists() {
        return Err(ArgusError::InputMissing(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    if mmap.len() < FITS_BLOCK_SIZE {
        return Err(ArgusError::InvalidFits(format!(
            "file too small for a FITS header: {} bytes",
            mmap.len()
        )));
    }
    let (header, _, _) = parse_header(&mmap)?;
    Ok(header)
}

/// Save an image as a primary HDU with BITPIX -32.
///
/// Non-structural header cards are written back in order, followed by COMMENT
/// and HISTORY lines. Callers append a HISTORY line per producing step.
pub fn save_fits(image: &FitsImage, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    let (h, w) = image.data.dim();

    let mut cards: Vec<[u8; CARD_SIZE]> = Vec::new();
    cards.push(format_logical("SIMPLE", true));
    cards.push(format_integer("BITPIX", -32));
    cards.push(format_integer("NAXIS", 2));
    cards.push(format_integer("NAXIS1", w as i64));
    cards.push(format_integer("NAXIS2", h as i64));

    for (key, value) in image.header.cards() {
        if STRUCTURAL_KEYS.contains(&key) {
            continue;
        }
        cards.push(match value {
            CardValue::Logical(v) => format_logical(key, *v),
            CardValue::Integer(v) => format_integer(key, *v),
            CardValue::Real(v) => format_real(key, *v),
            CardValue::Text(v) => format_text(key, v),
        });
    }
    for line in image.header.comments() {
        cards.push(format_freeform("COMMENT", line));
    }
    for line in image.header.history() {
        cards.push(format_freeform("HISTORY", line));
    }
    cards.push(format_freeform("END", ""));

    for card in &cards {
        out.write_all(card)?;
    }
    let header_bytes = cards.len() * CARD_SIZE;
    let header_pad = padded(header_bytes) - header_bytes;
    out.write_all(&vec![b' '; header_pad])?;

    let slice = image
        .data
        .as_slice()
        .map(|s| s.to_vec())
        .unwrap_or_else(|| image.data.iter().copied().collect());
    let mut buf = vec![0u8; slice.len() * 4];
    for (i, v) in slice.iter().enumerate() {
        BigEndian::write_f32(&mut buf[i * 4..], *v);
    }
    out.write_all(&buf)?;
    let data_pad = padded(buf.len()) - buf.len();
    out.write_all(&vec![0u8; data_pad])?;
    out.flush()?;
    Ok(())
}

fn padded(len: usize) -> usize {
    len.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE
}

/// Structural values pulled out of the header during parsing.
struct RawLayout {
    bitpix: i64,
    naxis1: usize,
    naxis2: usize,
    bscale: f64,
    bzero: f64,
}

/// Parse the header blocks. Returns the cleaned header (structural keys
/// stripped), the raw layout, and the byte offset where data begins.
fn parse_header(mmap: &[u8]) -> Result<(FitsHeader, RawLayout, usize)> {
    let mut header = FitsHeader::new();
    let mut bitpix: Option<i64> = None;
    let mut naxis: Option<i64> = None;
    let mut dims: [usize; 3] = [0; 3];
    let mut bscale = 1.0f64;
    let mut bzero = 0.0f64;
    let mut simple_seen = false;

    let mut offset = 0usize;
    let mut end_seen = false;

    'blocks: while offset + FITS_BLOCK_SIZE <= mmap.len() {
        let block = &mmap[offset..offset + FITS_BLOCK_SIZE];
        offset += FITS_BLOCK_SIZE;

        for card in block.chunks_exact(CARD_SIZE) {
            let keyword = std::str::from_utf8(&card[0..8])
                .map_err(|_| ArgusError::InvalidFits("non-ASCII header keyword".into()))?
                .trim_end()
                .to_string();

            if keyword == "END" {
                end_seen = true;
                break 'blocks;
            }
            if keyword.is_empty() {
                continue;
            }
            if keyword == "COMMENT" || keyword == "HISTORY" {
                let text = String::from_utf8_lossy(&card[8..]).trim_end().to_string();
                if keyword == "COMMENT" {
                    header.push_comment(text);
                } else {
                    header.push_history(text);
                }
                continue;
            }
            if &card[8..10] != b"= " {
                // Commentary card without a value indicator; not structural.
                continue;
            }

            let value = parse_value(&card[10..])?;
            match keyword.as_str() {
                "SIMPLE" => simple_seen = matches!(value, CardValue::Logical(true)),
                "BITPIX" => bitpix = value.as_i64(),
                "NAXIS" => naxis = value.as_i64(),
                "NAXIS1" => dims[0] = value.as_i64().unwrap_or(0) as usize,
                "NAXIS2" => dims[1] = value.as_i64().unwrap_or(0) as usize,
                "NAXIS3" => dims[2] = value.as_i64().unwrap_or(0) as usize,
                "BSCALE" => bscale = value.as_f64().unwrap_or(1.0),
                "BZERO" => bzero = value.as_f64().unwrap_or(0.0),
                "EXTEND" => {}
                _ => header.set(&keyword, value),
            }
        }
    }

    if !end_seen {
        return Err(ArgusError::InvalidFits("header END card not found".into()));
    }
    if !simple_seen {
        return Err(ArgusError::InvalidFits("missing SIMPLE = T".into()));
    }
    let bitpix = bitpix.ok_or_else(|| ArgusError::InvalidFits("missing BITPIX".into()))?;
    let naxis = naxis.ok_or_else(|| ArgusError::InvalidFits("missing NAXIS".into()))?;

    let (naxis1, naxis2) = match naxis {
        2 => (dims[0], dims[1]),
        // 3D cube: callers get the first plane, which starts at the data
        // offset regardless of NAXIS3.
        3 => (dims[0], dims[1]),
        other => {
            return Err(ArgusError::InvalidFits(format!(
                "unsupported NAXIS {other}; expected a 2D image or 3D cube"
            )));
        }
    };
    if naxis1 == 0 || naxis2 == 0 {
        return Err(ArgusError::InvalidFits("zero-sized image axis".into()));
    }

    Ok((
        header,
        RawLayout {
            bitpix,
            naxis1,
            naxis2,
            bscale,
            bzero,
        },
        offset,
    ))
}

/// Parse the value field of a card (bytes 10..80).
fn parse_value(field: &[u8]) -> Result<CardValue> {
    let text = String::from_utf8_lossy(field);
    let trimmed = text.trim_start();

    if let Some(rest) = trimmed.strip_prefix('\'') {
        // String value: ends at the first single quote not doubled.
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    value.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        return Ok(CardValue::Text(value.trim_end().to_string()));
    }

    // Strip the inline comment, then take the first token.
    let bare = trimmed.split('/').next().unwrap_or("").trim();
    if bare.is_empty() {
        return Ok(CardValue::Text(String::new()));
    }
    match bare {
        "T" => return Ok(CardValue::Logical(true)),
        "F" => return Ok(CardValue::Logical(false)),
        _ => {}
    }
    if let Ok(v) = bare.parse::<i64>() {
        return Ok(CardValue::Integer(v));
    }
    // FITS real values may use D exponents.
    let normalized = bare.replace(['D', 'd'], "E");
    normalized
        .parse::<f64>()
        .map(CardValue::Real)
        .map_err(|_| ArgusError::InvalidFits(format!("unparseable header value: {bare}")))
}

fn blank_card() -> [u8; CARD_SIZE] {
    [b' '; CARD_SIZE]
}

fn put_keyword(card: &mut [u8; CARD_SIZE], keyword: &str) {
    let bytes = keyword.as_bytes();
    let n = bytes.len().min(8);
    card[..n].copy_from_slice(&bytes[..n]);
}

/// Value card: right-justified to end at column 30 when it fits (fixed
/// format), free format from column 11 otherwise.
fn put_fixed_value(card: &mut [u8; CARD_SIZE], value: &str) {
    card[8] = b'=';
    let bytes = value.as_bytes();
    let start = if bytes.len() <= 20 { 30 - bytes.len() } else { 10 };
    let n = bytes.len().min(CARD_SIZE - start);
    card[start..start + n].copy_from_slice(&bytes[..n]);
}

fn format_logical(keyword: &str, value: bool) -> [u8; CARD_SIZE] {
    let mut card = blank_card();
    put_keyword(&mut card, keyword);
    put_fixed_value(&mut card, if value { "T" } else { "F" });
    card
}

fn format_integer(keyword: &str, value: i64) -> [u8; CARD_SIZE] {
    let mut card = blank_card();
    put_keyword(&mut card, keyword);
    put_fixed_value(&mut card, &value.to_string());
    card
}

fn format_real(keyword: &str, value: f64) -> [u8; CARD_SIZE] {
    let mut card = blank_card();
    put_keyword(&mut card, keyword);
    // Round-trippable representation; FITS allows free-format reals.
    let mut text = format!("{value:E}");
    if !text.contains('.') && !text.contains('E') {
        text.push_str(".0");
    }
    put_fixed_value(&mut card, &text);
    card
}

fn format_text(keyword: &str, value: &str) -> [u8; CARD_SIZE] {
    let mut card = blank_card();
    put_keyword(&mut card, keyword);
    card[8] = b'=';
    let escaped = value.replace('\'', "''");
    let quoted = format!("'{escaped:<8}'");
    let bytes = quoted.as_bytes();
    let n = bytes.len().min(CARD_SIZE - 10);
    card[10..10 + n].copy_from_slice(&bytes[..n]);
    card
}

/// COMMENT / HISTORY / END cards: free text from column 9.
fn format_freeform(keyword: &str, text: &str) -> [u8; CARD_SIZE] {
    let mut card = blank_card();
    put_keyword(&mut card, keyword);
    let bytes = text.as_bytes();
    let n = bytes.len().min(CARD_SIZE - 8);
    card[8..8 + n].copy_from_slice(&bytes[..n]);
    card
}
