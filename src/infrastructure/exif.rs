//! Capture-date restoration in embedded image metadata.
//!
//! Supports JPEG (APP1 `Exif` segment) and PNG (`eXIf` chunk). The existing
//! TIFF structure is parsed into IFDs, the date tags are replaced and the
//! block is serialized again. Anything that cannot be parsed is returned
//! unchanged.

use chrono::{DateTime, NaiveDateTime, Utc};
use crc32fast::Hasher;

/// EXIF date layout.
pub const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const TAG_ORIENTATION: u16 = 0x0112;
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_INTEROP_IFD: u16 = 0xA005;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_DATE_TIME_DIGITIZED: u16 = 0x9004;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Deepest IFD nesting followed while parsing.
const MAX_IFD_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, b: &[u8], at: usize) -> Option<u16> {
        let raw: [u8; 2] = b.get(at..at + 2)?.try_into().ok()?;
        Some(match self {
            Self::Little => u16::from_le_bytes(raw),
            Self::Big => u16::from_be_bytes(raw),
        })
    }

    fn u32(self, b: &[u8], at: usize) -> Option<u32> {
        let raw: [u8; 4] = b.get(at..at + 4)?.try_into().ok()?;
        Some(match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        })
    }

    fn put_u16(self, out: &mut Vec<u8>, v: u16) {
        match self {
            Self::Little => out.extend_from_slice(&v.to_le_bytes()),
            Self::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u32(self, out: &mut Vec<u8>, v: u32) {
        match self {
            Self::Little => out.extend_from_slice(&v.to_le_bytes()),
            Self::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn patch_u32(self, out: &mut [u8], at: usize, v: u32) {
        let bytes = match self {
            Self::Little => v.to_le_bytes(),
            Self::Big => v.to_be_bytes(),
        };
        out[at..at + 4].copy_from_slice(&bytes);
    }
}

/// One IFD entry with its value bytes in the file's byte order.
#[derive(Debug, Clone)]
struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

/// Image file directory with nested sub-IFDs keyed by pointer tag.
#[derive(Debug, Clone, Default)]
struct Ifd {
    entries: Vec<Entry>,
    children: Vec<(u16, Ifd)>,
}

impl Ifd {
    fn set_ascii(&mut self, tag: u16, value: &str) {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        let entry = Entry {
            tag,
            kind: TYPE_ASCII,
            count: u32::try_from(data.len()).unwrap_or(u32::MAX),
            data,
        };
        match self.entries.iter_mut().find(|e| e.tag == tag) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    fn child_mut(&mut self, tag: u16) -> &mut Self {
        if let Some(i) = self.children.iter().position(|(t, _)| *t == tag) {
            return &mut self.children[i].1;
        }
        self.children.push((tag, Self::default()));
        let last = self.children.len() - 1;
        &mut self.children[last].1
    }

    fn child(&self, tag: u16) -> Option<&Self> {
        self.children.iter().find(|(t, _)| *t == tag).map(|(_, c)| c)
    }

    fn short(&self, tag: u16, order: ByteOrder) -> Option<u16> {
        let entry = self.entries.iter().find(|e| e.tag == tag && e.kind == TYPE_SHORT)?;
        order.u16(&entry.data, 0)
    }

    fn ascii(&self, tag: u16) -> Option<String> {
        let entry = self.entries.iter().find(|e| e.tag == tag && e.kind == TYPE_ASCII)?;
        let text = entry.data.split(|b| *b == 0).next()?;
        String::from_utf8(text.to_vec()).ok()
    }
}

const fn type_size(kind: u16) -> Option<usize> {
    match kind {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

const fn is_pointer_tag(tag: u16) -> bool {
    matches!(tag, TAG_EXIF_IFD | TAG_GPS_IFD | TAG_INTEROP_IFD)
}

/// Parsed TIFF block; only IFD0 and its sub-IFDs are kept.
#[derive(Debug, Clone)]
struct Tiff {
    order: ByteOrder,
    ifd0: Ifd,
}

impl Tiff {
    fn empty() -> Self {
        Self {
            order: ByteOrder::Big,
            ifd0: Ifd::default(),
        }
    }

    fn parse(b: &[u8]) -> Option<Self> {
        let order = match b.get(0..2)? {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return None,
        };
        if order.u16(b, 2)? != 42 {
            return None;
        }
        let offset = order.u32(b, 4)? as usize;
        let ifd0 = parse_ifd(b, order, offset, 0)?;
        Some(Self { order, ifd0 })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self.order {
            ByteOrder::Little => out.extend_from_slice(b"II"),
            ByteOrder::Big => out.extend_from_slice(b"MM"),
        }
        self.order.put_u16(&mut out, 42);
        self.order.put_u32(&mut out, 8);
        write_ifd(&mut out, &self.ifd0, self.order);
        out
    }

    fn set_capture_date(&mut self, stamp: &str) {
        self.ifd0.set_ascii(TAG_DATE_TIME, stamp);
        let exif = self.ifd0.child_mut(TAG_EXIF_IFD);
        exif.set_ascii(TAG_DATE_TIME_ORIGINAL, stamp);
        exif.set_ascii(TAG_DATE_TIME_DIGITIZED, stamp);
    }

    fn capture_date(&self) -> Option<String> {
        self.ifd0
            .child(TAG_EXIF_IFD)
            .and_then(|exif| exif.ascii(TAG_DATE_TIME_ORIGINAL))
            .or_else(|| self.ifd0.ascii(TAG_DATE_TIME))
    }
}

fn parse_ifd(b: &[u8], order: ByteOrder, offset: usize, depth: usize) -> Option<Ifd> {
    if depth > MAX_IFD_DEPTH {
        return None;
    }
    let count = order.u16(b, offset)? as usize;
    let mut ifd = Ifd::default();

    for i in 0..count {
        let at = offset + 2 + i * 12;
        let tag = order.u16(b, at)?;
        let kind = order.u16(b, at + 2)?;
        let n = order.u32(b, at + 4)?;

        if is_pointer_tag(tag) {
            let child_offset = order.u32(b, at + 8)? as usize;
            if let Some(child) = parse_ifd(b, order, child_offset, depth + 1) {
                ifd.children.push((tag, child));
            }
            continue;
        }

        // Unknown types cannot be sized, so they are dropped.
        let Some(size) = type_size(kind) else {
            continue;
        };
        let len = size.checked_mul(n as usize)?;
        let data = if len <= 4 {
            b.get(at + 8..at + 8 + len)?.to_vec()
        } else {
            let value_offset = order.u32(b, at + 8)? as usize;
            b.get(value_offset..value_offset.checked_add(len)?)?.to_vec()
        };
        ifd.entries.push(Entry {
            tag,
            kind,
            count: n,
            data,
        });
    }

    Some(ifd)
}

/// Appends an IFD (and its children) to `out`, returning its offset.
fn write_ifd(out: &mut Vec<u8>, ifd: &Ifd, order: ByteOrder) -> u32 {
    let start = out.len();

    let mut rows: Vec<(u16, Option<&Entry>)> = ifd
        .entries
        .iter()
        .map(|e| (e.tag, Some(e)))
        .chain(ifd.children.iter().map(|(tag, _)| (*tag, None)))
        .collect();
    rows.sort_by_key(|(tag, _)| *tag);

    order.put_u16(out, u16::try_from(rows.len()).unwrap_or(u16::MAX));
    let table = out.len();
    out.resize(table + rows.len() * 12, 0);
    order.put_u32(out, 0);

    let mut pointer_slots = Vec::new();
    for (i, (tag, entry)) in rows.iter().enumerate() {
        let mut row = Vec::with_capacity(12);
        order.put_u16(&mut row, *tag);
        let slot = table + i * 12 + 8;
        match entry {
            Some(entry) => {
                order.put_u16(&mut row, entry.kind);
                order.put_u32(&mut row, entry.count);
                if entry.data.len() <= 4 {
                    row.extend_from_slice(&entry.data);
                    row.resize(12, 0);
                } else {
                    if out.len() % 2 == 1 {
                        out.push(0);
                    }
                    let value_offset = u32::try_from(out.len()).unwrap_or(u32::MAX);
                    out.extend_from_slice(&entry.data);
                    order.put_u32(&mut row, value_offset);
                }
            }
            None => {
                order.put_u16(&mut row, TYPE_LONG);
                order.put_u32(&mut row, 1);
                order.put_u32(&mut row, 0);
                pointer_slots.push((*tag, slot));
            }
        }
        out[table + i * 12..table + i * 12 + 12].copy_from_slice(&row);
    }

    for (tag, slot) in pointer_slots {
        if let Some(child) = ifd.child(tag) {
            if out.len() % 2 == 1 {
                out.push(0);
            }
            let child_offset = write_ifd(out, child, order);
            order.patch_u32(out, slot, child_offset);
        }
    }

    u32::try_from(start).unwrap_or(u32::MAX)
}

/// Sets the original, digitized and primary capture dates to `when`.
///
/// Returns the input unchanged when the image format is unsupported or its
/// structure cannot be parsed.
#[must_use]
pub fn restore_capture_date(image: &[u8], when: DateTime<Utc>) -> Vec<u8> {
    let stamp = when.format(EXIF_DATE_FORMAT).to_string();

    let rewritten = if image.starts_with(&[0xFF, 0xD8]) {
        rewrite_jpeg(image, &stamp)
    } else if image.starts_with(&PNG_SIGNATURE) {
        rewrite_png(image, &stamp)
    } else {
        None
    };

    rewritten.unwrap_or_else(|| {
        tracing::debug!("Unsupported image structure, timestamp left untouched");
        image.to_vec()
    })
}

/// The TIFF block embedded in a JPEG or PNG, if any.
fn embedded_tiff(image: &[u8]) -> Option<Tiff> {
    if image.starts_with(&[0xFF, 0xD8]) {
        let segments = jpeg_segments(image)?;
        let seg = segments.iter().find(|s| s.is_exif(image))?;
        Tiff::parse(&image[seg.payload.start + EXIF_HEADER.len()..seg.payload.end])
    } else if image.starts_with(&PNG_SIGNATURE) {
        let chunks = png_chunks(image)?;
        let chunk = chunks.iter().find(|c| &c.name == b"eXIf")?;
        Tiff::parse(&chunk.data)
    } else {
        None
    }
}

/// Reads the original capture date back, if present.
#[must_use]
pub fn read_capture_date(image: &[u8]) -> Option<NaiveDateTime> {
    let stamp = embedded_tiff(image)?.capture_date()?;
    NaiveDateTime::parse_from_str(&stamp, EXIF_DATE_FORMAT).ok()
}

/// EXIF orientation (1-8), if the image declares one.
#[must_use]
pub fn read_orientation(image: &[u8]) -> Option<u16> {
    let tiff = embedded_tiff(image)?;
    tiff.ifd0
        .short(TAG_ORIENTATION, tiff.order)
        .filter(|o| (1..=8).contains(o))
}

/// Marker segment with the byte range of its payload.
#[derive(Debug)]
struct Segment {
    marker: u8,
    start: usize,
    payload: std::ops::Range<usize>,
}

impl Segment {
    fn is_exif(&self, image: &[u8]) -> bool {
        self.marker == 0xE1 && image[self.payload.clone()].starts_with(EXIF_HEADER)
    }
}

/// Walks marker segments up to start-of-scan.
fn jpeg_segments(image: &[u8]) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut pos = 2;
    loop {
        if *image.get(pos)? != 0xFF {
            return None;
        }
        let marker = *image.get(pos + 1)?;
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0xDA || marker == 0xD9 {
            return Some(segments);
        }
        let len = ByteOrder::Big.u16(image, pos + 2)? as usize;
        if len < 2 || pos + 2 + len > image.len() {
            return None;
        }
        segments.push(Segment {
            marker,
            start: pos,
            payload: pos + 4..pos + 2 + len,
        });
        pos += 2 + len;
    }
}

fn rewrite_jpeg(image: &[u8], stamp: &str) -> Option<Vec<u8>> {
    let segments = jpeg_segments(image)?;
    let existing = segments.iter().find(|s| s.is_exif(image));

    let mut tiff = match existing {
        Some(seg) => Tiff::parse(&image[seg.payload.start + EXIF_HEADER.len()..seg.payload.end])?,
        None => Tiff::empty(),
    };
    tiff.set_capture_date(stamp);

    let mut payload = EXIF_HEADER.to_vec();
    payload.extend_from_slice(&tiff.serialize());
    let seg_len = u16::try_from(payload.len() + 2).ok()?;

    let mut app1 = vec![0xFF, 0xE1];
    ByteOrder::Big.put_u16(&mut app1, seg_len);
    app1.extend_from_slice(&payload);

    let mut out = Vec::with_capacity(image.len() + app1.len());
    match existing {
        Some(seg) => {
            out.extend_from_slice(&image[..seg.start]);
            out.extend_from_slice(&app1);
            out.extend_from_slice(&image[seg.payload.end..]);
        }
        None => {
            // After a leading JFIF APP0 when present, else right after SOI.
            let insert_at = segments
                .first()
                .filter(|s| s.marker == 0xE0)
                .map_or(2, |s| s.payload.end);
            out.extend_from_slice(&image[..insert_at]);
            out.extend_from_slice(&app1);
            out.extend_from_slice(&image[insert_at..]);
        }
    }
    Some(out)
}

#[derive(Debug)]
struct PngChunk {
    name: [u8; 4],
    data: Vec<u8>,
}

impl PngChunk {
    fn crc(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&self.name);
        hasher.update(&self.data);
        hasher.finalize()
    }
}

fn png_chunks(image: &[u8]) -> Option<Vec<PngChunk>> {
    let mut chunks = Vec::new();
    let mut pos = PNG_SIGNATURE.len();
    while pos < image.len() {
        let len = ByteOrder::Big.u32(image, pos)? as usize;
        let name: [u8; 4] = image.get(pos + 4..pos + 8)?.try_into().ok()?;
        let data = image.get(pos + 8..pos + 8 + len)?.to_vec();
        let is_end = &name == b"IEND";
        chunks.push(PngChunk { name, data });
        pos += 12 + len;
        if is_end {
            return Some(chunks);
        }
    }
    None
}

fn rewrite_png(image: &[u8], stamp: &str) -> Option<Vec<u8>> {
    let mut chunks = png_chunks(image)?;

    let existing = chunks.iter().position(|c| &c.name == b"eXIf");
    let mut tiff = match existing {
        Some(i) => Tiff::parse(&chunks[i].data)?,
        None => Tiff::empty(),
    };
    tiff.set_capture_date(stamp);
    let exif = PngChunk {
        name: *b"eXIf",
        data: tiff.serialize(),
    };

    match existing {
        Some(i) => chunks[i] = exif,
        None => {
            // eXIf must precede the image data.
            let at = chunks.iter().position(|c| &c.name == b"IDAT")?;
            chunks.insert(at, exif);
        }
    }

    let mut out = PNG_SIGNATURE.to_vec();
    for chunk in &chunks {
        ByteOrder::Big.put_u32(&mut out, u32::try_from(chunk.data.len()).ok()?);
        out.extend_from_slice(&chunk.name);
        out.extend_from_slice(&chunk.data);
        ByteOrder::Big.put_u32(&mut out, chunk.crc());
    }
    Some(out)
}

/// Writes an orientation tag into a JPEG, keeping any existing EXIF.
#[cfg(test)]
pub(crate) fn with_orientation(image: &[u8], orientation: u16) -> Vec<u8> {
    let segments = jpeg_segments(image).unwrap_or_default();
    let existing = segments.iter().find(|s| s.is_exif(image));
    let mut tiff = existing
        .and_then(|seg| Tiff::parse(&image[seg.payload.start + EXIF_HEADER.len()..seg.payload.end]))
        .unwrap_or_else(Tiff::empty);

    let mut data = Vec::new();
    tiff.order.put_u16(&mut data, orientation);
    tiff.ifd0.entries.retain(|e| e.tag != TAG_ORIENTATION);
    tiff.ifd0.entries.push(Entry {
        tag: TAG_ORIENTATION,
        kind: TYPE_SHORT,
        count: 1,
        data,
    });

    let mut payload = EXIF_HEADER.to_vec();
    payload.extend_from_slice(&tiff.serialize());
    let mut app1 = vec![0xFF, 0xE1];
    ByteOrder::Big.put_u16(&mut app1, u16::try_from(payload.len() + 2).unwrap_or(u16::MAX));
    app1.extend_from_slice(&payload);

    let mut out = image[..2].to_vec();
    out.extend_from_slice(&app1);
    match existing {
        Some(seg) => {
            out.extend_from_slice(&image[2..seg.start]);
            out.extend_from_slice(&image[seg.payload.end..]);
        }
        None => out.extend_from_slice(&image[2..]),
    }
    out
}
