//! # EXIF GPS reader
//!
//! Single-pass JPEG marker scan down to the first `Exif\0\0` APP1 segment
//! that carries a GPS IFD. Only the four tags needed for a position are read.
//! Every offset is bounds-checked; malformed input yields `None`.

use crate::models::LatLng;

const SOI: u16 = 0xFFD8;
const MARKER_SOS: u8 = 0xDA;
const MARKER_APP1: u8 = 0xE1;
const MARKER_TEM: u8 = 0x01;
const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

const TAG_GPS_IFD_POINTER: u16 = 0x8825;
const TAG_GPS_LAT_REF: u16 = 0x0001;
const TAG_GPS_LAT: u16 = 0x0002;
const TAG_GPS_LON_REF: u16 = 0x0003;
const TAG_GPS_LON: u16 = 0x0004;

const TYPE_ASCII: u16 = 2;
const TYPE_RATIONAL: u16 = 5;

/// Returns the GPS position embedded in a JPEG, if any.
pub fn gps_from_jpeg(data: &[u8]) -> Option<LatLng> {
    if data.len() < 4 || be_u16(data, 0)? != SOI {
        log::debug!("exif: not a JPEG by magic bytes");
        return None;
    }

    let len = data.len();
    let mut off = 2;
    while off + 4 <= len {
        if data[off] != 0xFF {
            log::debug!("exif: invalid marker prefix at {off}");
            return None;
        }
        let marker = data[off + 1];
        off += 2;

        // standalone markers carry no length
        if (0xD0..=0xD7).contains(&marker) || marker == MARKER_TEM {
            continue;
        }
        if marker == MARKER_SOS {
            break;
        }

        let size = be_u16(data, off)? as usize;
        if size < 2 {
            return None;
        }
        let seg_start = off + 2;
        let seg_end = off + size;
        if seg_end > len {
            log::debug!("exif: segment beyond EOF at {off}");
            return None;
        }

        if marker == MARKER_APP1 && data[seg_start..seg_end].starts_with(EXIF_HEADER) {
            let tiff = &data[seg_start + EXIF_HEADER.len()..seg_end];
            if let Some(gps) = Tiff::new(tiff).and_then(|t| t.gps()) {
                return Some(gps);
            }
            log::debug!("exif: APP1 without GPS, continuing");
        }
        off = seg_end;
    }
    None
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    let b = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

/// A TIFF structure; offsets inside it are relative to its first byte.
struct Tiff<'a> {
    buf: &'a [u8],
    big_endian: bool,
}

impl<'a> Tiff<'a> {
    fn new(buf: &'a [u8]) -> Option<Self> {
        let big_endian = match buf.get(0..2)? {
            b"MM" => true,
            b"II" => false,
            _ => return None,
        };
        let tiff = Tiff { buf, big_endian };
        if tiff.u16(2)? != 0x002A {
            log::debug!("exif: bad TIFF magic");
            return None;
        }
        Some(tiff)
    }

    fn u16(&self, at: usize) -> Option<u16> {
        let b = self.buf.get(at..at.checked_add(2)?)?;
        let bytes = [b[0], b[1]];
        Some(if self.big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }

    fn u32(&self, at: usize) -> Option<u32> {
        let b = self.buf.get(at..at.checked_add(4)?)?;
        let bytes = [b[0], b[1], b[2], b[3]];
        Some(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    fn rational(&self, at: usize) -> Option<f64> {
        let num = self.u32(at)?;
        let den = self.u32(at + 4)?;
        Some(if den == 0 { 0.0 } else { f64::from(num) / f64::from(den) })
    }

    /// Iterates the 12-byte entries of the IFD at `ifd`.
    fn entries(&self, ifd: usize) -> Option<impl Iterator<Item = usize> + '_> {
        let count = self.u16(ifd)? as usize;
        Some((0..count).map(move |i| ifd + 2 + i * 12))
    }

    fn gps(&self) -> Option<LatLng> {
        let ifd0 = self.u32(4)? as usize;
        let gps_ifd = self
            .entries(ifd0)?
            .find(|&e| self.u16(e) == Some(TAG_GPS_IFD_POINTER))
            .and_then(|e| self.u32(e + 8))
            .filter(|off| *off != 0)? as usize;

        let mut lat_ref = None;
        let mut lon_ref = None;
        let mut lat = None;
        let mut lon = None;

        for e in self.entries(gps_ifd)? {
            let (Some(tag), Some(typ), Some(count)) = (self.u16(e), self.u16(e + 2), self.u32(e + 4)) else {
                break;
            };
            let unit = if typ == TYPE_RATIONAL { 8 } else { 1 };
            let total = count as usize * unit;
            let value_at = if total > 4 {
                match self.u32(e + 8) {
                    Some(off) => off as usize,
                    None => continue,
                }
            } else {
                e + 8
            };

            match (tag, typ) {
                (TAG_GPS_LAT_REF, TYPE_ASCII) => lat_ref = self.buf.get(value_at).copied(),
                (TAG_GPS_LON_REF, TYPE_ASCII) => lon_ref = self.buf.get(value_at).copied(),
                (TAG_GPS_LAT, TYPE_RATIONAL) if count == 3 => lat = self.dms(value_at),
                (TAG_GPS_LON, TYPE_RATIONAL) if count == 3 => lon = self.dms(value_at),
                _ => {}
            }
        }

        let lat = to_decimal(lat?, lat_ref?);
        let lng = to_decimal(lon?, lon_ref?);
        (lat.is_finite() && lng.is_finite()).then_some(LatLng { lat, lng })
    }

    fn dms(&self, at: usize) -> Option<[f64; 3]> {
        Some([self.rational(at)?, self.rational(at + 8)?, self.rational(at + 16)?])
    }
}

/// Degrees/minutes/seconds to signed decimal degrees, rounded to 6 places.
pub fn to_decimal(dms: [f64; 3], reference: u8) -> f64 {
    let mut v = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    if reference == b'S' || reference == b'W' {
        v = -v;
    }
    (v * 1e6).round() / 1e6
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal JPEG: SOI, an Exif APP1 with IFD0 -> GPS IFD, then SOS.
    pub(crate) fn jpeg_with_gps(
        big_endian: bool,
        lat: ([u32; 6], u8),
        lon: ([u32; 6], u8),
    ) -> Vec<u8> {
        let w16 = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let w32 = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };

        let mut tiff = Vec::new();
        tiff.extend_from_slice(if big_endian { b"MM" } else { b"II" });
        tiff.extend_from_slice(&w16(42));
        tiff.extend_from_slice(&w32(8));
        // IFD0: one entry pointing at the GPS IFD at offset 26
        tiff.extend_from_slice(&w16(1));
        tiff.extend_from_slice(&w16(TAG_GPS_IFD_POINTER));
        tiff.extend_from_slice(&w16(4));
        tiff.extend_from_slice(&w32(1));
        tiff.extend_from_slice(&w32(26));
        tiff.extend_from_slice(&w32(0));
        // GPS IFD: four entries, values from offset 80
        tiff.extend_from_slice(&w16(4));
        let ascii = |tiff: &mut Vec<u8>, tag: u16, c: u8| {
            tiff.extend_from_slice(&w16(tag));
            tiff.extend_from_slice(&w16(TYPE_ASCII));
            tiff.extend_from_slice(&w32(2));
            tiff.extend_from_slice(&[c, 0, 0, 0]);
        };
        let rational = |tiff: &mut Vec<u8>, tag: u16, at: u32| {
            tiff.extend_from_slice(&w16(tag));
            tiff.extend_from_slice(&w16(TYPE_RATIONAL));
            tiff.extend_from_slice(&w32(3));
            tiff.extend_from_slice(&w32(at));
        };
        ascii(&mut tiff, TAG_GPS_LAT_REF, lat.1);
        rational(&mut tiff, TAG_GPS_LAT, 80);
        ascii(&mut tiff, TAG_GPS_LON_REF, lon.1);
        rational(&mut tiff, TAG_GPS_LON, 104);
        tiff.extend_from_slice(&w32(0));
        assert_eq!(tiff.len(), 80);
        for v in lat.0.iter().chain(lon.0.iter()) {
            tiff.extend_from_slice(&w32(*v));
        }

        let mut seg = EXIF_HEADER.to_vec();
        seg.extend_from_slice(&tiff);

        let mut jpeg = vec![0xFF, 0xD8];
        // an unrelated APP0 first
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x4A, 0x46]);
        jpeg.extend_from_slice(&[0xFF, MARKER_APP1]);
        jpeg.extend_from_slice(&((seg.len() + 2) as u16).to_be_bytes());
        jpeg.extend_from_slice(&seg);
        jpeg.extend_from_slice(&[0xFF, MARKER_SOS, 0x00, 0x02, 0xFF, 0xD9]);
        jpeg
    }

    /// 39°11'27.96" N, 106°49'3" W
    pub(crate) fn aspen_jpeg(big_endian: bool) -> Vec<u8> {
        jpeg_with_gps(
            big_endian,
            ([39, 1, 11, 1, 2796, 100], b'N'),
            ([106, 1, 49, 1, 3, 1], b'W'),
        )
    }

    #[test]
    fn decodes_little_endian_gps() {
        let gps = gps_from_jpeg(&aspen_jpeg(false)).unwrap();
        assert!((gps.lat - 39.1911).abs() < 1e-6);
        assert!((gps.lng - -106.8175).abs() < 1e-6);
    }

    #[test]
    fn decodes_big_endian_gps() {
        let gps = gps_from_jpeg(&aspen_jpeg(true)).unwrap();
        assert!((gps.lat - 39.1911).abs() < 1e-6);
        assert!((gps.lng - -106.8175).abs() < 1e-6);
    }

    #[test]
    fn southern_hemisphere_is_negative() {
        let jpeg = jpeg_with_gps(false, ([33, 1, 52, 1, 0, 1], b'S'), ([151, 1, 12, 1, 36, 1], b'E'));
        let gps = gps_from_jpeg(&jpeg).unwrap();
        assert!((gps.lat - -33.866667).abs() < 1e-6);
        assert!((gps.lng - 151.21).abs() < 1e-6);
    }

    #[test]
    fn zero_denominator_reads_as_zero() {
        let jpeg = jpeg_with_gps(false, ([39, 1, 30, 0, 0, 0], b'N'), ([106, 1, 0, 1, 0, 1], b'W'));
        let gps = gps_from_jpeg(&jpeg).unwrap();
        assert_eq!(gps.lat, 39.0);
        assert_eq!(gps.lng, -106.0);
    }

    #[test]
    fn rejects_non_jpeg_and_truncated_input() {
        assert_eq!(gps_from_jpeg(b"\x89PNG\r\n\x1a\n"), None);
        assert_eq!(gps_from_jpeg(&[]), None);

        let full = aspen_jpeg(false);
        for cut in [3, 10, 30, 60, 120] {
            assert_eq!(gps_from_jpeg(&full[..cut]), None, "cut at {cut}");
        }
    }

    #[test]
    fn stops_at_start_of_scan() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, MARKER_SOS, 0x00, 0x02];
        jpeg.extend_from_slice(&aspen_jpeg(false)[2..]);
        assert_eq!(gps_from_jpeg(&jpeg), None);
    }
}
