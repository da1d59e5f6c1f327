//! tag.rs — Tag d'élément de données, y compris le petit format SDE.
//!
//! Un élément = un tag de 8 octets (type + longueur) suivi du payload bourré
//! à la frontière 8 octets. Quand le payload tient sur 4 octets ou moins, le
//! format « Small Data Element » loge la longueur dans les 16 bits hauts du
//! mot de type et le payload dans la seconde moitié du tag lui-même. Toute
//! la logique SDE vit ici, dans les deux sens : les appelants n'en savent rien.

use std::io::{Read, Seek, Write};

use crate::rw::{pad8, ByteReader, ByteWriter};
use crate::types::ElementType;
use crate::{Error, Result};

// Garde-fou anti fichiers malicieux : aucun élément légitime n'approche ça.
const MAX_PAYLOAD: usize = 256 * 1024 * 1024;

/// Tag décodé. `inline` porte le payload quand le tag était au format SDE.
#[derive(Debug)]
pub struct Tag {
    pub code: u16,
    pub len: usize,
    pub inline: Option<Vec<u8>>,
}

/// Payload décodé selon le type d'élément déclaré.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementData {
    /// Types entiers, élargis en `i64`.
    Ints(Vec<i64>),
    /// Types flottants, élargis en `f64`.
    Floats(Vec<f64>),
    /// Octets bruts (payloads UTF-8).
    Bytes(Vec<u8>),
}

impl ElementData {
    pub fn count(&self) -> usize {
        match self {
            ElementData::Ints(v) => v.len(),
            ElementData::Floats(v) => v.len(),
            ElementData::Bytes(v) => v.len(),
        }
    }
}

/// Lit un tag de 8 octets. Les 16 bits hauts du premier mot non nuls
/// signalent le format SDE : la longueur est là, le payload suit dans le tag.
pub fn read_tag<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Tag> {
    let word = r.read_u32()?;
    let sde_len = (word >> 16) as usize;
    if sde_len > 0 {
        if sde_len > 4 {
            return Err(Error::Corrupt(format!(
                "petit élément (SDE) annonçant {sde_len} octets"
            )));
        }
        // Le reste du tag contient payload + bourrage ; le tag fait déjà
        // 8 octets, rien à re-positionner.
        let rest = r.read_bytes(4)?;
        Ok(Tag {
            code: (word & 0xFFFF) as u16,
            len: sde_len,
            inline: Some(rest[..sde_len].to_vec()),
        })
    } else {
        let len = r.read_u32()? as usize;
        Ok(Tag { code: word as u16, len, inline: None })
    }
}

/// Lit tag + payload, vérifie le type contre `expected`, saute le bourrage.
fn read_raw_element<R: Read + Seek>(
    r: &mut ByteReader<R>,
    expected: &[ElementType],
) -> Result<(ElementType, Vec<u8>)> {
    let tag = read_tag(r)?;
    let etype = ElementType::from_code(tag.code)
        .ok_or_else(|| Error::Corrupt(format!("type d'élément inconnu: {}", tag.code)))?;
    if !expected.contains(&etype) {
        let wanted: Vec<&str> = expected.iter().map(|t| t.name()).collect();
        return Err(Error::UnexpectedType {
            got: etype.name().to_owned(),
            expected: wanted.join(" / "),
        });
    }
    let payload = match tag.inline {
        Some(b) => b,
        None => {
            if tag.len > MAX_PAYLOAD {
                return Err(Error::Corrupt(format!("élément de {} octets", tag.len)));
            }
            let b = r.read_bytes(tag.len)?;
            let pad = pad8(tag.len);
            if pad > 0 {
                r.skip(pad as i64)?;
            }
            b
        }
    };
    Ok((etype, payload))
}

/// Lit un élément et décode son payload selon son type *effectif* (qui peut
/// être une promotion étroite du type déclaré, voir [`crate::types::PROMOTED_NUMERIC`]).
pub fn read_element<R: Read + Seek>(
    r: &mut ByteReader<R>,
    expected: &[ElementType],
) -> Result<(ElementType, ElementData)> {
    let (etype, payload) = read_raw_element(r, expected)?;
    let data = decode_payload(r.endian(), etype, &payload)?;
    Ok((etype, data))
}

/// Lit un élément en « mode nom » : le payload est découpé sur les octets
/// nuls, les segments vides sont ignorés.
pub fn read_name_element<R: Read + Seek>(
    r: &mut ByteReader<R>,
    expected: &[ElementType],
) -> Result<Vec<String>> {
    let (_, payload) = read_raw_element(r, expected)?;
    Ok(split_names(&payload))
}

fn split_names(payload: &[u8]) -> Vec<String> {
    payload
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

fn decode_payload(
    endian: crate::rw::Endian,
    etype: ElementType,
    payload: &[u8],
) -> Result<ElementData> {
    let size = etype.scalar_size();
    if size == 0 || payload.len() % size != 0 {
        return Err(Error::Corrupt(format!(
            "payload de {} octets pour un élément {}",
            payload.len(),
            etype.name()
        )));
    }
    if etype == ElementType::Utf8 {
        return Ok(ElementData::Bytes(payload.to_vec()));
    }
    if etype.is_float() {
        let vals = payload
            .chunks_exact(size)
            .map(|c| match etype {
                ElementType::Single => f64::from(endian.get_f32(c)),
                _ => endian.get_f64(c),
            })
            .collect();
        return Ok(ElementData::Floats(vals));
    }
    if etype.is_integer() {
        let mut vals = Vec::with_capacity(payload.len() / size);
        for c in payload.chunks_exact(size) {
            let v = match etype {
                ElementType::Int8 => i64::from(c[0] as i8),
                ElementType::UInt8 => i64::from(c[0]),
                ElementType::Int16 => i64::from(endian.get_i16(c)),
                ElementType::UInt16 => i64::from(endian.get_u16(c)),
                ElementType::Int32 => i64::from(endian.get_i32(c)),
                ElementType::UInt32 => i64::from(endian.get_u32(c)),
                ElementType::Int64 => endian.get_i64(c),
                ElementType::UInt64 => {
                    let u = endian.get_u64(c);
                    i64::try_from(u).map_err(|_| {
                        Error::Corrupt(format!("valeur uint64 hors plage: {u}"))
                    })?
                }
                _ => unreachable!("couvert par is_integer"),
            };
            vals.push(v);
        }
        return Ok(ElementData::Ints(vals));
    }
    Err(Error::Corrupt(format!(
        "élément {} sans payload scalaire",
        etype.name()
    )))
}

/// Écrit un élément complet : SDE si le payload tient sur ≤ 4 octets
/// (bourré à 4), format régulier sinon (tag 8 octets, payload bourré à 8).
pub fn write_element<W: Write>(
    w: &mut ByteWriter<W>,
    etype: ElementType,
    payload: &[u8],
) -> Result<()> {
    let n = payload.len();
    if n <= 4 {
        w.write_u32(((n as u32) << 16) | u32::from(etype.code()))?;
        w.write_all(payload)?;
        w.pad(4 - n)?;
    } else {
        w.write_u32(u32::from(etype.code()))?;
        w.write_u32(n as u32)?;
        w.write_all(payload)?;
        w.pad(pad8(n))?;
    }
    Ok(())
}

/// Écrit l'élément « nom » d'une variable. Au-delà de 31 octets, Matlab
/// tronquerait : on refuse.
pub fn write_name_element<W: Write>(w: &mut ByteWriter<W>, name: &str) -> Result<()> {
    if name.len() > 31 {
        return Err(Error::NameTooLong { name: name.to_owned(), max: 31 });
    }
    write_element(w, ElementType::Int8, name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rw::Endian;
    use std::io::Cursor;

    fn write_to_vec(f: impl FnOnce(&mut ByteWriter<&mut Vec<u8>>)) -> Vec<u8> {
        let mut sink = Vec::new();
        let mut w = ByteWriter::new(&mut sink, Endian::Little);
        f(&mut w);
        sink
    }

    fn reader(bytes: Vec<u8>) -> ByteReader<Cursor<Vec<u8>>> {
        ByteReader::new(Cursor::new(bytes), Endian::Little)
    }

    #[test]
    fn sde_at_four_bytes_regular_at_five() {
        // 4 octets → SDE, tag de 8 octets au total
        let small = write_to_vec(|w| {
            write_element(w, ElementType::Int32, &1i32.to_le_bytes()).unwrap();
        });
        assert_eq!(small.len(), 8);

        // 5 octets → format régulier, bourré à 8 après le payload
        let big = write_to_vec(|w| {
            write_element(w, ElementType::Int8, &[1, 2, 3, 4, 5]).unwrap();
        });
        assert_eq!(big.len(), 8 + 8);
        assert_eq!(&big[13..16], &[0, 0, 0]);
    }

    #[test]
    fn sde_roundtrip() {
        let bytes = write_to_vec(|w| {
            write_element(w, ElementType::UInt8, &[7, 8]).unwrap();
        });
        let mut r = reader(bytes);
        let (etype, data) = read_element(&mut r, &[ElementType::UInt8]).unwrap();
        assert_eq!(etype, ElementType::UInt8);
        assert_eq!(data, ElementData::Ints(vec![7, 8]));
        assert!(r.eof().unwrap());
    }

    #[test]
    fn regular_roundtrip_with_padding() {
        let mut payload = Vec::new();
        for v in [1.0f64, 2.0, 3.0] {
            Endian::Little.put_f64(&mut payload, v);
        }
        let bytes = write_to_vec(|w| {
            write_element(w, ElementType::Double, &payload).unwrap();
        });
        assert_eq!(bytes.len() % 8, 0);
        let mut r = reader(bytes);
        let (_, data) = read_element(&mut r, &[ElementType::Double]).unwrap();
        assert_eq!(data, ElementData::Floats(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn unexpected_type_is_reported() {
        let bytes = write_to_vec(|w| {
            write_element(w, ElementType::Int8, &[1]).unwrap();
        });
        let mut r = reader(bytes);
        let err = read_element(&mut r, &[ElementType::UInt32]).unwrap_err();
        match err {
            Error::UnexpectedType { got, expected } => {
                assert_eq!(got, "miINT8");
                assert!(expected.contains("miUINT32"));
            }
            e => panic!("attendu UnexpectedType, got {e:?}"),
        }
    }

    #[test]
    fn name_mode_splits_on_nul() {
        assert_eq!(split_names(b""), Vec::<String>::new());
        assert_eq!(split_names(b"abc\0\0\0"), vec!["abc".to_string()]);
        assert_eq!(
            split_names(b"ab\0\0cd\0\0"),
            vec!["ab".to_string(), "cd".to_string()]
        );
    }

    #[test]
    fn empty_name_element() {
        let bytes = write_to_vec(|w| {
            write_name_element(w, "").unwrap();
        });
        assert_eq!(bytes.len(), 8); // SDE vide
        let mut r = reader(bytes);
        let names = read_name_element(&mut r, &[ElementType::Int8]).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn name_over_31_bytes_is_refused() {
        let long = "x".repeat(32);
        let err = {
            let mut sink = Vec::new();
            let mut w = ByteWriter::new(&mut sink, Endian::Little);
            write_name_element(&mut w, &long).unwrap_err()
        };
        assert!(matches!(err, Error::NameTooLong { .. }));
    }

    #[test]
    fn sde_length_over_four_is_corrupt() {
        let mut bytes = Vec::new();
        // mot de type avec 5 dans les 16 bits hauts
        Endian::Little.put_u32(&mut bytes, (5 << 16) | 1);
        Endian::Little.put_u32(&mut bytes, 0);
        let mut r = reader(bytes);
        assert!(matches!(read_tag(&mut r), Err(Error::Corrupt(_))));
    }

    #[test]
    fn narrow_promotion_decodes_as_ints() {
        let bytes = write_to_vec(|w| {
            write_element(w, ElementType::Int16, &[1, 0, 2, 0]).unwrap();
        });
        let mut r = reader(bytes);
        let (etype, data) =
            read_element(&mut r, &[ElementType::Double, ElementType::Int16]).unwrap();
        assert_eq!(etype, ElementType::Int16);
        assert_eq!(data, ElementData::Ints(vec![1, 2]));
    }
}
