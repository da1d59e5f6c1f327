//! load.rs — Décodeur : cadrage fichier, décompression, corps de matrices.
//!
//! Descente récursive sur des éléments tagués, imbriqués et bourrés à
//! 8 octets. Un élément `miCOMPRESSED` fourche vers un second lecteur
//! construit sur le tampon zlib gonflé ; le curseur extérieur reste garé à
//! `next_pos` et reprend là quand le sous-flux est épuisé. Toute anomalie
//! interrompt le décodage, aucun résultat partiel n'est renvoyé.

use std::io::{Cursor, Read, Seek};

use flate2::read::ZlibDecoder;

use crate::header::{read_header, MatHeader};
use crate::rw::{ByteReader, Endian};
use crate::tag::{read_element, read_name_element, ElementData};
use crate::types::{ElementType, MatrixClass, PROMOTED_NUMERIC};
use crate::value::{Record, Value};
use crate::{Error, Result};

/// Clé réservée du mode méta : en-tête du fichier.
pub const META_HEADER_KEY: &str = "__header__";
/// Clé réservée du mode méta : noms des variables globales.
pub const META_GLOBALS_KEY: &str = "__globals__";

/// Décode un fichier MAT complet depuis un flux positionnable.
///
/// Renvoie un [`Record`] nom de variable → valeur. Avec `meta`, deux clés
/// réservées s'ajoutent : [`META_HEADER_KEY`] (description, offset
/// sous-système, version, marqueur) et [`META_GLOBALS_KEY`] (noms dont le
/// drapeau global était levé).
pub fn loadmat_from<R: Read + Seek>(src: R, meta: bool) -> Result<Record> {
    let mut r = ByteReader::new(src, Endian::native());

    // Octets 124..128 : mot de version puis marqueur de boutisme. Le
    // marqueur décide du boutisme de tout le fichier ; l'octet de poids
    // fort du mot de version doit valoir 1 (niveau 5).
    r.seek_to(124)?;
    let probe = r.read_bytes(4)?;
    let endian = Endian::from_marker([probe[2], probe[3]])
        .ok_or_else(|| Error::Corrupt("marqueur de boutisme illisible".into()))?;
    let major = match endian {
        Endian::Little => probe[1],
        Endian::Big => probe[0],
    };
    if major != 1 {
        return Err(Error::UnsupportedVersion { major });
    }
    let mut r = ByteReader::new(r.into_inner(), endian);

    let mut out = Record::new();
    let mut globals: Vec<Value> = Vec::new();

    if meta {
        r.seek_to(0)?;
        out.insert(META_HEADER_KEY.to_owned(), Value::Record(read_file_header(&mut r)?));
        out.insert(META_GLOBALS_KEY.to_owned(), Value::List(Vec::new()));
    } else {
        r.seek_to(128)?;
    }

    while !r.eof()? {
        let (hdr, next_pos, inner) = read_var_header(&mut r)?;
        let value = match inner {
            Some(mut ir) => read_var_array(&mut ir, &hdr)?,
            None => read_var_array(&mut r, &hdr)?,
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(name = %hdr.name, class = hdr.class.name(), "variable décodée");
        if out.contains_key(&hdr.name) {
            return Err(Error::DuplicateName(hdr.name));
        }
        if meta && hdr.global {
            globals.push(Value::Str(hdr.name.clone()));
        }
        out.insert(hdr.name, value);
        r.seek_to(next_pos)?;
    }

    if meta {
        // la clé existe déjà : la position dans l'enregistrement est conservée
        out.insert(META_GLOBALS_KEY.to_owned(), Value::List(globals));
    }
    Ok(out)
}

/// Décode un fichier MAT déjà en mémoire.
pub fn loadmat_bytes(bytes: &[u8], meta: bool) -> Result<Record> {
    loadmat_from(Cursor::new(bytes), meta)
}

fn read_file_header<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Record> {
    let desc = r.read_bytes(116)?;
    let subsys = r.read_bytes(8)?;
    let version = r.read_u16()?;
    let marker = r.read_bytes(2)?;

    let mut h = Record::new();
    h.insert(
        "description".to_owned(),
        Value::Str(String::from_utf8_lossy(&desc).trim().to_owned()),
    );
    h.insert(
        "subsystem_offset".to_owned(),
        Value::Str(String::from_utf8_lossy(&subsys).into_owned()),
    );
    h.insert("version".to_owned(), Value::Int(i64::from(version)));
    h.insert(
        "endian_test".to_owned(),
        Value::Str(String::from_utf8_lossy(&marker).into_owned()),
    );
    h.insert(
        "__version__".to_owned(),
        Value::Str(format!("{}.{}", version >> 8, version & 0xFF)),
    );
    Ok(h)
}

/// Lit le tag complet d'une variable (toujours au format régulier à ce
/// niveau) et son préambule.
///
/// Renvoie le préambule, la position du prochain tag dans le flux
/// extérieur, et — pour un élément compressé — un lecteur neuf positionné
/// au début du tampon gonflé, sur lequel le corps doit être lu.
fn read_var_header<R: Read + Seek>(
    r: &mut ByteReader<R>,
) -> Result<(MatHeader, u64, Option<ByteReader<Cursor<Vec<u8>>>>)> {
    let mtpn = r.read_u32()?;
    let num_bytes = u64::from(r.read_u32()?);
    let next_pos = r.pos()? + num_bytes;

    if mtpn == u32::from(ElementType::Compressed.code()) {
        let data = r.read_bytes(num_bytes as usize)?;
        let inflated = inflate_exact(&data)?;
        let mut ir = ByteReader::new(Cursor::new(inflated), r.endian());
        // un seul élément miMATRIX attendu dans le sous-flux
        let inner_type = ir.read_u32()?;
        let _inner_len = ir.read_u32()?;
        if inner_type != u32::from(ElementType::Matrix.code()) {
            return Err(Error::UnexpectedType {
                got: code_name(inner_type),
                expected: "miMATRIX".into(),
            });
        }
        let hdr = read_header(&mut ir)?;
        return Ok((hdr, next_pos, Some(ir)));
    }

    if mtpn != u32::from(ElementType::Matrix.code()) {
        return Err(Error::UnexpectedType {
            got: code_name(mtpn),
            expected: "miMATRIX / miCOMPRESSED".into(),
        });
    }
    let hdr = read_header(r)?;
    Ok((hdr, next_pos, None))
}

/// Gonfle un élément compressé. Le flux zlib doit consommer exactement le
/// payload déclaré : un reliquat est une erreur dure.
fn inflate_exact(data: &[u8]) -> Result<Vec<u8>> {
    let mut dec = ZlibDecoder::new(data);
    let mut out = Vec::new();
    dec.read_to_end(&mut out)
        .map_err(|e| Error::Compression(e.to_string()))?;
    let consumed = dec.total_in();
    if consumed != data.len() as u64 {
        return Err(Error::Compression(format!(
            "{} octets résiduels après le flux zlib",
            data.len() as u64 - consumed
        )));
    }
    Ok(out)
}

fn code_name(code: u32) -> String {
    u16::try_from(code)
        .ok()
        .and_then(ElementType::from_code)
        .map_or_else(|| format!("type {code}"), |t| t.name().to_owned())
}

/// Corps d'une matrice, dispatché sur la classe du préambule.
fn read_var_array<R: Read + Seek>(r: &mut ByteReader<R>, hdr: &MatHeader) -> Result<Value> {
    if let Some(declared) = hdr.class.numeric_element() {
        return read_numeric(r, hdr, declared);
    }
    match hdr.class {
        MatrixClass::Char => read_char(r, hdr),
        MatrixClass::Cell => read_cell(r, hdr),
        MatrixClass::Struct => read_struct(r, hdr),
        MatrixClass::Sparse => Err(Error::Unsupported("matrices creuses")),
        MatrixClass::Function => Err(Error::Unsupported("poignées de fonction")),
        MatrixClass::Opaque => Err(Error::Unsupported("classes opaques")),
        MatrixClass::Object | MatrixClass::ObjectAlt => {
            Err(Error::Unsupported("classes objet"))
        }
        _ => Err(Error::Corrupt(format!("classe {} sans corps", hdr.class.name()))),
    }
}

/// Écrase une liste à un seul élément sur cet élément.
fn squeeze(mut list: Vec<Value>) -> Value {
    if list.len() == 1 {
        list.pop().unwrap_or(Value::List(Vec::new()))
    } else {
        Value::List(list)
    }
}

fn read_numeric<R: Read + Seek>(
    r: &mut ByteReader<R>,
    hdr: &MatHeader,
    declared: ElementType,
) -> Result<Value> {
    if hdr.complex {
        return Err(Error::Unsupported("nombres complexes"));
    }
    // le payload peut arriver dans un type plus étroit que la classe déclarée
    let mut expected = PROMOTED_NUMERIC.to_vec();
    if !expected.contains(&declared) {
        expected.push(declared);
    }
    let (_, data) = read_element(r, &expected)?;
    let values: Vec<Value> = match data {
        ElementData::Ints(v) => v.into_iter().map(Value::Int).collect(),
        ElementData::Floats(v) => v.into_iter().map(Value::Float).collect(),
        ElementData::Bytes(_) => {
            return Err(Error::Corrupt("payload numérique en octets bruts".into()))
        }
    };
    reshape(values, hdr.rows, hdr.cols)
}

/// Réindexe un payload colonne-major en listes ligne-major, puis écrase.
/// Une valeur unique devient un scalaire, quelles que soient les dimensions.
fn reshape(values: Vec<Value>, rows: usize, cols: usize) -> Result<Value> {
    if values.len() == 1 {
        return Ok(values.into_iter().next().unwrap_or(Value::List(Vec::new())));
    }
    if values.len() != rows * cols {
        return Err(Error::Corrupt(format!(
            "{} valeurs pour une matrice {rows}x{cols}",
            values.len()
        )));
    }
    if rows == 1 {
        return Ok(Value::List(values));
    }
    let mut out = Vec::with_capacity(rows);
    for rr in 0..rows {
        let row: Vec<Value> = (0..cols).map(|c| values[c * rows + rr].clone()).collect();
        out.push(Value::List(row));
    }
    Ok(Value::List(out))
}

fn read_char<R: Read + Seek>(r: &mut ByteReader<R>, hdr: &MatHeader) -> Result<Value> {
    let (_, data) = read_element(r, &[ElementType::Utf8])?;
    let bytes = match data {
        ElementData::Bytes(b) => b,
        _ => return Err(Error::Corrupt("payload de caractères non UTF-8".into())),
    };
    if hdr.rows > 1 {
        // réindexe les octets colonne-major, une chaîne par ligne
        if bytes.len() != hdr.rows * hdr.cols {
            return Err(Error::Corrupt(format!(
                "{} octets pour une matrice de caractères {}x{}",
                bytes.len(),
                hdr.rows,
                hdr.cols
            )));
        }
        let mut out = Vec::with_capacity(hdr.rows);
        for rr in 0..hdr.rows {
            let row: Vec<u8> = (0..hdr.cols).map(|c| bytes[c * hdr.rows + rr]).collect();
            let s = String::from_utf8(row)
                .map_err(|_| Error::Corrupt("caractères non UTF-8".into()))?;
            out.push(Value::Str(s));
        }
        Ok(Value::List(out))
    } else {
        let s = String::from_utf8(bytes)
            .map_err(|_| Error::Corrupt("caractères non UTF-8".into()))?;
        Ok(Value::Str(s))
    }
}

fn read_cell<R: Read + Seek>(r: &mut ByteReader<R>, hdr: &MatHeader) -> Result<Value> {
    let mut outer: Vec<Vec<Value>> = Vec::with_capacity(hdr.rows);
    for _ in 0..hdr.rows {
        let mut row = Vec::with_capacity(hdr.cols);
        for _ in 0..hdr.cols {
            let (child_hdr, next_pos, inner) = read_var_header(r)?;
            let v = match inner {
                Some(mut ir) => read_var_array(&mut ir, &child_hdr)?,
                None => read_var_array(r, &child_hdr)?,
            };
            row.push(v);
            r.seek_to(next_pos)?;
        }
        outer.push(row);
    }
    if hdr.rows == 1 {
        return Ok(squeeze(outer.into_iter().next().unwrap_or_default()));
    }
    Ok(squeeze(outer.into_iter().map(Value::List).collect()))
}

fn read_struct<R: Read + Seek>(r: &mut ByteReader<R>, hdr: &MatHeader) -> Result<Value> {
    // pas des noms de champ (les noms eux-mêmes sont terminés par NUL)
    let (_, data) = read_element(r, &[ElementType::Int32])?;
    let stride = match data {
        ElementData::Ints(v) if v.len() == 1 => v[0],
        _ => return Err(Error::Corrupt("pas de nom de champ illisible".into())),
    };
    if !(0..=32).contains(&stride) {
        return Err(Error::Corrupt(format!("pas de nom de champ inattendu: {stride}")));
    }

    let fields = read_name_element(r, &[ElementType::Int8])?;

    // lecture (ligne, colonne, champ), champ le plus interne
    let mut acc: Vec<Vec<Vec<Value>>> = vec![vec![Vec::with_capacity(hdr.cols); hdr.rows]; fields.len()];
    for rr in 0..hdr.rows {
        for _ in 0..hdr.cols {
            for cell in acc.iter_mut() {
                let (child_hdr, next_pos, inner) = read_var_header(r)?;
                let v = match inner {
                    Some(mut ir) => read_var_array(&mut ir, &child_hdr)?,
                    None => read_var_array(r, &child_hdr)?,
                };
                cell[rr].push(v);
                r.seek_to(next_pos)?;
            }
        }
    }

    let mut rec = Record::new();
    for (field, rows_acc) in fields.into_iter().zip(acc) {
        let rows: Vec<Value> = rows_acc.into_iter().map(squeeze).collect();
        rec.insert(field, squeeze(rows));
    }
    Ok(Value::Record(rec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshape_column_major() {
        // payload a,d,b,e,c,f pour [[a,b,c],[d,e,f]]
        let vals: Vec<Value> = [1, 4, 2, 5, 3, 6].iter().map(|&i| Value::Int(i)).collect();
        let v = reshape(vals, 2, 3).unwrap();
        let expected = Value::List(vec![
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            Value::List(vec![Value::Int(4), Value::Int(5), Value::Int(6)]),
        ]);
        assert_eq!(v, expected);
    }

    #[test]
    fn reshape_single_value_is_scalar() {
        let v = reshape(vec![Value::Float(2.5)], 1, 1).unwrap();
        assert_eq!(v, Value::Float(2.5));
    }

    #[test]
    fn reshape_empty() {
        let v = reshape(Vec::new(), 0, 0).unwrap();
        assert_eq!(v, Value::List(Vec::new()));
    }

    #[test]
    fn reshape_count_mismatch_is_corrupt() {
        let vals = vec![Value::Int(1), Value::Int(2)];
        assert!(matches!(reshape(vals, 2, 3), Err(Error::Corrupt(_))));
    }

    #[test]
    fn squeeze_unwraps_singletons() {
        assert_eq!(squeeze(vec![Value::Int(9)]), Value::Int(9));
        assert_eq!(
            squeeze(vec![Value::Int(1), Value::Int(2)]),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(squeeze(Vec::new()), Value::List(Vec::new()));
    }

    #[test]
    fn inflate_rejects_trailing_garbage() {
        let mut data = Vec::new();
        {
            use flate2::write::ZlibEncoder;
            use flate2::Compression;
            use std::io::Write as _;
            let mut enc = ZlibEncoder::new(&mut data, Compression::default());
            enc.write_all(b"payload").unwrap();
            enc.finish().unwrap();
        }
        assert_eq!(inflate_exact(&data).unwrap(), b"payload");
        data.extend_from_slice(&[0xAB, 0xCD]);
        assert!(matches!(inflate_exact(&data), Err(Error::Compression(_))));
    }

    #[test]
    fn bad_marker_is_corrupt() {
        let mut bytes = vec![b' '; 128];
        bytes[124] = 0x00;
        bytes[125] = 0x01;
        bytes[126] = b'X';
        bytes[127] = b'X';
        assert!(matches!(loadmat_bytes(&bytes, false), Err(Error::Corrupt(_))));
    }

    #[test]
    fn wrong_major_version_is_refused() {
        let mut bytes = vec![b' '; 128];
        // petit-boutiste : version 0x0200 → octet de poids fort à l'index 125
        bytes[124] = 0x00;
        bytes[125] = 0x02;
        bytes[126] = b'I';
        bytes[127] = b'M';
        match loadmat_bytes(&bytes, false) {
            Err(Error::UnsupportedVersion { major }) => assert_eq!(major, 2),
            other => panic!("attendu UnsupportedVersion, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_yields_empty_record() {
        let mut bytes = vec![b' '; 128];
        bytes[124] = 0x00;
        bytes[125] = 0x01;
        bytes[126] = b'I';
        bytes[127] = b'M';
        let rec = loadmat_bytes(&bytes, false).unwrap();
        assert!(rec.is_empty());
    }
}
