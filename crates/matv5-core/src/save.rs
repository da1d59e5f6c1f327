//! save.rs — Encodeur : inférence de type, corps de matrices, cadrage.
//!
//! L'inférence classe une valeur arbitraire dans la classe Matlab la plus
//! étroite (échelle de douze règles, première qui colle gagne), calcule les
//! dimensions 2-D, puis chaque writer sérialise son corps dans un tampon
//! mémoire avant d'émettre l'élément `miMATRIX` qui l'enveloppe. Les
//! variables de premier niveau partent toujours compressées ; leurs enfants
//! (cellules, champs de struct) jamais, et toujours anonymes.

use std::io::Write;
use std::mem::discriminant;
use std::time::SystemTime;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::header::write_header;
use crate::rw::{ByteWriter, Endian};
use crate::tag::write_element;
use crate::types::{ElementType, MatrixClass};
use crate::value::{Record, Value};
use crate::{Error, Result};

/// Encode `data` vers `sink` avec le boutisme de la machine hôte.
pub fn savemat_to<W: Write>(sink: W, data: &Record) -> Result<()> {
    savemat_with(sink, data, Endian::native())
}

/// Encode `data` dans un tampon mémoire.
pub fn savemat_bytes(data: &Record) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    savemat_to(&mut out, data)?;
    Ok(out)
}

/// Variante à boutisme explicite, pour l'interopérabilité et les tests de
/// symétrie : un fichier marqué gros-boutiste doit se relire à l'identique.
pub fn savemat_with<W: Write>(sink: W, data: &Record, endian: Endian) -> Result<()> {
    let mut w = ByteWriter::new(sink, endian);
    write_file_header(&mut w)?;
    for (name, value) in data {
        write_compressed_var(&mut w, value, name)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(name = %name, "variable encodée");
    }
    Ok(())
}

fn write_file_header<W: Write>(w: &mut ByteWriter<W>) -> Result<()> {
    let stamp = humantime::format_rfc3339_seconds(SystemTime::now());
    let desc = format!("MATLAB 5.0 MAT-file, created with matv5 on: {stamp}");
    let mut bytes = desc.into_bytes();
    bytes.truncate(116);
    bytes.resize(116, b' ');
    w.write_all(&bytes)?;
    w.write_all(b"        ")?; // offset sous-système, inutilisé
    w.write_u16(0x0100)?;
    let marker = w.endian().marker();
    w.write_all(&marker)?;
    Ok(())
}

/// Sérialise une variable de premier niveau dans un tampon, la déflate,
/// puis émet l'élément `miCOMPRESSED` qui l'enveloppe.
fn write_compressed_var<W: Write>(w: &mut ByteWriter<W>, value: &Value, name: &str) -> Result<()> {
    let mut body = ByteWriter::new(Vec::new(), w.endian());
    write_var(&mut body, value, name, name)?;
    let raw = body.into_inner();

    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).map_err(|e| Error::Compression(e.to_string()))?;
    let deflated = enc.finish().map_err(|e| Error::Compression(e.to_string()))?;

    // Tag régulier, sans bourrage après le payload : l'enchaînement des
    // variables se fait sur next_pos, pas sur l'alignement.
    w.write_u32(u32::from(ElementType::Compressed.code()))?;
    w.write_u32(deflated.len() as u32)?;
    w.write_all(&deflated)?;
    Ok(())
}

/// Émet l'élément `miMATRIX` enveloppant un corps déjà sérialisé (le corps
/// est un multiple de 8, chaque sous-élément ayant été bourré).
fn emit_matrix<W: Write>(w: &mut ByteWriter<W>, body: &[u8]) -> Result<()> {
    w.write_u32(u32::from(ElementType::Matrix.code()))?;
    w.write_u32(body.len() as u32)?;
    w.write_all(body)?;
    Ok(())
}

// ---------- Inférence de type ----------

/// Résultat de l'inférence : classe, type d'élément numérique éventuel,
/// dimensions, et la valeur après pré-écrasement.
struct Guess<'a> {
    class: MatrixClass,
    mtp: Option<ElementType>,
    rows: usize,
    cols: usize,
    v: &'a Value,
}

fn int_class(out_of_i32: bool) -> (MatrixClass, ElementType) {
    if out_of_i32 {
        (MatrixClass::Int64, ElementType::Int64)
    } else {
        (MatrixClass::Int32, ElementType::Int32)
    }
}

fn fits_i32(i: i64) -> bool {
    i64::from(i32::MIN) <= i && i <= i64::from(i32::MAX)
}

/// Longueur d'un champ de struct : 1 pour un scalaire, la longueur pour une
/// liste.
fn field_len(v: &Value) -> usize {
    match v {
        Value::List(l) => l.len(),
        _ => 1,
    }
}

/// Classe une valeur dans la classe Matlab la plus étroite (première règle
/// qui colle gagne), après pré-écrasement d'une liste à un seul élément.
fn guess_header<'a>(value: &'a Value, path: &str) -> Result<Guess<'a>> {
    let v = match value {
        Value::List(l) if l.len() == 1 => &l[0],
        other => other,
    };

    match v {
        // 1. chaîne → tableau de caractères 1×len (0×len si vide)
        Value::Str(s) => {
            let n = s.chars().count();
            Ok(Guess {
                class: MatrixClass::Char,
                mtp: Some(ElementType::Utf8),
                rows: usize::from(n > 0),
                cols: n,
                v,
            })
        }

        // 4./5. scalaires
        Value::Int(i) => {
            let (class, mtp) = int_class(!fits_i32(*i));
            Ok(Guess { class, mtp: Some(mtp), rows: 1, cols: 1, v })
        }
        Value::Float(_) => Ok(Guess {
            class: MatrixClass::Double,
            mtp: Some(ElementType::Double),
            rows: 1,
            cols: 1,
            v,
        }),

        // 3. enregistrement → struct, multi-colonnes si les champs ont tous
        //    le même genre et la même longueur
        Value::Record(r) => {
            let uniform = match r.values().next() {
                Some(first) => {
                    let k0 = discriminant(first);
                    let l0 = field_len(first);
                    r.values().all(|f| discriminant(f) == k0 && field_len(f) == l0)
                }
                None => true,
            };
            let cols = if uniform {
                r.values().next().map_or(1, field_len)
            } else {
                1
            };
            Ok(Guess { class: MatrixClass::Struct, mtp: None, rows: 1, cols, v })
        }

        // 2. liste vide → matrice Int32 0×0
        Value::List(l) if l.is_empty() => Ok(Guess {
            class: MatrixClass::Int32,
            mtp: Some(ElementType::Int32),
            rows: 0,
            cols: 0,
            v,
        }),

        Value::List(l) => guess_list(l, v, path),
    }
}

fn guess_list<'a>(l: &'a [Value], v: &'a Value, path: &str) -> Result<Guess<'a>> {
    let n = l.len();

    // 6. liste 1-D d'entiers
    if l.iter().all(|e| matches!(e, Value::Int(_))) {
        let wide = l.iter().any(|e| matches!(e, Value::Int(i) if !fits_i32(*i)));
        let (class, mtp) = int_class(wide);
        return Ok(Guess { class, mtp: Some(mtp), rows: 1, cols: n, v });
    }

    // 7. liste 1-D de nombres (entiers et flottants mêlés)
    if l.iter().all(Value::is_number) {
        return Ok(Guess {
            class: MatrixClass::Double,
            mtp: Some(ElementType::Double),
            rows: 1,
            cols: n,
            v,
        });
    }

    if l.iter().all(|e| matches!(e, Value::List(_))) {
        let lens: Vec<usize> = l.iter().filter_map(|e| e.as_list().map(|c| c.len())).collect();
        let equal = lens.windows(2).all(|w| w[0] == w[1]);

        // 8. listes de longueurs inégales → cellule 1×N
        if !equal {
            return Ok(Guess { class: MatrixClass::Cell, mtp: None, rows: 1, cols: n, v });
        }

        // 10. liste 2-D : type d'élément commun, sinon cellule
        let cols = lens.first().copied().unwrap_or(0);
        let mut all_int = true;
        let mut all_num = true;
        let mut wide = false;
        for e in l.iter().filter_map(Value::as_list).flatten() {
            match e {
                Value::Int(i) => wide |= !fits_i32(*i),
                Value::Float(_) => all_int = false,
                _ => {
                    all_int = false;
                    all_num = false;
                }
            }
        }
        if all_int {
            let (class, mtp) = int_class(wide);
            return Ok(Guess { class, mtp: Some(mtp), rows: n, cols, v });
        }
        if all_num {
            return Ok(Guess {
                class: MatrixClass::Double,
                mtp: Some(ElementType::Double),
                rows: n,
                cols,
                v,
            });
        }
        return Ok(Guess { class: MatrixClass::Cell, mtp: None, rows: 1, cols: n, v });
    }

    // 9. liste de chaînes → caractères N×L si longueur commune, sinon cellule
    if l.iter().all(|e| matches!(e, Value::Str(_))) {
        let lens: Vec<usize> =
            l.iter().filter_map(|e| e.as_str().map(|s| s.chars().count())).collect();
        if lens.windows(2).all(|w| w[0] == w[1]) {
            return Ok(Guess {
                class: MatrixClass::Char,
                mtp: Some(ElementType::Utf8),
                rows: n,
                cols: lens.first().copied().unwrap_or(0),
                v,
            });
        }
        return Ok(Guess { class: MatrixClass::Cell, mtp: None, rows: 1, cols: n, v });
    }

    // 11. genres mélangés (nombres, chaînes, listes, enregistrements)
    if l.iter().all(|e| {
        matches!(
            e,
            Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::List(_) | Value::Record(_)
        )
    }) {
        return Ok(Guess { class: MatrixClass::Cell, mtp: None, rows: 1, cols: n, v });
    }

    // 12. rien ne colle
    Err(Error::Unrepresentable(format!("{path}: liste non classable")))
}

// ---------- Writers par classe ----------

/// Écrit une variable (de n'importe quelle classe prise en charge) comme un
/// élément `miMATRIX` complet.
fn write_var<W: Write>(w: &mut ByteWriter<W>, value: &Value, name: &str, path: &str) -> Result<()> {
    let g = guess_header(value, path)?;
    match g.class {
        MatrixClass::Char => write_char(w, &g, name, path),
        MatrixClass::Cell => write_cell(w, &g, name, path),
        MatrixClass::Struct => write_struct(w, &g, name, path),
        _ => write_numeric(w, &g, name, path),
    }
}

fn write_numeric<W: Write>(w: &mut ByteWriter<W>, g: &Guess<'_>, name: &str, path: &str) -> Result<()> {
    let endian = w.endian();
    let mut body = ByteWriter::new(Vec::new(), endian);
    write_header(&mut body, g.class, g.rows, g.cols, name)?;

    let mtp = g
        .mtp
        .ok_or_else(|| Error::Unrepresentable(format!("{path}: classe numérique sans type")))?;
    let mut payload = Vec::with_capacity(g.rows * g.cols * mtp.scalar_size());
    match g.v {
        Value::Int(_) | Value::Float(_) => push_scalar(endian, mtp, g.v, &mut payload, path)?,
        Value::List(l) if g.rows <= 1 => {
            for e in l {
                push_scalar(endian, mtp, e, &mut payload, path)?;
            }
        }
        Value::List(l) => {
            // transpose les lignes vers l'ordre colonne-major du format
            for c in 0..g.cols {
                for row in l {
                    let e = row
                        .as_list()
                        .and_then(|r| r.get(c))
                        .ok_or_else(|| Error::Unrepresentable(format!("{path}: ligne trop courte")))?;
                    push_scalar(endian, mtp, e, &mut payload, path)?;
                }
            }
        }
        other => {
            return Err(Error::Unrepresentable(format!(
                "{path}: {} pour une matrice numérique",
                other.kind()
            )))
        }
    }
    write_element(&mut body, mtp, &payload)?;
    emit_matrix(w, &body.into_inner())
}

fn push_scalar(
    endian: Endian,
    mtp: ElementType,
    v: &Value,
    buf: &mut Vec<u8>,
    path: &str,
) -> Result<()> {
    match (mtp, v) {
        (ElementType::Int32, Value::Int(i)) => endian.put_i32(buf, *i as i32),
        (ElementType::Int64, Value::Int(i)) => endian.put_i64(buf, *i),
        (ElementType::Double, Value::Int(i)) => endian.put_f64(buf, *i as f64),
        (ElementType::Double, Value::Float(x)) => endian.put_f64(buf, *x),
        _ => {
            return Err(Error::Unrepresentable(format!(
                "{path}: {} dans une matrice {}",
                v.kind(),
                mtp.name()
            )))
        }
    }
    Ok(())
}

fn write_char<W: Write>(w: &mut ByteWriter<W>, g: &Guess<'_>, name: &str, path: &str) -> Result<()> {
    let mut payload = Vec::new();
    match g.v {
        Value::Str(s) => payload.extend_from_slice(s.as_bytes()),
        Value::List(l) => {
            // N chaînes de L caractères : aplaties colonne-major, caractère
            // par caractère (un caractère peut peser plusieurs octets UTF-8)
            let grid: Vec<Vec<char>> = l
                .iter()
                .map(|e| {
                    e.as_str().map(|s| s.chars().collect()).ok_or_else(|| {
                        Error::Unrepresentable(format!("{path}: {} dans un tableau de chaînes", e.kind()))
                    })
                })
                .collect::<Result<_>>()?;
            let mut chbuf = [0u8; 4];
            for c in 0..g.cols {
                for row in &grid {
                    payload.extend_from_slice(row[c].encode_utf8(&mut chbuf).as_bytes());
                }
            }
        }
        other => {
            return Err(Error::Unrepresentable(format!(
                "{path}: {} pour un tableau de caractères",
                other.kind()
            )))
        }
    }
    let mut body = ByteWriter::new(Vec::new(), w.endian());
    write_header(&mut body, MatrixClass::Char, g.rows, g.cols, name)?;
    write_element(&mut body, ElementType::Utf8, &payload)?;
    emit_matrix(w, &body.into_inner())
}

fn write_cell<W: Write>(w: &mut ByteWriter<W>, g: &Guess<'_>, name: &str, path: &str) -> Result<()> {
    let children = g
        .v
        .as_list()
        .ok_or_else(|| Error::Unrepresentable(format!("{path}: cellule sans liste")))?;
    let mut body = ByteWriter::new(Vec::new(), w.endian());
    write_header(&mut body, MatrixClass::Cell, g.rows, g.cols, name)?;
    for (i, child) in children.iter().enumerate() {
        // enfants anonymes, jamais compressés individuellement
        write_var(&mut body, child, "", &format!("{path}[{i}]"))?;
    }
    emit_matrix(w, &body.into_inner())
}

fn write_struct<W: Write>(w: &mut ByteWriter<W>, g: &Guess<'_>, name: &str, path: &str) -> Result<()> {
    let rec = g
        .v
        .as_record()
        .ok_or_else(|| Error::Unrepresentable(format!("{path}: struct sans enregistrement")))?;
    let mut body = ByteWriter::new(Vec::new(), w.endian());
    write_header(&mut body, MatrixClass::Struct, g.rows, g.cols, name)?;

    // pas des noms de champ : le plus long + terminateur NUL, 32 au plus
    let longest = rec.keys().map(String::len).max().unwrap_or(0);
    let stride = longest + 1;
    if stride > 32 {
        let name = rec
            .keys()
            .max_by_key(|k| k.len())
            .cloned()
            .unwrap_or_default();
        return Err(Error::NameTooLong { name, max: 31 });
    }
    let endian = w.endian();
    let mut stride_payload = Vec::with_capacity(4);
    endian.put_i32(&mut stride_payload, stride as i32);
    write_element(&mut body, ElementType::Int32, &stride_payload)?;

    // chaque nom occupe exactement `stride` octets, bourré de NUL
    let mut names = Vec::with_capacity(rec.len() * stride);
    for k in rec.keys() {
        names.extend_from_slice(k.as_bytes());
        names.resize(names.len() + (stride - k.len()), 0);
    }
    write_element(&mut body, ElementType::Int8, &names)?;

    // enfants dans l'ordre (colonne, champ), champ le plus interne
    for col in 0..g.cols {
        for (k, field) in rec {
            let child: &Value = if g.cols > 1 {
                field.as_list().and_then(|l| l.get(col)).ok_or_else(|| {
                    Error::Unrepresentable(format!("{path}.{k}: champ plus court que le struct"))
                })?
            } else {
                field
            };
            write_var(&mut body, child, "", &format!("{path}.{k}"))?;
        }
    }
    emit_matrix(w, &body.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guess(v: &Value) -> Guess<'_> {
        guess_header(v, "t").unwrap()
    }

    fn list(vals: &[i64]) -> Value {
        Value::List(vals.iter().map(|&i| Value::Int(i)).collect())
    }

    #[test]
    fn strings_become_char_arrays() {
        let v = Value::Str("hello".into());
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Char);
        assert_eq!((g.rows, g.cols), (1, 5));

        let empty = Value::Str(String::new());
        let g = guess(&empty);
        assert_eq!((g.rows, g.cols), (0, 0));
    }

    #[test]
    fn empty_list_is_empty_int32() {
        let v = Value::List(Vec::new());
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Int32);
        assert_eq!((g.rows, g.cols), (0, 0));
    }

    #[test]
    fn scalar_narrowing() {
        assert_eq!(guess(&Value::Int(42)).class, MatrixClass::Int32);
        assert_eq!(guess(&Value::Int(3_000_000_000)).class, MatrixClass::Int64);
        assert_eq!(guess(&Value::Int(-3_000_000_000)).class, MatrixClass::Int64);
        assert_eq!(guess(&Value::Float(1.5)).class, MatrixClass::Double);
    }

    #[test]
    fn one_element_list_is_pre_squeezed() {
        let v = Value::List(vec![Value::Int(7)]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Int32);
        assert_eq!((g.rows, g.cols), (1, 1));
    }

    #[test]
    fn int_list_narrowing() {
        let v = list(&[1, 2, 3]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Int32);
        assert_eq!((g.rows, g.cols), (1, 3));

        let v = list(&[1, 5_000_000_000]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Int64);
    }

    #[test]
    fn mixed_numbers_become_double() {
        let v = Value::List(vec![Value::Int(1), Value::Float(2.5)]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Double);
        assert_eq!((g.rows, g.cols), (1, 2));
    }

    #[test]
    fn ragged_lists_become_cells() {
        let v = Value::List(vec![list(&[1, 2]), list(&[3])]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Cell);
        assert_eq!((g.rows, g.cols), (1, 2));
    }

    #[test]
    fn uniform_strings_become_char_matrix() {
        let v = Value::List(vec![Value::Str("ab".into()), Value::Str("cd".into())]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Char);
        assert_eq!((g.rows, g.cols), (2, 2));
    }

    #[test]
    fn unequal_strings_fall_back_to_cell() {
        let v = Value::List(vec![Value::Str("ab".into()), Value::Str("c".into())]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Cell);
    }

    #[test]
    fn two_d_numeric() {
        let v = Value::List(vec![list(&[1, 2, 3]), list(&[4, 5, 6])]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Int32);
        assert_eq!((g.rows, g.cols), (2, 3));

        let v = Value::List(vec![
            Value::List(vec![Value::Float(1.0), Value::Float(2.0)]),
            Value::List(vec![Value::Int(3), Value::Int(4)]),
        ]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Double);
        assert_eq!((g.rows, g.cols), (2, 2));
    }

    #[test]
    fn two_d_with_non_numeric_children_falls_back_to_cell() {
        let v = Value::List(vec![
            Value::List(vec![Value::Int(1), Value::Str("a".into())]),
            Value::List(vec![Value::Int(2), Value::Str("b".into())]),
        ]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Cell);
        assert_eq!((g.rows, g.cols), (1, 2));
    }

    #[test]
    fn mixed_kinds_become_cell() {
        let v = Value::List(vec![Value::Int(1), Value::Str("two".into()), list(&[3, 4])]);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Cell);
        assert_eq!((g.rows, g.cols), (1, 3));
    }

    #[test]
    fn uniform_record_becomes_multi_column_struct() {
        let mut r = Record::new();
        r.insert("a".into(), list(&[1, 2, 3]));
        r.insert("b".into(), list(&[4, 5, 6]));
        let v = Value::Record(r);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Struct);
        assert_eq!((g.rows, g.cols), (1, 3));
    }

    #[test]
    fn ragged_record_becomes_one_by_one_struct() {
        let mut r = Record::new();
        r.insert("a".into(), list(&[1, 2, 3]));
        r.insert("b".into(), Value::Int(4));
        let v = Value::Record(r);
        let g = guess(&v);
        assert_eq!(g.class, MatrixClass::Struct);
        assert_eq!((g.rows, g.cols), (1, 1));
    }

    #[test]
    fn scalar_record_fields() {
        let mut r = Record::new();
        r.insert("a".into(), Value::Int(1));
        r.insert("b".into(), Value::Int(2));
        let v = Value::Record(r);
        let g = guess(&v);
        assert_eq!((g.rows, g.cols), (1, 1));
    }

    #[test]
    fn struct_field_names_over_stride_are_refused() {
        let mut r = Record::new();
        r.insert("x".repeat(32), Value::Int(1));
        let v = Value::Record(r);
        let mut sink = Vec::new();
        let mut w = ByteWriter::new(&mut sink, Endian::Little);
        let err = write_var(&mut w, &v, "s", "s").unwrap_err();
        assert!(matches!(err, Error::NameTooLong { .. }));
    }

    #[test]
    fn file_header_is_128_bytes() {
        let mut sink = Vec::new();
        {
            let mut w = ByteWriter::new(&mut sink, Endian::Little);
            write_file_header(&mut w).unwrap();
        }
        assert_eq!(sink.len(), 128);
        assert!(sink.starts_with(b"MATLAB 5.0 MAT-file"));
        assert_eq!(&sink[126..128], b"IM");
        // mot de version 0x0100 petit-boutiste
        assert_eq!(&sink[124..126], &[0x00, 0x01]);
    }
}
