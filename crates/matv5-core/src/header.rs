//! header.rs — Préambule commun à toute matrice.
//!
//! Trois éléments, toujours dans cet ordre : bloc de drapeaux + classe
//! (`miUINT32[2]`), dimensions (`miINT32[2]`), nom (`miINT8` en mode nom).

use std::io::{Read, Seek, Write};

use crate::rw::{ByteReader, ByteWriter};
use crate::tag::{read_element, read_name_element, write_element, write_name_element, ElementData};
use crate::types::{ElementType, MatrixClass};
use crate::{Error, Result};

/// Préambule décodé d'une matrice.
#[derive(Debug, Clone)]
pub struct MatHeader {
    pub class: MatrixClass,
    pub logical: bool,
    pub global: bool,
    pub complex: bool,
    /// Réservé aux matrices creuses, lu puis ignoré.
    pub nzmax: u32,
    pub rows: usize,
    pub cols: usize,
    pub name: String,
}

pub fn read_header<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<MatHeader> {
    // drapeaux + classe : deux mots uint32
    let (_, data) = read_element(r, &[ElementType::UInt32])?;
    let flags = match data {
        ElementData::Ints(v) if v.len() == 2 => v,
        other => {
            return Err(Error::Corrupt(format!(
                "bloc de drapeaux de {} valeurs",
                other.count()
            )))
        }
    };
    let word = flags[0] as u32;
    let class_code = (word & 0xFF) as u8;
    let class = MatrixClass::from_code(class_code)
        .ok_or_else(|| Error::Corrupt(format!("classe de matrice inconnue: {class_code}")))?;

    // dimensions : exactement deux après normalisation
    let (_, data) = read_element(r, &[ElementType::Int32])?;
    let dims = match data {
        ElementData::Ints(v) => v,
        _ => return Err(Error::Corrupt("dimensions non entières".into())),
    };
    if dims.len() != 2 {
        return Err(Error::Unsupported("matrices de rang différent de 2"));
    }
    if dims[0] < 0 || dims[1] < 0 {
        return Err(Error::Corrupt(format!("dimensions {}x{}", dims[0], dims[1])));
    }

    let names = read_name_element(r, &[ElementType::Int8])?;
    let name = match names.len() {
        0 => String::new(),
        1 => names.into_iter().next().unwrap_or_default(),
        n => return Err(Error::Corrupt(format!("{n} noms pour une seule variable"))),
    };

    Ok(MatHeader {
        class,
        logical: (word >> 9) & 1 == 1,
        global: (word >> 10) & 1 == 1,
        complex: (word >> 11) & 1 == 1,
        nzmax: flags[1] as u32,
        rows: dims[0] as usize,
        cols: dims[1] as usize,
        name,
    })
}

/// Écrit le préambule symétrique : drapeaux tous à zéro, `nzmax` à zéro.
pub fn write_header<W: Write>(
    w: &mut ByteWriter<W>,
    class: MatrixClass,
    rows: usize,
    cols: usize,
    name: &str,
) -> Result<()> {
    let endian = w.endian();

    let mut flags = Vec::with_capacity(8);
    endian.put_u32(&mut flags, u32::from(class.code()));
    endian.put_u32(&mut flags, 0); // nzmax
    write_element(w, ElementType::UInt32, &flags)?;

    let mut dims = Vec::with_capacity(8);
    endian.put_i32(&mut dims, rows as i32);
    endian.put_i32(&mut dims, cols as i32);
    write_element(w, ElementType::Int32, &dims)?;

    write_name_element(w, name)
}
