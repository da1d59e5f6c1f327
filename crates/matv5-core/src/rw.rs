//! rw.rs — Primitives d'entrée/sortie avec boutisme résolu à l'exécution.
//!
//! Le boutisme d'un fichier MAT se lit une seule fois, sur le marqueur deux
//! octets à l'offset 126 (`IM` = petit-boutiste, `MI` = gros-boutiste). Le
//! drapeau obtenu est ensuite propagé à chaque lecture/écriture primitive :
//! un seul `Endian`, pas de descripteurs de format à la volée.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

/// Boutisme d'un flux MAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Boutisme de la machine hôte.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") { Endian::Big } else { Endian::Little }
    }

    /// Décode le marqueur des octets 126..128 du fichier.
    pub fn from_marker(marker: [u8; 2]) -> Option<Self> {
        match &marker {
            b"IM" => Some(Endian::Little),
            b"MI" => Some(Endian::Big),
            _ => None,
        }
    }

    /// Marqueur à émettre pour ce boutisme.
    pub const fn marker(self) -> [u8; 2] {
        match self {
            Endian::Little => *b"IM",
            Endian::Big => *b"MI",
        }
    }

    // -- décodage depuis une tranche (payloads déjà en mémoire) --

    pub fn get_u16(self, b: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(b),
            Endian::Big => BigEndian::read_u16(b),
        }
    }

    pub fn get_i16(self, b: &[u8]) -> i16 {
        match self {
            Endian::Little => LittleEndian::read_i16(b),
            Endian::Big => BigEndian::read_i16(b),
        }
    }

    pub fn get_u32(self, b: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        }
    }

    pub fn get_i32(self, b: &[u8]) -> i32 {
        match self {
            Endian::Little => LittleEndian::read_i32(b),
            Endian::Big => BigEndian::read_i32(b),
        }
    }

    pub fn get_u64(self, b: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(b),
            Endian::Big => BigEndian::read_u64(b),
        }
    }

    pub fn get_i64(self, b: &[u8]) -> i64 {
        match self {
            Endian::Little => LittleEndian::read_i64(b),
            Endian::Big => BigEndian::read_i64(b),
        }
    }

    pub fn get_f32(self, b: &[u8]) -> f32 {
        match self {
            Endian::Little => LittleEndian::read_f32(b),
            Endian::Big => BigEndian::read_f32(b),
        }
    }

    pub fn get_f64(self, b: &[u8]) -> f64 {
        match self {
            Endian::Little => LittleEndian::read_f64(b),
            Endian::Big => BigEndian::read_f64(b),
        }
    }

    // -- encodage vers un tampon --

    pub fn put_u16(self, buf: &mut Vec<u8>, v: u16) {
        let mut b = [0u8; 2];
        match self {
            Endian::Little => LittleEndian::write_u16(&mut b, v),
            Endian::Big => BigEndian::write_u16(&mut b, v),
        }
        buf.extend_from_slice(&b);
    }

    pub fn put_i16(self, buf: &mut Vec<u8>, v: i16) {
        self.put_u16(buf, v as u16);
    }

    pub fn put_u32(self, buf: &mut Vec<u8>, v: u32) {
        let mut b = [0u8; 4];
        match self {
            Endian::Little => LittleEndian::write_u32(&mut b, v),
            Endian::Big => BigEndian::write_u32(&mut b, v),
        }
        buf.extend_from_slice(&b);
    }

    pub fn put_i32(self, buf: &mut Vec<u8>, v: i32) {
        self.put_u32(buf, v as u32);
    }

    pub fn put_u64(self, buf: &mut Vec<u8>, v: u64) {
        let mut b = [0u8; 8];
        match self {
            Endian::Little => LittleEndian::write_u64(&mut b, v),
            Endian::Big => BigEndian::write_u64(&mut b, v),
        }
        buf.extend_from_slice(&b);
    }

    pub fn put_i64(self, buf: &mut Vec<u8>, v: i64) {
        self.put_u64(buf, v as u64);
    }

    pub fn put_f32(self, buf: &mut Vec<u8>, v: f32) {
        let mut b = [0u8; 4];
        match self {
            Endian::Little => LittleEndian::write_f32(&mut b, v),
            Endian::Big => BigEndian::write_f32(&mut b, v),
        }
        buf.extend_from_slice(&b);
    }

    pub fn put_f64(self, buf: &mut Vec<u8>, v: f64) {
        let mut b = [0u8; 8];
        match self {
            Endian::Little => LittleEndian::write_f64(&mut b, v),
            Endian::Big => BigEndian::write_f64(&mut b, v),
        }
        buf.extend_from_slice(&b);
    }
}

/// Octets de bourrage pour amener `len` à la frontière 8 octets suivante.
#[inline]
pub const fn pad8(len: usize) -> usize {
    (8 - len % 8) % 8
}

/// Lecteur primitif sur un flux positionnable.
///
/// Un seul curseur par flux actif : pendant la lecture d'un sous-flux
/// décompressé, le curseur extérieur reste garé et un second `ByteReader`
/// est construit sur le tampon gonflé.
pub struct ByteReader<R> {
    inner: R,
    endian: Endian,
}

impl<R: Read + Seek> ByteReader<R> {
    pub fn new(inner: R, endian: Endian) -> Self {
        Self { inner, endian }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Rend le flux sous-jacent (pour rouvrir avec un autre boutisme).
    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn pos(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    pub fn skip(&mut self, n: i64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Current(n)).map(|_| ())
    }

    /// Fin de flux ? Lit un octet et restaure le curseur sinon.
    pub fn eof(&mut self) -> io::Result<bool> {
        let mut b = [0u8; 1];
        let n = self.inner.read(&mut b)?;
        if n == 0 {
            return Ok(true);
        }
        self.inner.seek(SeekFrom::Current(-1))?;
        Ok(false)
    }

    pub fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.inner.read_u8()
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        match self.endian {
            Endian::Little => self.inner.read_u16::<LittleEndian>(),
            Endian::Big => self.inner.read_u16::<BigEndian>(),
        }
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        match self.endian {
            Endian::Little => self.inner.read_u32::<LittleEndian>(),
            Endian::Big => self.inner.read_u32::<BigEndian>(),
        }
    }
}

/// Écrivain primitif, symétrique du lecteur.
pub struct ByteWriter<W> {
    inner: W,
    endian: Endian,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W, endian: Endian) -> Self {
        Self { inner, endian }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    /// Émet `n` octets nuls de bourrage.
    pub fn pad(&mut self, n: usize) -> io::Result<()> {
        const ZEROS: [u8; 8] = [0u8; 8];
        self.inner.write_all(&ZEROS[..n.min(8)])?;
        if n > 8 {
            for _ in 0..n - 8 {
                self.inner.write_u8(0)?;
            }
        }
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> io::Result<()> {
        match self.endian {
            Endian::Little => self.inner.write_u16::<LittleEndian>(v),
            Endian::Big => self.inner.write_u16::<BigEndian>(v),
        }
    }

    pub fn write_u32(&mut self, v: u32) -> io::Result<()> {
        match self.endian {
            Endian::Little => self.inner.write_u32::<LittleEndian>(v),
            Endian::Big => self.inner.write_u32::<BigEndian>(v),
        }
    }
}
