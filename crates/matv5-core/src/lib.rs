//! matv5-core — Cœur du pont MAT niveau 5 ↔ arbre de valeurs neutre.
//!
//! Lit et écrit le conteneur binaire MAT-file niveau 5 de Matlab, vers et
//! depuis un arbre de valeurs volontairement aligné sur ce qu'un document
//! JSON sait exprimer : nombres, chaînes, listes, enregistrements. Ni
//! tableaux numériques denses, ni complexes, ni matrices creuses.
//!
//! ## Modules
//! - `value`  : l'arbre de valeurs neutre ([`Value`], [`Record`]).
//! - `types`  : codes `mi*` / `mx*` du format.
//! - `rw`     : primitives d'E/S à boutisme résolu à l'exécution.
//! - `tag`    : tag d'élément de données, petit format SDE compris.
//! - `header` : préambule commun des matrices.
//! - `load`   : décodeur (cadrage, décompression zlib, corps).
//! - `save`   : encodeur (inférence de type, corps, compression).
//!
//! ## Features
//! - **serde** : (dé)sérialisation de [`Value`] — le pont mat ↔ json.
//! - **tracing** : quelques points d'instrumentation dans load/save.
//!
//! ## Exemple
//! ```
//! use matv5_core::{loadmat_bytes, savemat_bytes, Record, Value};
//!
//! let mut data = Record::new();
//! data.insert("x".to_owned(), Value::Int(42));
//! let bytes = savemat_bytes(&data).unwrap();
//! assert_eq!(loadmat_bytes(&bytes, false).unwrap(), data);
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

pub mod header;
pub mod load;
pub mod rw;
pub mod save;
pub mod tag;
pub mod types;
pub mod value;

// ---------- Reexports de confort ----------
pub use load::{loadmat_bytes, loadmat_from, META_GLOBALS_KEY, META_HEADER_KEY};
pub use rw::Endian;
pub use save::{savemat_bytes, savemat_to, savemat_with};
pub use types::{ElementType, MatrixClass};
pub use value::{Record, Value};

// ---------- Version ----------
/// Version du crate (lisible, via Cargo).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bannière de version (utile pour logs/outils).
pub fn version() -> String {
    format!("matv5-core {VERSION}")
}

// ---------- Erreurs & Résultat ----------

/// Toutes les façons dont un fichier MAT peut décevoir. Les erreurs
/// remontent à l'appelant, jamais de récupération silencieuse ni de
/// résultat partiel.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O sous-jacente (lecture courte, seek invalide…)
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Fichier malformé : tag illisible, compte de valeurs faux, etc.
    #[error("fichier corrompu: {0}")]
    Corrupt(String),

    /// Le fichier n'est pas au niveau 5 du format.
    #[error("seuls les fichiers MAT de niveau 5 sont lus (version majeure {major})")]
    UnsupportedVersion { major: u8 },

    /// Trait du format hors du périmètre (creuses, complexes, objets…).
    #[error("non pris en charge: {0}")]
    Unsupported(&'static str),

    /// Type d'élément valide mais pas celui attendu à cette position.
    #[error("type {got} reçu, attendu {expected}")]
    UnexpectedType { got: String, expected: String },

    /// Deux variables de premier niveau portent le même nom.
    #[error("nom de variable en double: \"{0}\"")]
    DuplicateName(String),

    /// L'encodeur ne sait pas classer cette valeur (le message cite le
    /// chemin fautif).
    #[error("valeur non représentable — {0}")]
    Unrepresentable(String),

    /// Nom de variable au-delà de 31 octets, ou noms de champs au-delà du
    /// pas maximal de 32.
    #[error("nom trop long (max {max} octets): \"{name}\"")]
    NameTooLong { name: String, max: usize },

    /// Flux zlib invalide ou reliquat après gonflage.
    #[error("compression: {0}")]
    Compression(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ---------- API fichiers ----------

/// Charge un fichier MAT depuis le disque.
///
/// Avec `meta`, le [`Record`] renvoyé gagne les clés réservées
/// [`META_HEADER_KEY`] et [`META_GLOBALS_KEY`]. Le fichier est refermé sur
/// tous les chemins de sortie, erreurs comprises.
pub fn loadmat(path: impl AsRef<Path>, meta: bool) -> Result<Record> {
    let f = std::fs::File::open(path)?;
    load::loadmat_from(f, meta)
}

/// Écrit `data` dans un fichier MAT, une variable compressée par entrée,
/// avec le boutisme de la machine hôte.
pub fn savemat(path: impl AsRef<Path>, data: &Record) -> Result<()> {
    let f = std::fs::File::create(path)?;
    save::savemat_to(BufWriter::new(f), data)
}

// ---------- Prelude ----------
pub mod prelude {
    pub use crate::{
        loadmat, loadmat_bytes, savemat, savemat_bytes, Endian, Error, Record, Result, Value,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_banner() {
        assert!(version().starts_with("matv5-core "));
    }

    #[test]
    fn missing_file_surfaces_as_io() {
        let err = loadmat("/nulle/part/x.mat", false).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn error_messages_carry_context() {
        let err = Error::DuplicateName("x".into());
        assert!(format!("{err}").contains('x'));
        let err = Error::NameTooLong { name: "tres_long".into(), max: 31 };
        assert!(format!("{err}").contains("31"));
    }
}
