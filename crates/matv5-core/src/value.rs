//! value.rs — Arbre de valeurs neutre partagé par le décodeur et l'encodeur.
//!
//! - Scalaires : entier 64 bits signé, flottant IEEE-754 64 bits, chaîne UTF-8
//! - Conteneurs : liste ordonnée, enregistrement clé → valeur (ordre d'insertion)
//! - Ni null ni booléen : le décodeur n'en produit jamais, l'encodeur les refuse
//!
//! Le modèle colle volontairement à ce qu'un document JSON sait exprimer :
//! pas de tableau numérique dense, pas de complexes, pas de matrices creuses.

use std::fmt::{self, Write as _};

use indexmap::IndexMap;

/// Enregistrement ordonné nom → valeur (les fichiers MAT n'ont pas de
/// mécanisme de partage : l'arbre possède ses enfants, sans cycle possible).
pub type Record = IndexMap<String, Value>;

/// Une valeur neutre, produite par [`crate::loadmat`] et consommée par
/// [`crate::savemat`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Entier 64 bits signé.
    Int(i64),
    /// Flottant IEEE-754 64 bits.
    Float(f64),
    /// Chaîne UTF-8.
    Str(String),
    /// Liste ordonnée, éventuellement vide. 1-D, ou 2-D quand tous les
    /// enfants sont des listes de même longueur.
    List(Vec<Value>),
    /// Enregistrement préservant l'ordre d'insertion.
    Record(Record),
}

impl Value {
    /// Vrai pour un scalaire numérique (entier ou flottant).
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Valeur numérique vue comme un `f64` (les entiers sont convertis).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Nom court du genre de valeur, pour les messages d'erreur.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "entier",
            Value::Float(_) => "flottant",
            Value::Str(_) => "chaîne",
            Value::List(_) => "liste",
            Value::Record(_) => "enregistrement",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => {
                if x.is_nan() {
                    f.write_str("NaN")
                } else if x.is_infinite() {
                    if x.is_sign_positive() { f.write_str("+Inf") } else { f.write_str("-Inf") }
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => {
                f.write_char('"')?;
                for ch in s.chars() {
                    match ch {
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        c if c.is_control() => write!(f, "\\u{{{:x}}}", c as u32)?,
                        c => f.write_char(c)?,
                    }
                }
                f.write_char('"')
            }
            Value::List(l) => {
                f.write_char('[')?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_char(']')
            }
            Value::Record(r) => {
                f.write_char('{')?;
                for (i, (k, v)) in r.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_char('}')
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Int(i) }
}
impl From<f64> for Value {
    fn from(x: f64) -> Self { Value::Float(x) }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Str(s.to_owned()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::Str(s) }
}
impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self { Value::List(l) }
}
impl From<Record> for Value {
    fn from(r: Record) -> Self { Value::Record(r) }
}

// ---------- Pont serde (optionnel) ----------
//
// Permet au wrapper mat ↔ json de (dé)sérialiser l'arbre tel quel :
// Int ↔ nombre entier, Float ↔ nombre, Str ↔ chaîne, List ↔ tableau,
// Record ↔ objet (ordre préservé). `null` et les booléens sont refusés,
// le conteneur MAT n'a rien pour les représenter.
#[cfg(feature = "serde")]
mod serde_support {
    use super::{Record, Value};
    use serde::de::{self, MapAccess, SeqAccess, Visitor};
    use serde::ser::{SerializeMap, SerializeSeq};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Value::Int(i) => serializer.serialize_i64(*i),
                Value::Float(x) => serializer.serialize_f64(*x),
                Value::Str(s) => serializer.serialize_str(s),
                Value::List(l) => {
                    let mut seq = serializer.serialize_seq(Some(l.len()))?;
                    for v in l {
                        seq.serialize_element(v)?;
                    }
                    seq.end()
                }
                Value::Record(r) => {
                    let mut map = serializer.serialize_map(Some(r.len()))?;
                    for (k, v) in r {
                        map.serialize_entry(k, v)?;
                    }
                    map.end()
                }
            }
        }
    }

    struct ValueVisitor;

    impl<'de> Visitor<'de> for ValueVisitor {
        type Value = Value;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("un nombre, une chaîne, un tableau ou un objet")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
            Ok(Value::Int(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
            i64::try_from(v)
                .map(Value::Int)
                .map_err(|_| E::custom(format!("entier hors plage i64: {v}")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
            Ok(Value::Float(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
            Ok(Value::Str(v.to_owned()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
            Ok(Value::Str(v))
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
            Err(E::custom(format!("booléen `{v}` non représentable en MAT")))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
            Err(E::custom("`null` non représentable en MAT"))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
            let mut l = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(v) = seq.next_element::<Value>()? {
                l.push(v);
            }
            Ok(Value::List(l))
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
            let mut r = Record::new();
            while let Some((k, v)) = map.next_entry::<String, Value>()? {
                r.insert(k, v);
            }
            Ok(Value::Record(r))
        }
    }

    impl<'de> Deserialize<'de> for Value {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
            deserializer.deserialize_any(ValueVisitor)
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let mut r = Record::new();
        r.insert("n".to_owned(), Value::Int(7));
        r.insert("x".to_owned(), Value::Float(2.5));
        r.insert("s".to_owned(), Value::Str("abc".into()));
        r.insert("l".to_owned(), Value::List(vec![Value::Int(1), Value::Int(2)]));
        let v = Value::Record(r);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn null_and_bool_are_refused() {
        assert!(serde_json::from_str::<Value>("null").is_err());
        assert!(serde_json::from_str::<Value>("false").is_err());
        assert!(serde_json::from_str::<Value>("[1, true]").is_err());
    }

    #[test]
    fn integers_stay_integers() {
        let v: Value = serde_json::from_str("[1, 2.0]").unwrap();
        assert_eq!(v, Value::List(vec![Value::Int(1), Value::Float(2.0)]));
    }
}
