//! types.rs — Codes du conteneur MAT niveau 5.
//!
//! Deux nomenclatures cohabitent dans le format : les *types d'éléments*
//! (tags `mi*`, niveau flux) et les *classes de matrices* (`mx*`, niveau
//! préambule). Chaque enum porte son code sur le fil et ce que le reste du
//! crate a besoin de savoir : taille d'un scalaire, famille entier/flottant.
//! Pas de dispatch par chaîne de format : le type d'élément suffit.

/// Type d'un élément de données (le premier mot d'un tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Single,
    Double,
    Int64,
    UInt64,
    Matrix,
    Compressed,
    Utf8,
    Utf16,
    Utf32,
}

impl ElementType {
    /// Code sur le fil (16 bits bas du premier mot du tag).
    pub const fn code(self) -> u16 {
        match self {
            ElementType::Int8 => 1,
            ElementType::UInt8 => 2,
            ElementType::Int16 => 3,
            ElementType::UInt16 => 4,
            ElementType::Int32 => 5,
            ElementType::UInt32 => 6,
            ElementType::Single => 7,
            ElementType::Double => 9,
            ElementType::Int64 => 12,
            ElementType::UInt64 => 13,
            ElementType::Matrix => 14,
            ElementType::Compressed => 15,
            ElementType::Utf8 => 16,
            ElementType::Utf16 => 17,
            ElementType::Utf32 => 18,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => ElementType::Int8,
            2 => ElementType::UInt8,
            3 => ElementType::Int16,
            4 => ElementType::UInt16,
            5 => ElementType::Int32,
            6 => ElementType::UInt32,
            7 => ElementType::Single,
            9 => ElementType::Double,
            12 => ElementType::Int64,
            13 => ElementType::UInt64,
            14 => ElementType::Matrix,
            15 => ElementType::Compressed,
            16 => ElementType::Utf8,
            17 => ElementType::Utf16,
            18 => ElementType::Utf32,
            _ => return None,
        })
    }

    /// Taille en octets d'un scalaire de ce type. Les octets UTF-8 comptent
    /// pour 1 ; `Matrix` et `Compressed` n'ont pas de scalaire.
    pub const fn scalar_size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 | ElementType::Utf8 => 1,
            ElementType::Int16 | ElementType::UInt16 | ElementType::Utf16 => 2,
            ElementType::Int32
            | ElementType::UInt32
            | ElementType::Single
            | ElementType::Utf32 => 4,
            ElementType::Double | ElementType::Int64 | ElementType::UInt64 => 8,
            ElementType::Matrix | ElementType::Compressed => 0,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            ElementType::Int8
                | ElementType::UInt8
                | ElementType::Int16
                | ElementType::UInt16
                | ElementType::Int32
                | ElementType::UInt32
                | ElementType::Int64
                | ElementType::UInt64
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ElementType::Single | ElementType::Double)
    }

    /// Nom du type, tel qu'il apparaît dans la littérature du format.
    pub const fn name(self) -> &'static str {
        match self {
            ElementType::Int8 => "miINT8",
            ElementType::UInt8 => "miUINT8",
            ElementType::Int16 => "miINT16",
            ElementType::UInt16 => "miUINT16",
            ElementType::Int32 => "miINT32",
            ElementType::UInt32 => "miUINT32",
            ElementType::Single => "miSINGLE",
            ElementType::Double => "miDOUBLE",
            ElementType::Int64 => "miINT64",
            ElementType::UInt64 => "miUINT64",
            ElementType::Matrix => "miMATRIX",
            ElementType::Compressed => "miCOMPRESSED",
            ElementType::Utf8 => "miUTF8",
            ElementType::Utf16 => "miUTF16",
            ElementType::Utf32 => "miUTF32",
        }
    }
}

/// Types numériques étroits acceptés à la place du type déclaré : Matlab
/// range les tableaux de petite amplitude dans un type plus court.
pub const PROMOTED_NUMERIC: [ElementType; 4] = [
    ElementType::Int32,
    ElementType::UInt16,
    ElementType::Int16,
    ElementType::UInt8,
];

/// Classe d'un tableau Matlab (octet bas du bloc de drapeaux du préambule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixClass {
    Cell,
    Struct,
    Object,
    Char,
    Sparse,
    Double,
    Single,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Function,
    Opaque,
    ObjectAlt,
}

impl MatrixClass {
    pub const fn code(self) -> u8 {
        match self {
            MatrixClass::Cell => 1,
            MatrixClass::Struct => 2,
            MatrixClass::Object => 3,
            MatrixClass::Char => 4,
            MatrixClass::Sparse => 5,
            MatrixClass::Double => 6,
            MatrixClass::Single => 7,
            MatrixClass::Int8 => 8,
            MatrixClass::UInt8 => 9,
            MatrixClass::Int16 => 10,
            MatrixClass::UInt16 => 11,
            MatrixClass::Int32 => 12,
            MatrixClass::UInt32 => 13,
            MatrixClass::Int64 => 14,
            MatrixClass::UInt64 => 15,
            MatrixClass::Function => 16,
            MatrixClass::Opaque => 17,
            MatrixClass::ObjectAlt => 18,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => MatrixClass::Cell,
            2 => MatrixClass::Struct,
            3 => MatrixClass::Object,
            4 => MatrixClass::Char,
            5 => MatrixClass::Sparse,
            6 => MatrixClass::Double,
            7 => MatrixClass::Single,
            8 => MatrixClass::Int8,
            9 => MatrixClass::UInt8,
            10 => MatrixClass::Int16,
            11 => MatrixClass::UInt16,
            12 => MatrixClass::Int32,
            13 => MatrixClass::UInt32,
            14 => MatrixClass::Int64,
            15 => MatrixClass::UInt64,
            16 => MatrixClass::Function,
            17 => MatrixClass::Opaque,
            18 => MatrixClass::ObjectAlt,
            _ => return None,
        })
    }

    /// Type d'élément porté par une classe numérique, `None` sinon.
    pub const fn numeric_element(self) -> Option<ElementType> {
        Some(match self {
            MatrixClass::Double => ElementType::Double,
            MatrixClass::Single => ElementType::Single,
            MatrixClass::Int8 => ElementType::Int8,
            MatrixClass::UInt8 => ElementType::UInt8,
            MatrixClass::Int16 => ElementType::Int16,
            MatrixClass::UInt16 => ElementType::UInt16,
            MatrixClass::Int32 => ElementType::Int32,
            MatrixClass::UInt32 => ElementType::UInt32,
            MatrixClass::Int64 => ElementType::Int64,
            MatrixClass::UInt64 => ElementType::UInt64,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            MatrixClass::Cell => "mxCELL_CLASS",
            MatrixClass::Struct => "mxSTRUCT_CLASS",
            MatrixClass::Object => "mxOBJECT_CLASS",
            MatrixClass::Char => "mxCHAR_CLASS",
            MatrixClass::Sparse => "mxSPARSE_CLASS",
            MatrixClass::Double => "mxDOUBLE_CLASS",
            MatrixClass::Single => "mxSINGLE_CLASS",
            MatrixClass::Int8 => "mxINT8_CLASS",
            MatrixClass::UInt8 => "mxUINT8_CLASS",
            MatrixClass::Int16 => "mxINT16_CLASS",
            MatrixClass::UInt16 => "mxUINT16_CLASS",
            MatrixClass::Int32 => "mxINT32_CLASS",
            MatrixClass::UInt32 => "mxUINT32_CLASS",
            MatrixClass::Int64 => "mxINT64_CLASS",
            MatrixClass::UInt64 => "mxUINT64_CLASS",
            MatrixClass::Function => "mxFUNCTION_CLASS",
            MatrixClass::Opaque => "mxOPAQUE_CLASS",
            MatrixClass::ObjectAlt => "mxOBJECT_CLASS (matrix.h)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for code in 0u16..=20 {
            if let Some(t) = ElementType::from_code(code) {
                assert_eq!(t.code(), code);
            }
        }
        for code in 0u8..=20 {
            if let Some(c) = MatrixClass::from_code(code) {
                assert_eq!(c.code(), code);
            }
        }
    }

    #[test]
    fn numeric_classes_carry_their_element() {
        assert_eq!(MatrixClass::Double.numeric_element(), Some(ElementType::Double));
        assert_eq!(MatrixClass::UInt64.numeric_element(), Some(ElementType::UInt64));
        assert_eq!(MatrixClass::Cell.numeric_element(), None);
        assert_eq!(MatrixClass::Char.numeric_element(), None);
    }

    #[test]
    fn sizes() {
        assert_eq!(ElementType::Double.scalar_size(), 8);
        assert_eq!(ElementType::Utf8.scalar_size(), 1);
        assert_eq!(ElementType::Int32.scalar_size(), 4);
    }
}
