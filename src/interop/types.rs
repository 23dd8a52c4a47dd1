//! C type descriptors for declarations read from the library header

use std::fmt;

/// C type as it appears in an exported declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CType {
    Void,
    /// Plain `int`; the width used for buffer sizes at the boundary
    Int,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SizeT,
    Float,
    Double,
    Char,
    /// Any pointer type; the pointee is not tracked
    Pointer,
    /// A name this crate does not interpret; tolerated until a signature check needs it
    Opaque(String),
}

impl CType {
    /// Classify a normalized type spelling such as `int64_t` or `const char *`
    pub fn parse(text: &str) -> Self {
        if text.contains('*') {
            return Self::Pointer;
        }

        let words: Vec<&str> = text
            .split_whitespace()
            .filter(|word| !matches!(*word, "const" | "volatile"))
            .collect();

        match words.join(" ").as_str() {
            "void" => Self::Void,
            "int" | "signed int" | "signed" => Self::Int,
            "int32_t" | "GoInt32" => Self::Int32,
            "int64_t" => Self::Int64,
            "uint32_t" | "unsigned int" | "unsigned" | "GoUint32" => Self::UInt32,
            "uint64_t" => Self::UInt64,
            "size_t" | "GoUintptr" => Self::SizeT,
            "float" | "GoFloat32" => Self::Float,
            "double" | "GoFloat64" => Self::Double,
            "char" => Self::Char,
            other => Self::Opaque(other.to_string()),
        }
    }

    /// Whether a value of this type is passed like a C `int`
    #[inline]
    pub fn is_c_int(&self) -> bool {
        matches!(self, Self::Int | Self::Int32)
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Int => f.write_str("int"),
            Self::Int32 => f.write_str("int32_t"),
            Self::Int64 => f.write_str("int64_t"),
            Self::UInt32 => f.write_str("uint32_t"),
            Self::UInt64 => f.write_str("uint64_t"),
            Self::SizeT => f.write_str("size_t"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::Char => f.write_str("char"),
            Self::Pointer => f.write_str("void*"),
            Self::Opaque(name) => f.write_str(name),
        }
    }
}
