//! Reader for the C header generated alongside the shared library
//!
//! The header is not parsed as C. Only single-line declarations of the form
//! `extern <return type> <name>(<params>);` are recognized; every other line is skipped. A line
//! that starts with `extern` and opens a parameter list but does not fit that form is rejected,
//! so a header produced by an incompatible toolchain fails loudly instead of binding nothing.

use std::fmt;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::CType;
use crate::error::{BridgeError, Result};

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^extern\s+(?P<head>[^(]+?)\s*\((?P<params>[^)]*)\)\s*;")
        .expect("declaration pattern is valid")
});

static DECORATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"__declspec\s*\(\s*dll(?:ex|im)port\s*\)|__attribute__\s*\(\(\s*visibility\s*\(\s*"default"\s*\)\s*\)\)"#)
        .expect("decoration pattern is valid")
});

/// Platform typedefs rewritten to fixed-width spellings, longest match first
static TYPEDEFS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\bGoInt64\b", "int64_t"),
        (r"\bGoUint64\b", "uint64_t"),
        (r"\bunsigned\s+long\s+long\b", "uint64_t"),
        (r"\blong\s+long\b", "int64_t"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (Regex::new(pattern).expect("typedef pattern is valid"), replacement)
    })
    .collect()
});

/// One parameter of a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub ty: CType,
    pub name: Option<String>,
}

/// An exported function declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub returns: CType,
    pub params: Vec<Param>,
    /// 1-based line in the header, 0 for synthesized declarations
    pub line: usize,
}

impl Declaration {
    /// Parameter types in order
    pub fn param_types(&self) -> impl Iterator<Item = &CType> {
        self.params.iter().map(|param| &param.ty)
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extern {} {}(", self.returns, self.name)?;
        if self.params.is_empty() {
            f.write_str("void")?;
        }
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &param.name {
                Some(name) => write!(f, "{} {}", param.ty, name)?,
                None => write!(f, "{}", param.ty)?,
            }
        }
        f.write_str(");")
    }
}

/// Declarations read from a header, in file order
#[derive(Debug, Clone)]
pub struct Header {
    declarations: Vec<Declaration>,
}

impl Header {
    /// Read and parse a header file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BridgeError::NotFound {
                what: "library header",
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut declarations = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = DECORATION.replace_all(raw, "");
            let line = line.trim();
            // `extern "C" {` guards carry no parameter list
            if !line.starts_with("extern") || !line.contains('(') {
                continue;
            }
            declarations.push(parse_declaration(&normalize_typedefs(line), index + 1)?);
        }

        if declarations.is_empty() {
            return Err(BridgeError::Parse {
                line: 0,
                message: "no extern declarations found".to_string(),
            });
        }

        Ok(Self { declarations })
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|decl| decl.name == name)
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }
}

fn normalize_typedefs(line: &str) -> String {
    TYPEDEFS
        .iter()
        .fold(line.to_string(), |text, (pattern, replacement)| {
            pattern.replace_all(&text, *replacement).into_owned()
        })
}

fn parse_declaration(line: &str, line_no: usize) -> Result<Declaration> {
    let error = |message: String| BridgeError::Parse {
        line: line_no,
        message,
    };

    let captures = DECLARATION
        .captures(line)
        .ok_or_else(|| error(format!("unrecognized declaration `{}`", line)))?;

    let head = captures["head"].trim_end();
    let split = head
        .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .map(|i| i + 1)
        .unwrap_or(0);
    let (returns, name) = head.split_at(split);
    let returns = returns.trim();

    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(error(format!("missing function name in `{}`", line)));
    }
    if returns.is_empty() {
        return Err(error(format!("missing return type for `{}`", name)));
    }

    let params = parse_params(&captures["params"])
        .map_err(|message| error(format!("{} in `{}`", message, name)))?;

    Ok(Declaration {
        name: name.to_string(),
        returns: CType::parse(returns),
        params,
        line: line_no,
    })
}

fn parse_params(text: &str) -> std::result::Result<Vec<Param>, String> {
    let text = text.trim();
    if text.is_empty() || text == "void" {
        return Ok(Vec::new());
    }

    text.split(',').map(parse_param).collect()
}

fn parse_param(text: &str) -> std::result::Result<Param, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty parameter".to_string());
    }

    if let Some(star) = text.rfind('*') {
        let name = text[star + 1..].trim();
        return Ok(Param {
            ty: CType::parse(&text[..=star]),
            name: (!name.is_empty()).then(|| name.to_string()),
        });
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    match words.split_last() {
        Some((name, ty)) if !ty.is_empty() => Ok(Param {
            ty: CType::parse(&ty.join(" ")),
            name: Some(name.to_string()),
        }),
        _ => Ok(Param {
            ty: CType::parse(text),
            name: None,
        }),
    }
}
