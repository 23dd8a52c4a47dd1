//! Binding table: exported symbols with their declarations and addresses
//!
//! Raw addresses only become callable after the header declaration has been checked against the
//! calling convention the caller is about to use.

use std::collections::HashMap;
use std::ffi::{c_int, c_void};

use tracing::{debug, warn};

use super::header::{Declaration, Header, Param};
use super::library::SymbolError;
use super::types::CType;
use crate::error::{BridgeError, Result};

/// `(void* configData, int configSize) -> int64`; service constructors and server launchers
pub type ConstructorFn = unsafe extern "C" fn(*const c_void, c_int) -> i64;
/// `(int64 id) -> void`
pub type DestructorFn = unsafe extern "C" fn(i64);
/// `(int64 id, void* requestData, int requestSize, int* responseSize) -> void*`
pub type EndpointFn = unsafe extern "C" fn(i64, *const c_void, c_int, *mut c_int) -> *mut c_void;
/// `(int64 handle) -> int64`
pub type StopFn = unsafe extern "C" fn(i64) -> i64;
/// `(void* ptr) -> void`
pub type FreeFn = unsafe extern "C" fn(*mut c_void);

/// Name of the library's own release function
pub const FREE_RESPONSE: &str = "FreeResponse";

/// Calling conventions used at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Constructor,
    Destructor,
    Endpoint,
    Stop,
    Free,
}

impl Signature {
    /// Human-readable form for error messages
    pub fn expected(self) -> &'static str {
        match self {
            Self::Constructor => "(void*, int) -> int64_t",
            Self::Destructor => "(int64_t) -> void",
            Self::Endpoint => "(int64_t, void*, int, int*) -> void*",
            Self::Stop => "(int64_t) -> int64_t",
            Self::Free => "(void*) -> void",
        }
    }

    pub fn matches(self, decl: &Declaration) -> bool {
        let params: Vec<&CType> = decl.param_types().collect();
        match self {
            Self::Constructor => {
                decl.returns == CType::Int64
                    && matches!(params.as_slice(), [CType::Pointer, size] if size.is_c_int())
            }
            Self::Destructor => {
                decl.returns == CType::Void && matches!(params.as_slice(), [CType::Int64])
            }
            Self::Endpoint => {
                decl.returns == CType::Pointer
                    && matches!(
                        params.as_slice(),
                        [CType::Int64, CType::Pointer, size, CType::Pointer] if size.is_c_int()
                    )
            }
            Self::Stop => {
                decl.returns == CType::Int64 && matches!(params.as_slice(), [CType::Int64])
            }
            Self::Free => {
                decl.returns == CType::Void && matches!(params.as_slice(), [CType::Pointer])
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    declaration: Declaration,
    address: *const (),
}

/// Symbol name to declaration and resolved address
pub struct BindingTable {
    bindings: HashMap<String, Binding>,
    free: FreeFn,
    free_symbol: String,
}

// SAFETY: the table only holds addresses of functions in a library that stays mapped for the
// life of the process; the functions themselves are callable from any thread.
unsafe impl Send for BindingTable {}
unsafe impl Sync for BindingTable {}

impl BindingTable {
    /// Bind every declaration in `header` using `resolve` to look up addresses
    ///
    /// Declarations that cannot be resolved are skipped with a warning. The release function is
    /// `FreeResponse` when the header declares it, otherwise the C allocator's `free`.
    pub fn from_header<R>(header: &Header, mut resolve: R) -> Result<Self>
    where
        R: FnMut(&str) -> Option<*const ()>,
    {
        let mut bindings = HashMap::new();

        for decl in header.declarations() {
            match resolve(&decl.name) {
                Some(address) if !address.is_null() => {
                    debug!(symbol = %decl.name, "Bound symbol");
                    bindings.insert(
                        decl.name.clone(),
                        Binding {
                            declaration: decl.clone(),
                            address,
                        },
                    );
                }
                _ => warn!(symbol = %decl.name, "Declared symbol could not be resolved"),
            }
        }

        let mut table = Self {
            bindings,
            free: libc::free,
            free_symbol: "free".to_string(),
        };

        if header.get(FREE_RESPONSE).is_some() {
            let address = table.typed(FREE_RESPONSE, Signature::Free)?;
            // SAFETY: declaration checked against the free signature.
            table.free = unsafe { std::mem::transmute::<*const (), FreeFn>(address) };
            table.free_symbol = FREE_RESPONSE.to_string();
        } else if let Some(address) = resolve("free").filter(|address| !address.is_null()) {
            // SAFETY: `free` is the C allocator's release function.
            table.free = unsafe { std::mem::transmute::<*const (), FreeFn>(address) };
            table.bindings.insert(
                "free".to_string(),
                Binding {
                    declaration: free_declaration(),
                    address,
                },
            );
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.bindings.get(name).map(|binding| &binding.declaration)
    }

    fn typed(&self, name: &str, signature: Signature) -> Result<*const ()> {
        let binding = self.bindings.get(name).ok_or_else(|| BridgeError::Symbol {
            name: name.to_string(),
            source: SymbolError::NotFound,
        })?;

        if !signature.matches(&binding.declaration) {
            return Err(BridgeError::Signature {
                name: name.to_string(),
                expected: signature.expected(),
                declared: binding.declaration.to_string(),
            });
        }

        Ok(binding.address)
    }

    pub fn constructor(&self, name: &str) -> Result<ConstructorFn> {
        let address = self.typed(name, Signature::Constructor)?;
        // SAFETY: declaration checked against the constructor signature.
        Ok(unsafe { std::mem::transmute::<*const (), ConstructorFn>(address) })
    }

    pub fn destructor(&self, name: &str) -> Result<DestructorFn> {
        let address = self.typed(name, Signature::Destructor)?;
        // SAFETY: declaration checked against the destructor signature.
        Ok(unsafe { std::mem::transmute::<*const (), DestructorFn>(address) })
    }

    pub fn endpoint(&self, name: &str) -> Result<EndpointFn> {
        let address = self.typed(name, Signature::Endpoint)?;
        // SAFETY: declaration checked against the endpoint signature.
        Ok(unsafe { std::mem::transmute::<*const (), EndpointFn>(address) })
    }

    pub fn stop(&self, name: &str) -> Result<StopFn> {
        let address = self.typed(name, Signature::Stop)?;
        // SAFETY: declaration checked against the stop signature.
        Ok(unsafe { std::mem::transmute::<*const (), StopFn>(address) })
    }

    /// Function that releases response buffers returned by endpoints
    pub fn free_fn(&self) -> FreeFn {
        self.free
    }

    /// Symbol name of [`BindingTable::free_fn`]
    pub fn free_symbol(&self) -> &str {
        &self.free_symbol
    }
}

impl std::fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("BindingTable")
            .field("symbols", &names)
            .field("free", &self.free_symbol)
            .finish()
    }
}

fn free_declaration() -> Declaration {
    Declaration {
        name: "free".to_string(),
        returns: CType::Void,
        params: vec![Param {
            ty: CType::Pointer,
            name: Some("ptr".to_string()),
        }],
        line: 0,
    }
}
