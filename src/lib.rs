pub mod ast;
pub mod codegen;
pub mod errors;
pub mod pcode;

#[cfg(test)]
mod tests;

/// The current version of the back end.
pub const VERSION: &str = "0.1.0";

/// Map variables live in a fixed register file on the engine side.
pub const MAX_MAP_LOCATIONS: i32 = 128;

/// In the compressed format, the function-call instruction stores the
/// callee index in a single byte.
pub const MAX_LITTLE_E_FUNCS: i32 = 256;
