pub mod dictionary;
pub mod loader;

pub use dictionary::{decode, DecodedValue, RegisterDictionary, RegisterMeta, RegisterType, Scale};
