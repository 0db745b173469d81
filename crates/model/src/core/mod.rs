pub mod identifiers;
pub mod partition;
pub mod value;
