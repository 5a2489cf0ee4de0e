pub mod returns;
pub mod source;

#[cfg(feature = "synthetic")]
pub mod synthetic;
