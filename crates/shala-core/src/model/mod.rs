mod class;
mod registration;
mod session;
#[cfg(test)]
mod tests;

pub use class::*;
pub use registration::*;
pub use session::*;
