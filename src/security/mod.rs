//! Security utilities

pub mod profanity;
pub mod timing;

pub use profanity::{ProfanityFilter, WordListFilter};
pub use timing::{constant_time_eq_bytes, passwords_match};
