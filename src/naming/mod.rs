pub mod algorithm;
pub mod config;
pub mod scoring;
pub mod title;
pub mod tokens;

pub use algorithm::{generate_name, NameCandidate, NamingInput};
pub use config::NamingConfig;
pub use title::{compose, parse, AgeAnnotation, ParsedTitle, TitleEdit};
