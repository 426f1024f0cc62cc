mod agent;
mod classifier;
mod disambiguator;
mod embedding;
mod llm;
mod repair;
mod synthesis;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::*;
pub use classifier::*;
pub use disambiguator::*;
pub use embedding::*;
pub use llm::*;
pub use repair::*;
pub use synthesis::*;
