pub mod generator;
pub mod prompt;
pub mod query;

pub use generator::AdviceGenerator;
pub use prompt::build_advice_prompt;
pub use query::build_retrieval_query;
