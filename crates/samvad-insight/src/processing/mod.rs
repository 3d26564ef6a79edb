pub mod cleaner;
pub mod grouper;

pub use cleaner::clean_text;
pub use grouper::group_by_sender;
