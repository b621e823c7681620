//! Query routing
//!
//! CPU-bound, regex-driven classification of incoming queries: slang
//! expansion to contract vocabulary, intent labelling, topic and
//! classification detection, and manifest-driven article routing.

pub mod intent;
pub mod slang;

pub use intent::{Intent, IntentClassifier, IntentType};
pub use slang::SlangExpander;
