//! Derived indexes built from enriched chunks

pub mod concept;

pub use concept::{ArticleConcepts, ConceptIndex};
