//! Deskline Agents - Directory, Classification and Assignment
//!
//! The directory keeps a cached open-ticket count per agent, updated with
//! per-agent atomics. The resolver reads those counts together with the
//! classifier's required tags to pick an owner; it never writes tickets.

mod classifier;
mod directory;
mod resolver;

pub use classifier::{Classifier, KeywordClassifier, TagRule};
pub use directory::{AgentDirectory, AgentLoad};
pub use resolver::{AssignmentResolver, ResolutionTrace};
