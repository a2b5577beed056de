//! Staged healing of generated module text.
//!
//! Seven stateless stages turn raw generated text into an artifact that
//! parses and exposes the `generate`/`check` contract:
//!
//! 1. fence stripper
//! 2. character normalizer
//! 3. import deduplicator
//! 4. signature wrapper
//! 5. pattern rewriter (driven by the rule table in [`rules`])
//! 6. forbidden symbol remover
//! 7. structural repair

pub mod fence;
pub mod imports;
pub mod lexer;
pub mod normalize;
pub mod pipeline;
pub mod rules;
pub mod signature;
pub mod stage;
pub mod structure;
pub mod symbols;


pub use pipeline::{HealReport, HealedArtifact, HealingPipeline, StageOutcome, build_stage};
pub use rules::{PatternRule, RuleScope, rules};
pub use stage::{ArtifactState, HealStage, StageFailure, StageName, StageOutput, StageSet};
