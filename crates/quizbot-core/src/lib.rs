//! quizbot-core — Quiz session state machine and question-set management.
//!
//! This crate defines the data model, the collaborator traits, and the
//! per-user session logic that every quizbot transport builds on.

pub mod bank;
pub mod bot;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod session;
pub mod source;
pub mod traits;

pub use error::{QuizError, StoreError};
pub use model::{Platform, QuestionEntry, QuestionSet, UserId};
