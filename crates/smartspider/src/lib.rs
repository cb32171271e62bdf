//! SmartSpider core: page typing, intents, extraction strategies, records, and
//! validation of model replies into those types.

pub mod error;
pub mod heal;
pub mod schema;
pub mod types;

pub use error::{
    describe_violations, ExecutionError, FetchFailure, ModelError, PipelineError, ReasoningError,
    SchemaValidationError, Violation,
};
pub use heal::{parse_reply, ParsedReply};
pub use schema::{check_selector, ReplySchema};
pub use types::*;
