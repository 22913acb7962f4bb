//! Decision-function backends

mod openai;

pub use openai::OpenAiDecider;
