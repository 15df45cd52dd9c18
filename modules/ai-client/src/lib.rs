pub mod error;
pub mod openai;
pub mod util;

pub use error::{AiError, Result};
pub use openai::{ChatOptions, OpenAi};
pub use util::{extract_json_array, truncate_to_char_boundary};
