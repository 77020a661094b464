//! Cross-module tests: session flows and hybrid search behavior, driven
//! through deterministic embedder and captioner fakes so no model download
//! or Ollama server is needed.

mod session;
pub mod support;
