pub mod config;
pub mod diagnostics;
pub mod host;
pub mod index;
pub mod layout;
pub mod namespace;
pub mod parameters;
pub mod pipeline;
pub mod postprocess;
pub mod query;
pub mod registry;
pub mod render;
pub mod runtime;
pub mod store;
pub mod tokenizer;
pub mod validator;
