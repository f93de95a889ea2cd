mod artifacts;
mod completion;
mod discovery;
mod extraction;
mod pipeline;
pub(crate) mod support;
