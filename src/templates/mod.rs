//! Configuration templates.

mod builtin;
mod engine;

pub use builtin::VHOST_TEMPLATE;
pub use engine::TemplateEngine;
