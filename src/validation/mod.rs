//! Input validation module.
//!
//! Every value that ends up in a command argument or a config file passes
//! through one of these validators first.

mod document_root;
mod hostname;
mod php_version;

pub use document_root::validate_document_root;
pub use hostname::validate_hostname;
pub use php_version::{parse_php_version, PhpVersion};
