//! Plugins shipped with freshet.

mod duplicate_titles;
mod url_edit;

pub use duplicate_titles::IgnoreDuplicateTitles;
pub use url_edit::{Substitution, UrlEditor};

use crate::plugin::Plugin;

/// Every built-in plugin, ready to be loaded into a pipeline.
pub fn builtin_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(IgnoreDuplicateTitles::new()),
        Box::new(UrlEditor::new()),
    ]
}
