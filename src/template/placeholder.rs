//! `{field}` substitution in template strings.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::rows::Row;

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid")
    })
}

/// Replace every `{identifier}` in `text` with `data[identifier]`, or with an
/// empty string when the row has no such column.
///
/// Single pass: substituted values are never scanned again, so a value that
/// itself looks like `{other}` is emitted literally.
pub fn resolve(text: Option<&str>, data: &Row) -> String {
    let Some(text) = text else {
        return String::new();
    };
    placeholder()
        .replace_all(text, |caps: &Captures| {
            data.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}
