//! `{0}` / `{name}` placeholder substitution for macro-provided C templates.
//!
//! A placeholder is `{` + one or more ASCII alphanumerics or `_` + `}`. Any
//! other brace is C syntax and is copied through, so templates like
//! `if (x) { f({0}); }` work unchanged. Substitution is a single pass: text
//! substituted into a template is never scanned again.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template `{template}` references {{{index}}} but only {available} argument(s) are passed")]
    MissingArg {
        template: String,
        index: usize,
        available: usize,
    },
    #[error("template `{template}` references unknown placeholder {{{name}}}")]
    UnknownNamed { template: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder<'a> {
    Index(usize),
    Named(&'a str),
}

enum Piece<'a> {
    Text(&'a str),
    Hole(Placeholder<'a>, &'a str),
}

fn pieces(template: &str) -> Vec<Piece<'_>> {
    let bytes = template.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            if j > i + 1 && j < bytes.len() && bytes[j] == b'}' {
                if start < i {
                    out.push(Piece::Text(&template[start..i]));
                }
                let inner = &template[i + 1..j];
                let hole = match inner.parse::<usize>() {
                    Ok(idx) => Placeholder::Index(idx),
                    Err(_) => Placeholder::Named(inner),
                };
                out.push(Piece::Hole(hole, &template[i..=j]));
                i = j + 1;
                start = i;
                continue;
            }
        }
        i += 1;
    }
    if start < template.len() {
        out.push(Piece::Text(&template[start..]));
    }
    out
}

/// Placeholders of a template in order of appearance.
pub fn placeholders(template: &str) -> Vec<Placeholder<'_>> {
    pieces(template)
        .into_iter()
        .filter_map(|p| match p {
            Piece::Hole(h, _) => Some(h),
            Piece::Text(_) => None,
        })
        .collect()
}

/// Fails when the template needs more positional arguments than `arg_count`
/// or a named placeholder outside `named`.
pub fn check_coverage(template: &str, arg_count: usize, named: &[&str]) -> Result<(), TemplateError> {
    for hole in placeholders(template) {
        match hole {
            Placeholder::Index(index) if index >= arg_count => {
                return Err(TemplateError::MissingArg {
                    template: template.to_string(),
                    index,
                    available: arg_count,
                });
            }
            Placeholder::Named(name) if !named.contains(&name) => {
                return Err(TemplateError::UnknownNamed {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Substitutes positional and named placeholders. A positional placeholder
/// past the end of `args` becomes `missing` when given, otherwise it stays in
/// the output verbatim, as do unknown named ones.
pub fn substitute(template: &str, args: &[String], named: &[(&str, &str)], missing: Option<&str>) -> String {
    let mut out = String::with_capacity(template.len());
    for piece in pieces(template) {
        match piece {
            Piece::Text(t) => out.push_str(t),
            Piece::Hole(Placeholder::Index(i), raw) => match (args.get(i), missing) {
                (Some(arg), _) => out.push_str(arg),
                (None, Some(fallback)) => out.push_str(fallback),
                (None, None) => {
                    log::warn!("[n64] template `{template}` has no argument for {raw}");
                    out.push_str(raw);
                }
            },
            Piece::Hole(Placeholder::Named(name), raw) => {
                match named.iter().find(|(k, _)| *k == name) {
                    Some((_, v)) => out.push_str(v),
                    None => out.push_str(raw),
                }
            }
        }
    }
    out
}
