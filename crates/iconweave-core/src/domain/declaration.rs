//! Declaration values: the string form the rendering layer consumes.

use std::fmt;

use super::reference::Representation;

/// Custom property the visual component reads its image from.
pub const IMAGE_PROPERTY: &str = "--icon-image";

/// DeclarationValue
///
/// - `None` -> `none`
/// - `Url` -> `url("…")`
/// - `ImageSet` -> `image-set(url("…") 1x, url("…") 2x)`（順序を保持）
#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationValue {
    None,
    Url(Representation),
    ImageSet(Vec<(Representation, f32)>),
}

impl DeclarationValue {
    pub fn url(rep: Representation) -> Self {
        DeclarationValue::Url(rep)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DeclarationValue::None)
    }

    /// Full `property: value` declaration for an output rule.
    pub fn to_declaration(&self) -> String {
        format!("{IMAGE_PROPERTY}: {self}")
    }

    /// Every representation referenced by this value.
    pub fn representations(&self) -> Vec<&Representation> {
        match self {
            DeclarationValue::None => Vec::new(),
            DeclarationValue::Url(rep) => vec![rep],
            DeclarationValue::ImageSet(entries) => entries.iter().map(|(rep, _)| rep).collect(),
        }
    }
}

impl fmt::Display for DeclarationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationValue::None => f.write_str("none"),
            DeclarationValue::Url(rep) => write!(f, "url(\"{}\")", escape_url(rep.as_str())),
            DeclarationValue::ImageSet(entries) => {
                if entries.is_empty() {
                    return f.write_str("none");
                }
                f.write_str("image-set(")?;
                for (i, (rep, scale)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "url(\"{}\") {}x", escape_url(rep.as_str()), scale)?;
                }
                f.write_str(")")
            }
        }
    }
}

fn escape_url(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Pull every `url("…")` target out of a declaration string.
///
/// Quoted targets run to the matching unescaped quote, so `)` inside the
/// quotes is part of the URL.
pub fn extract_urls(declaration: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = declaration;
    while let Some(start) = rest.find("url(") {
        let after = rest[start + 4..].trim_start();
        let Some((target, remainder)) = url_target(after) else {
            break;
        };
        found.push(target);
        rest = remainder;
    }
    found
}

/// Splits `after` (the text following `url(`) into the unescaped target and
/// whatever follows the closing `)`.
fn url_target(after: &str) -> Option<(String, &str)> {
    let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'');
    let Some(quote) = quote else {
        let end = after.find(')')?;
        return Some((after[..end].trim().to_string(), &after[end + 1..]));
    };

    let mut target = String::new();
    let mut chars = after.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                target.push(escaped);
            }
            c if c == quote => {
                let tail = &after[i + c.len_utf8()..];
                let close = tail.find(')')?;
                return Some((target, &tail[close + 1..]));
            }
            c => target.push(c),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_conventions() {
        assert_eq!(DeclarationValue::None.to_string(), "none");
        let url = DeclarationValue::url(Representation::new("/icons/a.svg"));
        assert_eq!(url.to_string(), "url(\"/icons/a.svg\")");
        assert_eq!(url.to_declaration(), "--icon-image: url(\"/icons/a.svg\")");
    }

    #[test]
    fn image_set_keeps_order() {
        let value = DeclarationValue::ImageSet(vec![
            (Representation::new("a.png"), 1.0),
            (Representation::new("b.png"), 2.0),
        ]);
        assert_eq!(
            value.to_string(),
            "image-set(url(\"a.png\") 1x, url(\"b.png\") 2x)"
        );
        assert_eq!(extract_urls(&value.to_declaration()), vec!["a.png", "b.png"]);
    }

    #[test]
    fn extract_keeps_parens_and_escapes_inside_quotes() {
        assert_eq!(
            extract_urls(r#"--icon-image: url("https://cdn.example/icons/a(1).svg")"#),
            vec!["https://cdn.example/icons/a(1).svg"]
        );
        let value = DeclarationValue::url(Representation::new(r#"/a "b" \c.svg"#));
        assert_eq!(extract_urls(&value.to_declaration()), vec![r#"/a "b" \c.svg"#]);
        assert_eq!(extract_urls("--x: url( '/a(2).svg' )"), vec!["/a(2).svg"]);
    }

    #[test]
    fn extract_stops_at_unterminated_quote() {
        assert!(extract_urls(r#"--x: url("/a.svg"#).is_empty());
    }

    #[test]
    fn extract_handles_unquoted_and_none() {
        assert_eq!(extract_urls("--x: url(/a.svg)"), vec!["/a.svg"]);
        assert!(extract_urls("--icon-image: none").is_empty());
    }
}
