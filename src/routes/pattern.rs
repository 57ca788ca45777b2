//! Express-style path patterns: literal segments, `:param` and optional `:param?`.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Optional(String),
}

/// PathPattern
///
/// A parsed route path. Trailing slashes are insignificant on both the pattern and the
/// request path. Literal segments match case-sensitively, as the axum router does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

/// Captured path parameters, in pattern order.
pub type Params = Vec<(String, String)>;

impl PathPattern {
    pub fn parse(raw: &str) -> Self {
        let segments = split(raw)
            .map(|part| match part.strip_prefix(':') {
                Some(name) if name.len() > 1 && name.ends_with('?') => {
                    Segment::Optional(name[..name.len() - 1].to_string())
                }
                Some(name) if !name.is_empty() && name != "?" => Segment::Param(name.to_string()),
                _ => Segment::Literal(part.to_string()),
            })
            .collect();

        Self { segments }
    }

    /// Joins path pieces (base path, mount point, route path) into one pattern.
    pub fn join(pieces: &[&str]) -> Self {
        let joined: Vec<&str> = pieces.iter().flat_map(|piece| split(piece)).collect();
        Self::parse(&joined.join("/"))
    }

    /// Names of the parameters this pattern can capture.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) | Segment::Optional(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// match_path
    ///
    /// Matches a request path, returning the captured parameters. An optional segment is
    /// tried present first, then absent.
    pub fn match_path(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = split(path).collect();
        let mut captured = Vec::new();
        match_from(&self.segments, &parts, &mut captured).then_some(captured)
    }

    /// axum_paths
    ///
    /// The concrete axum route strings this pattern stands for: one per combination of
    /// present and absent optional segments, longest first.
    pub fn axum_paths(&self) -> Vec<String> {
        let mut paths: Vec<Vec<String>> = vec![Vec::new()];
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => {
                    let lit = lit.replace('{', "{{").replace('}', "}}");
                    paths.iter_mut().for_each(|path| path.push(lit.clone()));
                }
                Segment::Param(name) => {
                    paths.iter_mut().for_each(|path| path.push(format!("{{{name}}}")));
                }
                Segment::Optional(name) => {
                    let without = paths.clone();
                    paths.iter_mut().for_each(|path| path.push(format!("{{{name}}}")));
                    paths.extend(without);
                }
            }
        }

        let mut rendered: Vec<String> = paths
            .into_iter()
            .map(|segments| format!("/{}", segments.join("/")))
            .collect();
        rendered.dedup();
        rendered
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => write!(f, "/{lit}")?,
                Segment::Param(name) => write!(f, "/:{name}")?,
                Segment::Optional(name) => write!(f, "/:{name}?")?,
            }
        }
        Ok(())
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

fn match_from(segments: &[Segment], parts: &[&str], captured: &mut Params) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return parts.is_empty();
    };

    match segment {
        Segment::Literal(lit) => match parts.split_first() {
            Some((part, tail)) if part == lit => match_from(rest, tail, captured),
            _ => false,
        },
        Segment::Param(name) => capture(name, rest, parts, captured),
        Segment::Optional(name) => {
            capture(name, rest, parts, captured) || match_from(rest, parts, captured)
        }
    }
}

fn capture(name: &str, rest: &[Segment], parts: &[&str], captured: &mut Params) -> bool {
    let Some((part, tail)) = parts.split_first() else {
        return false;
    };
    captured.push((name.to_string(), part.to_string()));
    if match_from(rest, tail, captured) {
        return true;
    }
    captured.pop();
    false
}
