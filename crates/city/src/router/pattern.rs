use crate::error::RouteTableError;
use crate::request::RouteParams;
use std::fmt;

type InnerRouter = matchit::Router<()>;

/// One compiled route template.
///
/// Templates are absolute paths whose segments are literals, `[name]` for one dynamic
/// segment, or a trailing `[...name]` capturing the rest of the path (possibly empty).
pub struct RoutePattern {
    template: String,
    param_names: Vec<String>,
    matcher: InnerRouter,
    // the template without its catch-all segment, so `/docs/[...rest]` also matches `/docs`
    rest_matcher: Option<(InnerRouter, String)>,
}

enum Segment<'a> {
    Literal(&'a str),
    Param(&'a str),
    CatchAll(&'a str),
}

impl RoutePattern {
    pub fn parse(template: impl Into<String>) -> Result<Self, RouteTableError> {
        let template = template.into();
        let segments = parse_segments(&template)?;

        let mut param_names: Vec<String> = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) | Segment::CatchAll(name) = segment {
                if param_names.iter().any(|existing| existing == name) {
                    return Err(RouteTableError::invalid_template(&template, format!("duplicate parameter '{name}'")));
                }
                param_names.push((*name).to_owned());
            }
        }

        let trailing_slash = template.len() > 1 && template.ends_with('/');
        let matcher = compile(&template, &segments, trailing_slash)?;

        let rest_matcher = match segments.last() {
            Some(Segment::CatchAll(name)) => {
                let prefix = &segments[..segments.len() - 1];
                let mut router = compile(&template, prefix, false)?;
                if !prefix.is_empty() {
                    insert(&template, &mut router, matchit_path(prefix, true))?;
                }
                Some((router, (*name).to_owned()))
            }
            _ => None,
        };

        Ok(Self { template, param_names, matcher, rest_matcher })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Parameter names in the order they appear in the template.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.param_names.is_empty()
    }

    /// The only pathname a static pattern matches.
    pub fn static_path(&self) -> Option<&str> {
        self.is_static().then_some(self.template.as_str())
    }

    /// Matches `path` exactly, returning the captured parameters in declared order.
    pub fn matches(&self, path: &str) -> Option<RouteParams> {
        if let Ok(matched) = self.matcher.at(path) {
            let params = self
                .param_names
                .iter()
                .map(|name| (name.clone(), matched.params.get(name).unwrap_or_default().to_owned()))
                .collect();
            return Some(params);
        }

        let (rest_matcher, rest_name) = self.rest_matcher.as_ref()?;
        let matched = rest_matcher.at(path).ok()?;
        let params = self
            .param_names
            .iter()
            .map(|name| {
                let value = if name == rest_name { "" } else { matched.params.get(name).unwrap_or_default() };
                (name.clone(), value.to_owned())
            })
            .collect();
        Some(params)
    }
}

impl fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutePattern").field("template", &self.template).field("param_names", &self.param_names).finish()
    }
}

fn parse_segments(template: &str) -> Result<Vec<Segment<'_>>, RouteTableError> {
    let Some(path) = template.strip_prefix('/') else {
        return Err(RouteTableError::invalid_template(template, "must start with '/'"));
    };

    if path.is_empty() {
        return Ok(Vec::new());
    }

    let path = path.strip_suffix('/').unwrap_or(path);
    let raw_segments: Vec<&str> = path.split('/').collect();
    let last = raw_segments.len() - 1;

    let mut segments = Vec::with_capacity(raw_segments.len());
    for (index, raw) in raw_segments.into_iter().enumerate() {
        if raw.is_empty() {
            return Err(RouteTableError::invalid_template(template, "empty segment"));
        }

        let segment = match raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            Some(inner) => match inner.strip_prefix("...") {
                Some(name) if index != last => {
                    return Err(RouteTableError::invalid_template(
                        template,
                        format!("catch-all '{name}' must be the last segment"),
                    ));
                }
                Some(name) => Segment::CatchAll(valid_name(template, name)?),
                None => Segment::Param(valid_name(template, inner)?),
            },
            None if raw.contains(['[', ']']) => {
                return Err(RouteTableError::invalid_template(
                    template,
                    format!("segment '{raw}' must be a literal or a whole parameter"),
                ));
            }
            None => Segment::Literal(raw),
        };
        segments.push(segment);
    }
    Ok(segments)
}

fn valid_name<'a>(template: &str, name: &'a str) -> Result<&'a str, RouteTableError> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if valid { Ok(name) } else { Err(RouteTableError::invalid_template(template, format!("invalid parameter name '{name}'"))) }
}

fn matchit_path(segments: &[Segment<'_>], trailing_slash: bool) -> String {
    let mut path = String::from("/");
    for (index, segment) in segments.iter().enumerate() {
        if index > 0 {
            path.push('/');
        }
        match segment {
            Segment::Literal(literal) => path.push_str(&literal.replace('{', "{{").replace('}', "}}")),
            Segment::Param(name) => {
                path.push('{');
                path.push_str(name);
                path.push('}');
            }
            Segment::CatchAll(name) => {
                path.push_str("{*");
                path.push_str(name);
                path.push('}');
            }
        }
    }
    if trailing_slash && !segments.is_empty() {
        path.push('/');
    }
    path
}

fn compile(template: &str, segments: &[Segment<'_>], trailing_slash: bool) -> Result<InnerRouter, RouteTableError> {
    let mut router = InnerRouter::new();
    insert(template, &mut router, matchit_path(segments, trailing_slash))?;
    Ok(router)
}

fn insert(template: &str, router: &mut InnerRouter, path: String) -> Result<(), RouteTableError> {
    router.insert(path, ()).map_err(|e| RouteTableError::invalid_template(template, e))
}
