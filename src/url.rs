//! URL templates and per-operation routes.
//!
//! A template such as `/api/todos/{_id}` yields two paths: the resource path
//! with placeholders filled from a record's fields, and the collection path
//! with trailing placeholder segments stripped. [`Routes`] maps every data
//! operation to an HTTP method and one of those paths; individual routes may
//! be overridden with `"METHOD /path"` strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    connection::Operation,
    error::{ConfigError, ConnectError},
    record::Record,
};

/// HTTP method used by a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Full update.
    Put,
    /// Partial update.
    Patch,
    /// Destroy.
    Delete,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        Some(match text.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            _ => return None,
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A path template with `{field}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UrlTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] for an empty template, unbalanced
    /// braces, or an empty placeholder name.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };
        if raw.trim().is_empty() {
            return Err(invalid("template is empty"));
        }
        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find('{') {
            if rest[..open].contains('}') {
                return Err(invalid("unbalanced `}`"));
            }
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed `{`"))?;
            let name = after[..close].trim();
            if name.is_empty() || name.contains('{') {
                return Err(invalid("empty placeholder"));
            }
            segments.push(Segment::Placeholder(name.to_string()));
            rest = &after[close + 1..];
        }
        if rest.contains('}') {
            return Err(invalid("unbalanced `}`"));
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Template text as given.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.raw }

    /// Placeholder names in order of appearance.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// The template with trailing `/{placeholder}` segments removed.
    #[must_use]
    pub fn collection(&self) -> Self {
        let mut segments = self.segments.clone();
        while matches!(
            segments.as_slice(),
            [.., Segment::Literal(text), Segment::Placeholder(_)] if text.ends_with('/')
        ) {
            segments.pop();
            if let Some(Segment::Literal(text)) = segments.last_mut() {
                text.pop();
                if text.is_empty() {
                    segments.pop();
                }
            }
        }
        let raw = render_raw(&segments);
        Self { raw, segments }
    }

    /// Append `/{field}` placeholders for each identity field.
    #[must_use]
    pub fn with_identity(&self, identity: &[String]) -> Self {
        let mut segments = self.segments.clone();
        for field in identity {
            match segments.last_mut() {
                Some(Segment::Literal(text)) if text.ends_with('/') => {}
                Some(Segment::Literal(text)) => text.push('/'),
                _ => segments.push(Segment::Literal("/".to_string())),
            }
            segments.push(Segment::Placeholder(field.clone()));
        }
        let raw = render_raw(&segments);
        Self { raw, segments }
    }

    /// Fill placeholders from `record`, percent-encoding each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::MissingIdentity`] naming the first
    /// placeholder without a non-null value.
    pub fn expand(&self, record: &Record) -> Result<String, ConnectError> {
        let mut path = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Placeholder(name) => {
                    let value = match record.get(name) {
                        None | Some(Value::Null) => {
                            return Err(ConnectError::MissingIdentity(name.clone()));
                        }
                        Some(Value::String(text)) => text.clone(),
                        Some(other) => other.to_string(),
                    };
                    path.push_str(&urlencoding::encode(&value));
                }
            }
        }
        Ok(path)
    }

    /// Match `path` against the template, capturing placeholder values.
    ///
    /// Placeholders capture one path segment each; captured values are
    /// percent-decoded strings.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Record> {
        let mut captures = Record::new();
        let mut rest = path;
        let mut segments = self.segments.iter().peekable();
        while let Some(segment) = segments.next() {
            match segment {
                Segment::Literal(text) => rest = rest.strip_prefix(text.as_str())?,
                Segment::Placeholder(name) => {
                    let end = match segments.peek() {
                        Some(Segment::Literal(next)) => rest.find(next.as_str())?,
                        _ => rest.len(),
                    };
                    let raw = &rest[..end];
                    if raw.is_empty() || raw.contains('/') {
                        return None;
                    }
                    let decoded = urlencoding::decode(raw).ok()?;
                    captures.insert(name.clone(), Value::String(decoded.into_owned()));
                    rest = &rest[end..];
                }
            }
        }
        rest.is_empty().then_some(captures)
    }
}

fn render_raw(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Literal(text) => text.clone(),
            Segment::Placeholder(name) => format!("{{{name}}}"),
        })
        .collect()
}

/// A method paired with a path template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    method: Method,
    template: UrlTemplate,
}

impl Route {
    /// Pair `method` with `template`.
    #[must_use]
    pub fn new(method: Method, template: UrlTemplate) -> Self { Self { method, template } }

    /// Parse a `"METHOD /path/{field}"` route.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the method is unknown or the
    /// template is malformed.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let (method, path) = text
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| ConfigError::InvalidUrl {
                url: text.to_string(),
                reason: "route must be `METHOD /path`",
            })?;
        let method = Method::parse(method).ok_or_else(|| ConfigError::InvalidUrl {
            url: text.to_string(),
            reason: "unknown method",
        })?;
        Ok(Self::new(method, UrlTemplate::parse(path.trim())?))
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> Method { self.method }

    /// Path template.
    #[must_use]
    pub fn template(&self) -> &UrlTemplate { &self.template }
}

/// Routes for the five data operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routes {
    get_list: Route,
    get: Route,
    create: Route,
    update: Route,
    destroy: Route,
}

impl Routes {
    /// Derive the conventional REST routes from one template.
    ///
    /// Without placeholders, the template is the collection path and
    /// `/{identity}` segments are appended for single-item routes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] for a malformed template.
    pub fn from_template(
        template: &str,
        identity: &[String],
        update: Method,
    ) -> Result<Self, ConfigError> {
        let template = UrlTemplate::parse(template)?;
        let (resource, collection) = if template.placeholders().is_empty() {
            (template.with_identity(identity), template)
        } else {
            let collection = template.collection();
            (template, collection)
        };
        Ok(Self {
            get_list: Route::new(Method::Get, collection.clone()),
            get: Route::new(Method::Get, resource.clone()),
            create: Route::new(Method::Post, collection),
            update: Route::new(update, resource.clone()),
            destroy: Route::new(Method::Delete, resource),
        })
    }

    /// Replace the route used for `operation`.
    ///
    /// Operations other than the five data operations are ignored.
    #[must_use]
    pub fn with_route(mut self, operation: Operation, route: Route) -> Self {
        if let Some(slot) = self.slot_mut(operation) {
            *slot = route;
        }
        self
    }

    /// Route used for `operation`, if it is a data operation.
    #[must_use]
    pub fn route(&self, operation: Operation) -> Option<&Route> {
        match operation {
            Operation::GetListData => Some(&self.get_list),
            Operation::GetData => Some(&self.get),
            Operation::CreateData => Some(&self.create),
            Operation::UpdateData => Some(&self.update),
            Operation::DestroyData => Some(&self.destroy),
            _ => None,
        }
    }

    fn slot_mut(&mut self, operation: Operation) -> Option<&mut Route> {
        match operation {
            Operation::GetListData => Some(&mut self.get_list),
            Operation::GetData => Some(&mut self.get),
            Operation::CreateData => Some(&mut self.create),
            Operation::UpdateData => Some(&mut self.update),
            Operation::DestroyData => Some(&mut self.destroy),
            _ => None,
        }
    }

    /// Every route, for validation.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Route> {
        [&self.get_list, &self.get, &self.create, &self.update, &self.destroy].into_iter()
    }
}
