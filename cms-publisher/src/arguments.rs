//! Turns an inbound request into the ordered argument list a script receives.
//!
//! The source of argument values depends on method and content type:
//! a content-type-less POST carries them in headers, a form POST in its
//! urlencoded or multipart body, a GET in its query string. Any other method
//! yields no arguments at all, which is distinct from an empty list.

use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderName, Method, header::CONTENT_TYPE},
};
use indexmap::IndexMap;
use script_host::ApiArgument;

use crate::input_vars::InputVarDefinition;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// The parts of an HTTP request argument extraction looks at.
#[derive(Clone, Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query: None,
            body: Bytes::new(),
        }
    }

    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgumentSource {
    Headers,
    Form,
    Query,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Multipart(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(content_type) => {
                write!(f, "incorrect content type '{content_type}'; expected a form body")
            }
            ExtractError::Multipart(message) => write!(f, "malformed multipart body: {message}"),
        }
    }
}

impl std::error::Error for ExtractError {}

impl ArgumentSource {
    pub fn select(method: &Method, content_type: Option<&str>) -> Self {
        match *method {
            Method::POST if content_type.is_none() => ArgumentSource::Headers,
            Method::POST => ArgumentSource::Form,
            Method::GET => ArgumentSource::Query,
            _ => ArgumentSource::Unsupported,
        }
    }

    async fn extract(
        self,
        request: &InboundRequest,
        definitions: &[InputVarDefinition],
    ) -> Result<Option<Vec<ApiArgument>>, ExtractError> {
        match self {
            ArgumentSource::Headers => Ok(Some(from_headers(&request.headers, definitions))),
            ArgumentSource::Form => {
                let content_type = request.content_type().unwrap_or_default();
                let pairs = match media_type(&content_type).as_str() {
                    FORM_URLENCODED => urlencoded_pairs(&request.body),
                    MULTIPART_FORM_DATA => multipart_pairs(&content_type, &request.body).await?,
                    _ => return Err(ExtractError::UnsupportedContentType(content_type)),
                };
                Ok(Some(merge_declared(pairs, definitions)))
            }
            ArgumentSource::Query => {
                let query = request.query.as_deref().unwrap_or_default();
                Ok(Some(merge_declared(
                    urlencoded_pairs(query.as_bytes()),
                    definitions,
                )))
            }
            ArgumentSource::Unsupported => Ok(None),
        }
    }
}

/// Resolves script arguments for `request`. `Ok(None)` means the method
/// carries no arguments.
pub async fn extract_arguments(
    request: &InboundRequest,
    definitions: &[InputVarDefinition],
) -> Result<Option<Vec<ApiArgument>>, ExtractError> {
    let content_type = request.content_type();
    ArgumentSource::select(&request.method, content_type.as_deref())
        .extract(request, definitions)
        .await
}

/// One argument per definition, in declaration order; missing headers become
/// empty strings and values are cut to the declared length.
fn from_headers(headers: &HeaderMap, definitions: &[InputVarDefinition]) -> Vec<ApiArgument> {
    definitions
        .iter()
        .map(|definition| {
            let value = HeaderName::from_bytes(definition.name.as_bytes())
                .ok()
                .and_then(|name| headers.get(name))
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .unwrap_or_default();
            ApiArgument::new(definition.name.clone(), definition.truncate(&value))
        })
        .collect()
}

fn urlencoded_pairs(encoded: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(encoded)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Text fields of a multipart body in body order; file parts are skipped.
async fn multipart_pairs(
    content_type: &str,
    body: &Bytes,
) -> Result<Vec<(String, String)>, ExtractError> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|err| ExtractError::Multipart(err.to_string()))?;
    let mut multipart = multer::Multipart::with_reader(body.as_ref(), boundary);
    let mut pairs = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ExtractError::Multipart(err.to_string()))?
    {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|err| ExtractError::Multipart(err.to_string()))?;
        pairs.push((name, value));
    }
    Ok(pairs)
}

/// Declared pairs in first-seen order. A repeated key becomes one argument
/// whose values are joined with commas.
fn merge_declared(
    pairs: Vec<(String, String)>,
    definitions: &[InputVarDefinition],
) -> Vec<ApiArgument> {
    let mut merged: IndexMap<String, Vec<String>> = IndexMap::new();
    for (key, value) in pairs {
        if definitions.iter().any(|definition| definition.name == key) {
            merged.entry(key).or_default().push(value);
        }
    }
    merged
        .into_iter()
        .map(|(key, values)| ApiArgument::new(key, values.join(",")))
        .collect()
}

/// Lower-cased media type without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
