//! API description document for the published script endpoints.
//!
//! The document is rebuilt from the store on every call, so publishing or
//! unpublishing a script shows up on the next request.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    config::{ParameterLocation, SpecificationConfig},
    input_vars::InputVarDefinition,
    logging::category_openapi,
    store::{ScriptRecord, ScriptStore, StoreError},
};

pub const OPENAPI_VERSION: &str = "3.0.1";
pub const ENDPOINT_PATH_PREFIX: &str = "/Index/";

#[derive(Clone, Debug, Serialize)]
pub struct OpenApiDocument {
    pub openapi: &'static str,
    pub info: Info,
    pub servers: Vec<Server>,
    pub paths: IndexMap<String, PathItem>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Info {
    pub title: String,
    pub version: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Server {
    pub url: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PathItem {
    pub post: Operation,
}

#[derive(Clone, Debug, Serialize)]
pub struct Operation {
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    pub responses: IndexMap<String, Response>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub schema: Schema,
}

#[derive(Clone, Debug, Serialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct Response {
    pub description: String,
}

#[derive(Debug)]
pub enum SpecificationError {
    Store(StoreError),
    Encode(serde_json::Error),
}

impl std::fmt::Display for SpecificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecificationError::Store(err) => write!(f, "{err}"),
            SpecificationError::Encode(err) => write!(f, "failed to encode document: {err}"),
        }
    }
}

impl std::error::Error for SpecificationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpecificationError::Store(err) => Some(err),
            SpecificationError::Encode(err) => Some(err),
        }
    }
}

impl From<StoreError> for SpecificationError {
    fn from(err: StoreError) -> Self {
        SpecificationError::Store(err)
    }
}

/// Lists the published scripts and describes each as one POST operation.
pub async fn generate_specification(
    store: &dyn ScriptStore,
    config: &SpecificationConfig,
) -> Result<serde_json::Value, SpecificationError> {
    let scripts = store.published_scripts().await?;
    let document = build_document(&scripts, config);
    debug!(
        "{} generated document with {} paths",
        category_openapi(),
        document.paths.len()
    );
    serde_json::to_value(&document).map_err(SpecificationError::Encode)
}

/// Assembles the document for `scripts`, which the store hands out already
/// ordered by endpoint identifier.
pub fn build_document(scripts: &[ScriptRecord], config: &SpecificationConfig) -> OpenApiDocument {
    let paths = scripts
        .iter()
        .map(|script| {
            (
                format!("{ENDPOINT_PATH_PREFIX}{}", script.endpoint_id),
                PathItem {
                    post: operation_for(script, config.parameter_location),
                },
            )
        })
        .collect();

    OpenApiDocument {
        openapi: OPENAPI_VERSION,
        info: Info {
            title: config.title.clone(),
            version: config.version.clone(),
        },
        servers: vec![Server {
            url: config.server_url.clone(),
        }],
        paths,
    }
}

fn operation_for(script: &ScriptRecord, location: ParameterLocation) -> Operation {
    let parameters = script
        .input_vars
        .iter()
        .filter_map(|raw| match InputVarDefinition::parse(raw) {
            Ok(definition) => Some(Parameter {
                name: definition.name,
                location,
                schema: Schema { kind: "string" },
            }),
            Err(err) => {
                warn!(
                    "{} skipping parameter of endpoint={}: {err}",
                    category_openapi(),
                    script.endpoint_id
                );
                None
            }
        })
        .collect();

    let mut responses = IndexMap::new();
    responses.insert(
        "200".to_string(),
        Response {
            description: "OK".to_string(),
        },
    );

    Operation {
        description: script.description.clone(),
        parameters,
        responses,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::{
        config::ResolutionStrategy,
        store::{
            MemoryScriptStore,
            fixtures::{past, record},
        },
    };

    fn script(id: &str, description: &str, inputs: &[&str], published: bool) -> ScriptRecord {
        let mut script = record(id, 1, if published { past() } else { None });
        script.description = description.to_string();
        script.input_vars = inputs.iter().map(|input| input.to_string()).collect();
        script
    }

    fn sample_store() -> MemoryScriptStore {
        MemoryScriptStore::with_records(
            ResolutionStrategy::Versioned,
            vec![
                script("sum", "adds numbers", &["x", "y"], true),
                script("greet", "says hi", &["name"], true),
                script("draft", "not yet", &["q"], false),
            ],
        )
    }

    fn path_keys(document: &Value) -> Vec<String> {
        document["paths"]
            .as_object()
            .expect("paths should be an object")
            .keys()
            .cloned()
            .collect()
    }

    fn parameter_names(operation: &Value) -> Vec<String> {
        operation["parameters"]
            .as_array()
            .map(|parameters| {
                parameters
                    .iter()
                    .map(|parameter| parameter["name"].as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn describes_published_scripts_in_identifier_order() {
        let store = sample_store();
        let document = generate_specification(&store, &SpecificationConfig::default())
            .await
            .expect("document should build");

        assert_eq!(document["openapi"], OPENAPI_VERSION);
        assert_eq!(document["info"]["version"], "1.0.0");
        assert_eq!(document["servers"][0]["url"], "/api");
        assert_eq!(path_keys(&document), ["/Index/greet", "/Index/sum"]);

        let greet = &document["paths"]["/Index/greet"]["post"];
        assert_eq!(greet["description"], "says hi");
        assert_eq!(parameter_names(greet), ["name"]);
        assert_eq!(greet["parameters"][0]["in"], "header");
        assert_eq!(greet["parameters"][0]["schema"]["type"], "string");
        assert_eq!(greet["responses"]["200"]["description"], "OK");

        let sum = &document["paths"]["/Index/sum"]["post"];
        assert_eq!(sum["description"], "adds numbers");
        assert_eq!(parameter_names(sum), ["x", "y"]);
        assert_eq!(
            document["paths"]["/Index/sum"]
                .as_object()
                .expect("path item")
                .len(),
            1
        );
    }

    #[test]
    fn parameter_names_drop_length_suffix_and_follow_location() {
        let config = SpecificationConfig {
            parameter_location: ParameterLocation::Query,
            ..SpecificationConfig::default()
        };
        let document = build_document(
            &[script("greet", "says hi", &["name:12", "bad:x"], true)],
            &config,
        );
        let operation = &document.paths["/Index/greet"].post;
        let names = operation
            .parameters
            .iter()
            .map(|parameter| parameter.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["name"]);
        assert_eq!(operation.parameters[0].location, ParameterLocation::Query);
    }

    #[test]
    fn scripts_without_inputs_omit_parameters() {
        let document = build_document(
            &[script("ping", "", &[], true)],
            &SpecificationConfig::default(),
        );
        let value = serde_json::to_value(&document).expect("document should serialize");
        assert!(value["paths"]["/Index/ping"]["post"].get("parameters").is_none());
    }

    #[tokio::test]
    async fn reparsed_document_matches_and_tracks_publication() {
        let store = sample_store();
        let config = SpecificationConfig::default();
        let first = generate_specification(&store, &config)
            .await
            .expect("document should build");

        let text = serde_json::to_string(&first).expect("document should encode");
        let reparsed: Value = serde_json::from_str(&text).expect("document should decode");
        assert_eq!(path_keys(&reparsed), path_keys(&first));
        for key in path_keys(&first) {
            let before = &first["paths"][&key]["post"];
            let after = &reparsed["paths"][&key]["post"];
            assert_eq!(parameter_names(after), parameter_names(before));
            assert_eq!(after["description"], before["description"]);
        }

        store
            .replace_all(vec![
                script("greet", "says hi", &["name"], true),
                script("draft", "not yet", &["q"], true),
            ])
            .await;
        let second = generate_specification(&store, &config)
            .await
            .expect("document should build");
        assert_eq!(path_keys(&second), ["/Index/draft", "/Index/greet"]);
    }

    struct DownStore;

    #[async_trait::async_trait]
    impl ScriptStore for DownStore {
        async fn effective_script(
            &self,
            _endpoint_id: &str,
        ) -> Result<Option<ScriptRecord>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn published_scripts(&self) -> Result<Vec<ScriptRecord>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn store_outage_is_reported_as_store_error() {
        let err = generate_specification(&DownStore, &SpecificationConfig::default())
            .await
            .expect_err("document needs the store");
        assert!(matches!(err, SpecificationError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn first_match_document_describes_the_record_that_runs() {
        let mut unpublished_first = script("greet", "draft", &["a"], false);
        unpublished_first.version = 3;
        let mut published_later = script("greet", "live", &["b"], true);
        published_later.version = 7;
        let mut sum_first = script("sum", "current", &["x"], true);
        sum_first.version = 1;
        let mut sum_later = script("sum", "newer", &["y"], true);
        sum_later.version = 2;
        let store = MemoryScriptStore::with_records(
            ResolutionStrategy::FirstMatch,
            vec![unpublished_first, published_later, sum_first, sum_later],
        );

        let document = generate_specification(&store, &SpecificationConfig::default())
            .await
            .expect("document should build");
        assert_eq!(path_keys(&document), ["/Index/sum"]);

        let served = store
            .effective_script("sum")
            .await
            .expect("lookup")
            .expect("sum should resolve");
        let sum = &document["paths"]["/Index/sum"]["post"];
        assert_eq!(sum["description"], served.description.as_str());
        assert_eq!(parameter_names(sum), ["x"]);
    }
}
