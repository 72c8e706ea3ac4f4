mod arguments;
mod config;
mod dispatcher;
mod input_vars;
mod logging;
mod openapi;
mod result;
mod server;
mod store;

pub use arguments::{ArgumentSource, ExtractError, InboundRequest, extract_arguments};
pub use config::{
    ConfigError, ParameterLocation, PublisherConfig, ResolutionStrategy, ResponseMode,
    SpecificationConfig,
};
pub use dispatcher::{DispatchError, DispatchMetricsSnapshot, DispatchOutcome, EndpointDispatcher};
pub use input_vars::{DEFAULT_MAX_LENGTH, InputVarDefinition, InputVarError};
pub use logging::init as init_logging;
pub use openapi::{
    OpenApiDocument, SpecificationError, build_document, generate_specification,
};
pub use result::ApiResult;
pub use server::{
    ErrorResponse, PublisherState, ReloadResponse, build_admin_app, build_publisher_app,
};
pub use store::{
    MemoryScriptStore, STORE_SCHEMA_VERSION, ScriptRecord, ScriptStore, ScriptStoreSnapshot,
    SharedScriptStore, StoreError, select_effective, select_published,
};
