//! `OpenAPI` documentation generation and Swagger UI setup

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// `OpenAPI` documentation for Codetriever API
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::query::query_handler,
        crate::routes::index::index_handler,
        crate::routes::status::status_handler,
    ),
    components(
        schemas(
            // Query schemas
            crate::routes::query::QueryRequest,
            crate::routes::query::AgentResponse,
            crate::routes::query::SourceEntry,
            crate::routes::query::SourcesSummaryBody,
            crate::routes::query::ChunkKindBody,
            crate::routes::query::ResponseMeta,

            // Index schemas
            crate::routes::index::IndexRequest,
            crate::routes::index::IndexResponse,
            crate::routes::index::IndexError,

            // Status schemas
            crate::routes::status::StatusResponse,
            crate::routes::status::ManifestStatsBody,

            // Common schemas
            crate::error::AgentErrorResponse,
            crate::error::ErrorBody,
        )
    ),
    tags(
        (name = "query", description = "Knowledge engine query operations"),
        (name = "index", description = "Indexing pipeline operations"),
        (name = "status", description = "Per-scope index status"),
    ),
    info(
        title = "Codetriever API",
        version = "0.2.0",
        description = "Retrieval-augmented knowledge engine over a source/docs workspace",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://127.0.0.1:8787", description = "Local development server"),
    )
)]
pub struct ApiDoc;

/// Returns configured Swagger UI service
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
