pub mod documents;
pub mod error;
pub mod health;
pub mod views;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        documents::create_document,
        documents::get_document,
        documents::update_document,
        documents::delete_document,
        documents::query_documents,
        documents::listen_documents,
        health::health,
    ),
    components(schemas(
        documents::DocumentResponse,
        documents::DocumentChangeResponse,
        documents::QueryResponse,
        documents::SnapshotResponse,
        documents::CreateDocumentBody,
        documents::UpdateDocumentBody,
        documents::WhereClause,
        documents::OrderClause,
        documents::QueryBody,
        health::HealthResp,
    )),
    tags(
        (name = "Documents", description = "Collections, documents and live queries"),
        (name = "Health", description = "System health checks")
    )
)]
pub struct ApiDoc;
