use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use recordstore_core::TenantId;
use recordstore_events::TENANT_HEADER;

use crate::context::TenantContext;

/// Derive the tenant context from the `x-tenant` header.
///
/// Domain routes refuse requests without a valid tenant; there is no
/// fallback tenant.
pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let tenant_id = extract_tenant(req.headers())?;

    req.extensions_mut().insert(TenantContext::new(tenant_id));

    Ok(next.run(req).await)
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, StatusCode> {
    let header = headers.get(TENANT_HEADER).ok_or(StatusCode::BAD_REQUEST)?;

    let header = header.to_str().map_err(|_| StatusCode::BAD_REQUEST)?;

    header.trim().parse().map_err(|_| StatusCode::BAD_REQUEST)
}
