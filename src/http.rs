//! JSON-over-HTTP adapter for the catalog.
//!
//! [`route`] is a pure function from (method, target, body) to a [`Reply`],
//! so the whole surface is testable without a socket. [`CatalogService`]
//! plugs it into `may_minihttp`.

use may_minihttp::{HttpService, Request, Response};
use serde::Serialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::io::{self, Read};

use crate::catalog::product::{parse_price, parse_units};
use crate::catalog::{Catalog, ProductDraft, ProductPatch};
use crate::error::{CatalogError, ErrorKind};

/// A rendered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(e) => Self::error(&CatalogError::Internal(format!("serialization failed: {e}"))),
        }
    }

    fn error(err: &CatalogError) -> Self {
        let status = status_for(err.kind());
        if status >= 500 {
            log::error!("Request failed: {}", err);
        }
        let body = json!({ "error": err.kind().as_str(), "message": err.to_string() });
        Self {
            status,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
        }
    }

    fn plain(status: u16, error: &str, message: &str) -> Self {
        let body = json!({ "error": error, "message": message });
        Self {
            status,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
        }
    }

    /// Parsed JSON body, for tests and clients.
    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::InvalidInput => 400,
        ErrorKind::NotFound => 404,
        ErrorKind::AlreadyExists => 409,
        ErrorKind::Unavailable => 503,
        ErrorKind::Internal => 500,
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

fn content_type_header(content_type: &str) -> &'static str {
    match content_type {
        "application/json" => "Content-Type: application/json",
        _ => "Content-Type: text/plain; version=0.0.4; charset=utf-8",
    }
}

/// Dispatch one request.
pub fn route(catalog: &Catalog, method: &str, target: &str, body: &[u8]) -> Reply {
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let result = match (method, segments.as_slice()) {
        ("GET", ["health"]) => Ok(Reply::json(200, &json!({ "status": "ok" }))),
        #[cfg(feature = "metrics")]
        ("GET", ["metrics"]) => render_metrics(),
        ("POST", ["api", "product-types"]) => create_category(catalog, body),
        ("GET", ["api", "product-types"]) => catalog
            .list_categories()
            .map(|categories| Reply::json(200, &categories)),
        ("POST", ["api", "products"]) => add_product(catalog, body),
        ("GET", ["api", "products"]) => catalog
            .list_all_products()
            .map(|rows| Reply::json(200, &rows)),
        ("GET", ["api", "products", "search"]) => {
            let term = query_param(query, "name").unwrap_or_default();
            catalog
                .search_products(&term)
                .map(|rows| Reply::json(200, &rows))
        }
        ("GET", ["api", "states"]) => catalog.list_states().map(|states| Reply::json(200, &states)),
        (_, ["api", "products", category, id]) => {
            product_route(catalog, method, category, id, body)
        }
        (_, ["health"])
        | (_, ["api", "product-types"])
        | (_, ["api", "products"])
        | (_, ["api", "states"]) => {
            return Reply::plain(405, "method_not_allowed", "method not allowed");
        }
        _ => return Reply::plain(404, "not_found", "no such route"),
    };

    result.unwrap_or_else(|e| Reply::error(&e))
}

fn product_route(
    catalog: &Catalog,
    method: &str,
    category: &str,
    id: &str,
    body: &[u8],
) -> Result<Reply, CatalogError> {
    let category = decode_segment(category)?;
    let id: i64 = id
        .parse()
        .map_err(|_| CatalogError::InvalidInput(format!("product id '{id}' is not an integer")))?;

    match method {
        "GET" => catalog
            .get_product(&category, id)
            .map(|product| Reply::json(200, &product)),
        "PUT" => {
            let patch = patch_from_json(&parse_body(body)?)?;
            catalog.update_product(&category, id, patch)?;
            Ok(Reply::json(200, &json!({ "message": "Product updated successfully" })))
        }
        "DELETE" => {
            catalog.delete_product(&category, id)?;
            Ok(Reply::json(200, &json!({ "message": "Product deleted successfully" })))
        }
        _ => Ok(Reply::plain(405, "method_not_allowed", "method not allowed")),
    }
}

fn create_category(catalog: &Catalog, body: &[u8]) -> Result<Reply, CatalogError> {
    let body = parse_body(body)?;
    let label = required_str(&body, "product_type")?;
    let category = catalog.register_category(label)?;
    Ok(Reply::json(
        201,
        &json!({ "message": "Product type created successfully", "name": category.name.as_str() }),
    ))
}

fn add_product(catalog: &Catalog, body: &[u8]) -> Result<Reply, CatalogError> {
    let body = parse_body(body)?;
    let category = required_str(&body, "product_type")?;
    let draft = ProductDraft {
        name: optional_str(&body, "productname")?,
        brand: optional_str(&body, "brand")?,
        classification_code: optional_str(&body, "hsn_code")?,
        unit_price: present(&body, "price").map(parse_price).transpose()?,
        units_per_case: present(&body, "per_case").map(parse_units).transpose()?,
    };
    let id = catalog.add_product(category, draft)?;
    Ok(Reply::json(
        201,
        &json!({ "message": "Product added successfully", "id": id }),
    ))
}

/// Absent fields stay untouched; `null` clears brand or hsn_code.
fn patch_from_json(body: &Value) -> Result<ProductPatch, CatalogError> {
    let clearable = |field: &str| -> Result<Option<String>, CatalogError> {
        match body.get(field) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(String::new())),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(CatalogError::InvalidInput(format!("{field} must be a string"))),
        }
    };
    Ok(ProductPatch {
        name: optional_str(body, "productname")?,
        brand: clearable("brand")?,
        classification_code: clearable("hsn_code")?,
        unit_price: present(body, "price").map(parse_price).transpose()?,
        units_per_case: present(body, "per_case").map(parse_units).transpose()?,
    })
}

fn parse_body(body: &[u8]) -> Result<Value, CatalogError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| CatalogError::InvalidInput(format!("request body is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(CatalogError::InvalidInput(
            "request body must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

fn present<'a>(body: &'a Value, field: &str) -> Option<&'a Value> {
    body.get(field).filter(|v| !v.is_null())
}

fn optional_str(body: &Value, field: &str) -> Result<Option<String>, CatalogError> {
    match present(body, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CatalogError::InvalidInput(format!("{field} must be a string"))),
    }
}

fn required_str<'a>(body: &'a Value, field: &str) -> Result<&'a str, CatalogError> {
    match present(body, field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(CatalogError::InvalidInput(format!("{field} must be a string"))),
        None => Err(CatalogError::InvalidInput(format!("{field} is required"))),
    }
}

fn decode_segment(segment: &str) -> Result<String, CatalogError> {
    urlencoding::decode(segment)
        .map(Cow::into_owned)
        .map_err(|_| CatalogError::InvalidInput("path is not valid UTF-8".to_string()))
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k != key {
            return None;
        }
        let v = v.replace('+', " ");
        urlencoding::decode(&v).ok().map(Cow::into_owned)
    })
}

#[cfg(feature = "metrics")]
fn render_metrics() -> Result<Reply, CatalogError> {
    let body = crate::metrics::METRICS
        .render()
        .map_err(|e| CatalogError::Internal(format!("metrics encoding failed: {e}")))?;
    Ok(Reply {
        status: 200,
        content_type: "text/plain",
        body,
    })
}

/// `may_minihttp` service; one clone per connection.
#[derive(Clone)]
pub struct CatalogService {
    catalog: Catalog,
}

impl CatalogService {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

impl HttpService for CatalogService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let method = req.method().to_string();
        let target = req.path().to_string();
        let mut body = Vec::new();
        req.body().read_to_end(&mut body)?;

        let reply = route(&self.catalog, &method, &target, &body);
        log::debug!("{} {} -> {}", method, target, reply.status);

        res.status_code(usize::from(reply.status), reason(reply.status));
        res.header(content_type_header(reply.content_type));
        res.body_vec(reply.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::catalog::StateCode;
    use std::sync::Arc;

    fn catalog() -> Catalog {
        Catalog::new(Arc::new(MemoryBackend::new()))
    }

    fn call(catalog: &Catalog, method: &str, target: &str, body: Value) -> Reply {
        route(catalog, method, target, body.to_string().as_bytes())
    }

    #[test]
    fn test_create_and_list_product_types() {
        let c = catalog();
        let reply = call(&c, "POST", "/api/product-types", json!({ "product_type": "Cold Drinks" }));
        assert_eq!(reply.status, 201);
        assert_eq!(reply.json_body()["name"], "cold_drinks");

        let reply = call(&c, "POST", "/api/product-types", json!({ "product_type": "cold drinks" }));
        assert_eq!(reply.status, 409);
        assert_eq!(reply.json_body()["error"], "already_exists");

        let reply = route(&c, "GET", "/api/product-types", b"");
        assert_eq!(reply.status, 200);
        assert_eq!(reply.json_body()[0]["label"], "Cold Drinks");
    }

    #[test]
    fn test_add_product_and_fetch() {
        let c = catalog();
        call(&c, "POST", "/api/product-types", json!({ "product_type": "soap" }));
        let reply = call(
            &c,
            "POST",
            "/api/products",
            json!({
                "product_type": "Soap",
                "productname": "Lux",
                "brand": "HUL",
                "hsn_code": "3401",
                "price": "12.5",
                "per_case": "24"
            }),
        );
        assert_eq!(reply.status, 201);
        let id = reply.json_body()["id"].as_i64().unwrap();

        let reply = route(&c, "GET", &format!("/api/products/soap/{id}"), b"");
        assert_eq!(reply.status, 200);
        let body = reply.json_body();
        assert_eq!(body["productname"], "Lux");
        assert_eq!(body["price"], "12.50");
        assert_eq!(body["per_case"], 24);
    }

    #[test]
    fn test_bad_input_is_400() {
        let c = catalog();
        call(&c, "POST", "/api/product-types", json!({ "product_type": "soap" }));

        let reply = route(&c, "POST", "/api/products", b"not json");
        assert_eq!(reply.status, 400);

        let reply = call(
            &c,
            "POST",
            "/api/products",
            json!({ "product_type": "soap", "productname": "Lux", "price": 10, "per_case": "12abc" }),
        );
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json_body()["error"], "invalid_input");

        let reply = call(&c, "POST", "/api/product-types", json!({ "product_type": "a;b" }));
        assert_eq!(reply.status, 400);

        let reply = route(&c, "GET", "/api/products/soap/abc", b"");
        assert_eq!(reply.status, 400);
    }

    #[test]
    fn test_unknown_category_is_404() {
        let c = catalog();
        let reply = call(
            &c,
            "POST",
            "/api/products",
            json!({ "product_type": "nope", "productname": "Lux", "price": 1, "per_case": 1 }),
        );
        assert_eq!(reply.status, 404);
        assert_eq!(route(&c, "DELETE", "/api/products/nope/1", b"").status, 404);
    }

    #[test]
    fn test_update_and_delete() {
        let c = catalog();
        call(&c, "POST", "/api/product-types", json!({ "product_type": "soap" }));
        let reply = call(
            &c,
            "POST",
            "/api/products",
            json!({ "product_type": "soap", "productname": "Lux", "brand": "HUL", "price": 10, "per_case": 12 }),
        );
        let id = reply.json_body()["id"].as_i64().unwrap();

        let reply = call(&c, "PUT", &format!("/api/products/soap/{id}"), json!({ "brand": null, "price": 11 }));
        assert_eq!(reply.status, 200);
        let body = route(&c, "GET", &format!("/api/products/soap/{id}"), b"").json_body();
        assert_eq!(body["brand"], Value::Null);
        assert_eq!(body["price"], "11.00");

        let reply = call(&c, "PUT", &format!("/api/products/soap/{id}"), json!({}));
        assert_eq!(reply.status, 400);

        assert_eq!(route(&c, "DELETE", &format!("/api/products/soap/{id}"), b"").status, 200);
        assert_eq!(route(&c, "DELETE", &format!("/api/products/soap/{id}"), b"").status, 404);
    }

    #[test]
    fn test_states_are_listed_by_code() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_states(vec![
            StateCode::new("33", "Tamil Nadu"),
            StateCode::new("29", "Karnataka"),
        ]);
        let c = Catalog::new(backend);

        let reply = route(&c, "GET", "/api/states", b"");
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.json_body(),
            json!([
                { "code": "29", "state_name": "Karnataka" },
                { "code": "33", "state_name": "Tamil Nadu" }
            ])
        );
        assert_eq!(route(&c, "POST", "/api/states", b"{}").status, 405);
    }

    #[test]
    fn test_search_decodes_query() {
        let c = catalog();
        call(&c, "POST", "/api/product-types", json!({ "product_type": "cold drinks" }));
        call(
            &c,
            "POST",
            "/api/products",
            json!({ "product_type": "cold drinks", "productname": "Cola 500ml", "price": 40, "per_case": 24 }),
        );

        let reply = route(&c, "GET", "/api/products/search?name=cola+500", b"");
        assert_eq!(reply.status, 200);
        let rows = reply.json_body();
        assert_eq!(rows[0]["product_type"], "cold_drinks");

        let reply = route(&c, "GET", "/api/products/search?name=", b"");
        assert_eq!(reply.status, 400);

        let reply = route(&c, "GET", "/api/products/cold%20drinks/1", b"");
        assert_eq!(reply.status, 200);
    }

    #[test]
    fn test_routing_fallbacks() {
        let c = catalog();
        assert_eq!(route(&c, "GET", "/health", b"").status, 200);
        assert_eq!(route(&c, "GET", "/nope", b"").status, 404);
        assert_eq!(route(&c, "DELETE", "/api/products", b"").status, 405);
    }

    #[test]
    fn test_unavailable_is_503() {
        let backend = Arc::new(MemoryBackend::new());
        let c = Catalog::new(backend.clone());
        backend.set_unavailable(true);
        let reply = route(&c, "GET", "/api/products", b"");
        assert_eq!(reply.status, 503);
        assert_eq!(reply.json_body()["error"], "unavailable");
    }
}
