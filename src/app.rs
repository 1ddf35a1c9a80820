#![cfg(feature = "web")]
//! HTTP layer: HTML forms, the JSON API and routing.

use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post, put},
};
use handlebars::Handlebars;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::services::ServeFile;

use crate::catalog::{Product, ProductCatalog};
use crate::choices::{OperationKind, Plot, choices};
use crate::config::ServerConfig;
use crate::downloader;
use crate::error::LogbookError;
use crate::history::{ALL, FilterQuery, Page, paginate};
use crate::journal::OperationLog;
use crate::record::{OperationDetails, OperationRecord, Selection};
use crate::recorder::{Recorded, Recorder};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub struct AppState {
    catalog: ProductCatalog,
    log: Box<dyn OperationLog>,
    templates: Handlebars<'static>,
    page_size: usize,
    logo: PathBuf,
}

impl AppState {
    pub fn new(
        catalog: ProductCatalog,
        log: Box<dyn OperationLog>,
        page_size: usize,
        logo: PathBuf,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut templates = Handlebars::new();
        templates.register_template_string("logbook", include_str!("./static/logbook.html"))?;
        templates.register_template_string("history", include_str!("./static/history.html"))?;
        Ok(AppState {
            catalog,
            log,
            templates,
            page_size,
            logo,
        })
    }

    fn render(&self, name: &str, context: &serde_json::Value) -> Result<Html<String>, AppError> {
        self.templates
            .render(name, context)
            .map(Html)
            .map_err(|e| AppError::Internal(format!("template {} failed: {}", name, e)))
    }
}

pub type SharedState = Arc<AppState>;

/// Error returned by handlers, rendered as a JSON body.
#[derive(Debug)]
pub enum AppError {
    Logbook(LogbookError),
    Internal(String),
}

impl From<LogbookError> for AppError {
    fn from(e: LogbookError) -> Self {
        AppError::Logbook(e)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Logbook(LogbookError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Logbook(LogbookError::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Logbook(LogbookError::validation(rejection.body_text()))
    }
}

/// `Json` whose rejections go through [`AppError`], so a bad body gets the
/// same 400 envelope as any other validation error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
struct ApiJson<T>(T);

/// `Query` with [`AppError`] rejections.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
struct ApiQuery<T>(T);

/// `Path` with [`AppError`] rejections.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
struct ApiPath<T>(T);

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Logbook(LogbookError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Logbook(LogbookError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Logbook(LogbookError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Logbook(LogbookError::Remote(_))
            | AppError::Logbook(LogbookError::PartialWrite { .. }) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Logbook(e) => e.to_string(),
            AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self.message());
        }
        (
            status,
            Json(json!({ "status": "error", "message": self.message() })),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ApiResponse<T> {
    status: &'static str,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { status: "ok", data })
}

/// Runs a storage call on the blocking pool; files and the remote client
/// both block.
async fn blocking<T, F>(state: &SharedState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&AppState) -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| AppError::Internal(format!("storage task failed: {}", e)))?
        .map_err(AppError::from)
}

pub fn router(state: SharedState) -> Router {
    let logo = ServeFile::new(state.logo.clone());
    Router::new()
        .route("/", get(serve_logbook))
        .route("/products", post(handle_add_product))
        .route("/products/:index/edit", post(handle_edit_product))
        .route("/products/:index/delete", post(handle_delete_product))
        .route("/operations", post(handle_record))
        .route("/history", get(serve_history))
        .route("/history/export", get(export_history))
        .route_service("/logo", logo)
        .route("/api/choices", get(get_choices))
        .route("/api/products", get(list_products).post(add_product))
        .route("/api/products/:index", put(edit_product).delete(delete_product))
        .route("/api/operations", get(list_operations).post(record_operation))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = config.storage.open_catalog();
    catalog.ensure_exists()?;
    // the remote backend owns a blocking HTTP client, which must not be
    // built on a runtime thread
    let storage = config.storage.clone();
    let log = tokio::task::spawn_blocking(move || storage.open_log()).await??;
    info!("product catalog: {}", catalog.path().display());
    info!("operation log: {}", log.describe());

    let state = AppState::new(catalog, log, config.page_size, config.logo.clone())?;
    let app = router(Arc::new(state));

    let listener = TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn request_logging(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;

    info!(
        "{} {} - {} - {}ms",
        method,
        uri.path(),
        response.status(),
        start.elapsed().as_millis()
    );
    response
}

// Form and query payloads

#[derive(Debug, Default, Deserialize)]
struct FlashQuery {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductForm {
    designation: String,
    dose: String,
    target: String,
    #[serde(default)]
    application_mode: Option<String>,
    /// Designation shown at this index when the page was rendered.
    #[serde(default)]
    expected: Option<String>,
}

impl ProductForm {
    fn product(&self) -> Product {
        Product {
            designation: self.designation.clone(),
            dose: self.dose.clone(),
            target: self.target.clone(),
            application_mode: self.application_mode.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExpectedQuery {
    #[serde(default)]
    expected: Option<String>,
}

/// The record form. Treatment and irrigation fields are both present on
/// the page; only those of the chosen operation are read.
#[derive(Debug, Deserialize)]
struct OperationForm {
    greenhouse: String,
    #[serde(default)]
    plots: Vec<String>,
    crop: String,
    operation: String,
    #[serde(default)]
    treatment: Option<String>,
    #[serde(default)]
    products: Vec<String>,
    #[serde(default)]
    solution: Option<String>,
    #[serde(default)]
    ec: Option<String>,
}

fn required<'a>(value: &'a Option<String>, what: &str) -> crate::error::Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| LogbookError::validation(format!("{} is required", what)))
}

impl OperationForm {
    fn selection(&self) -> crate::error::Result<Selection> {
        let details = match self.operation.parse::<OperationKind>()? {
            OperationKind::Treatment => OperationDetails::Treatment {
                treatment: required(&self.treatment, "treatment type")?.parse()?,
                products: self.products.clone(),
            },
            OperationKind::Irrigation => OperationDetails::Irrigation {
                solution: required(&self.solution, "solution")?.parse()?,
                ec: required(&self.ec, "EC")?.parse()?,
            },
        };
        Ok(Selection {
            greenhouse: self.greenhouse.parse()?,
            plots: self
                .plots
                .iter()
                .map(|p| p.parse::<Plot>())
                .collect::<crate::error::Result<_>>()?,
            crop: self.crop.parse()?,
            details,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    greenhouse: Option<String>,
    crop: Option<String>,
    operation: Option<String>,
    treatment: Option<String>,
    page: Option<usize>,
}

impl HistoryQuery {
    fn filter(&self) -> FilterQuery {
        FilterQuery {
            greenhouse: self.greenhouse.clone(),
            crop: self.crop.clone(),
            operation: self.operation.clone(),
            treatment: self.treatment.clone(),
        }
    }
}

fn redirect_message(path: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?message={}", path, urlencoding::encode(message)))
}

fn redirect_error(path: &str, e: &AppError) -> Redirect {
    Redirect::to(&format!("{}?error={}", path, urlencoding::encode(&e.message())))
}

// HTML pages

async fn serve_logbook(
    State(state): State<SharedState>,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let products = blocking(&state, |s| s.catalog.list()).await?;
    let rows: Vec<_> = products
        .iter()
        .enumerate()
        .map(|(index, p)| json!({ "index": index, "product": p }))
        .collect();
    let context = json!({
        "choices": choices(),
        "products": rows,
        "product_names": products.iter().map(|p| &p.designation).collect::<Vec<_>>(),
        "message": flash.message,
        "error": flash.error,
        "logo": state.logo.exists(),
    });
    state.render("logbook", &context)
}

async fn handle_add_product(
    State(state): State<SharedState>,
    axum::Form(form): axum::Form<ProductForm>,
) -> Redirect {
    let product = form.product();
    match blocking(&state, move |s| s.catalog.add(&product)).await {
        Ok(p) => redirect_message(
            "/",
            &format!("Product added: {} | {} | {}", p.designation, p.dose, p.target),
        ),
        Err(e) => redirect_error("/", &e),
    }
}

async fn handle_edit_product(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
    axum::Form(form): axum::Form<ProductForm>,
) -> Redirect {
    let product = form.product();
    let expected = form.expected;
    match blocking(&state, move |s| s.catalog.edit(index, &product, expected.as_deref())).await {
        Ok(p) => redirect_message(
            "/",
            &format!("Product modified: {} | {} | {}", p.designation, p.dose, p.target),
        ),
        Err(e) => redirect_error("/", &e),
    }
}

async fn handle_delete_product(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
    axum::Form(form): axum::Form<ExpectedQuery>,
) -> Redirect {
    let expected = form.expected;
    match blocking(&state, move |s| s.catalog.delete(index, expected.as_deref())).await {
        Ok(p) => redirect_message("/", &format!("Product deleted: {}", p.designation)),
        Err(e) => redirect_error("/", &e),
    }
}

async fn handle_record(
    State(state): State<SharedState>,
    axum_extra::extract::Form(form): axum_extra::extract::Form<OperationForm>,
) -> Redirect {
    let selection = match form.selection() {
        Ok(selection) => selection,
        Err(e) => return redirect_error("/", &AppError::from(e)),
    };
    match record(&state, selection).await {
        Ok(recorded) => redirect_message(
            "/",
            &format!("Recorded in sheet {}", recorded.worksheets.join(", ")),
        ),
        Err(e) => redirect_error("/", &e),
    }
}

async fn record(state: &SharedState, selection: Selection) -> Result<Recorded, AppError> {
    blocking(state, move |s| {
        Recorder::new(&s.catalog, s.log.as_ref()).record(&selection)
    })
    .await
}

async fn filtered(state: &SharedState, query: FilterQuery) -> Result<Vec<OperationRecord>, AppError> {
    let filter = query.parse()?;
    let records = blocking(state, |s| s.log.read_all()).await?;
    Ok(filter.apply(&records))
}

fn filter_query_string(query: &FilterQuery) -> String {
    let field = |v: &Option<String>| {
        urlencoding::encode(v.as_deref().filter(|s| !s.is_empty()).unwrap_or(ALL)).into_owned()
    };
    format!(
        "greenhouse={}&crop={}&operation={}&treatment={}",
        field(&query.greenhouse),
        field(&query.crop),
        field(&query.operation),
        field(&query.treatment)
    )
}

async fn serve_history(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Html<String>, AppError> {
    let filter = query.filter();
    let records = filtered(&state, filter.clone()).await?;
    let page = paginate(&records, query.page.unwrap_or(1), state.page_size);
    let selected = |v: &Option<String>| v.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| ALL.to_string());
    let context = json!({
        "choices": choices(),
        "selected": {
            "greenhouse": selected(&filter.greenhouse),
            "crop": selected(&filter.crop),
            "operation": selected(&filter.operation),
            "treatment": selected(&filter.treatment),
        },
        "page": &page,
        "prev": page.previous(),
        "next": page.next(),
        "query": filter_query_string(&filter),
    });
    state.render("history", &context)
}

async fn export_history(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Response, AppError> {
    let records = filtered(&state, query.filter()).await?;
    let bytes = downloader::to_xlsx(&records)?;
    let name = downloader::export_file_name(chrono::Local::now().date_naive());
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name),
            ),
        ],
        bytes,
    )
        .into_response())
}

// JSON API

async fn get_choices() -> impl IntoResponse {
    ok(choices())
}

async fn list_products(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    let products = blocking(&state, |s| s.catalog.list()).await?;
    Ok(ok(products))
}

async fn add_product(
    State(state): State<SharedState>,
    ApiJson(product): ApiJson<Product>,
) -> Result<impl IntoResponse, AppError> {
    let product = blocking(&state, move |s| s.catalog.add(&product)).await?;
    Ok((StatusCode::CREATED, ok(product)))
}

#[derive(Debug, Deserialize)]
struct EditProduct {
    #[serde(flatten)]
    product: Product,
    #[serde(default)]
    expected: Option<String>,
}

async fn edit_product(
    State(state): State<SharedState>,
    ApiPath(index): ApiPath<usize>,
    ApiJson(body): ApiJson<EditProduct>,
) -> Result<impl IntoResponse, AppError> {
    let product = blocking(&state, move |s| {
        s.catalog.edit(index, &body.product, body.expected.as_deref())
    })
    .await?;
    Ok(ok(product))
}

async fn delete_product(
    State(state): State<SharedState>,
    ApiPath(index): ApiPath<usize>,
    ApiQuery(query): ApiQuery<ExpectedQuery>,
) -> Result<impl IntoResponse, AppError> {
    let removed = blocking(&state, move |s| s.catalog.delete(index, query.expected.as_deref())).await?;
    Ok(ok(removed))
}

async fn record_operation(
    State(state): State<SharedState>,
    ApiJson(selection): ApiJson<Selection>,
) -> Result<impl IntoResponse, AppError> {
    let recorded = record(&state, selection).await?;
    Ok((StatusCode::CREATED, ok(recorded)))
}

async fn list_operations(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<ApiResponse<Page<OperationRecord>>>, AppError> {
    let records = filtered(&state, query.filter()).await?;
    Ok(ok(paginate(&records, query.page.unwrap_or(1), state.page_size)))
}
