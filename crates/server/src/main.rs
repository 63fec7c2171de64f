//! Apex Server
//!
//! Axum server exposing the storefront session as a versioned JSON API:
//! catalog browsing, the cart, the insight panels, and the streaming AI
//! coach. One in-memory session per process; nothing persists.

use apex_core::catalog::{Catalog, Category, FilterState, Product, SortMode};
use apex_core::coach::{ChatMessage, ChatRole};
use apex_core::events::{StoreEvent, StoreEventKind};
use apex_core::insight::{
    GeminiInsight, InsightConfig, InsightProvider, MacroProfile,
};
use apex_core::session::Session;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, patch, post},
    Router,
};
use clap::{Parser, Subcommand};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{broadcast, RwLock},
};
use utoipa::{OpenApi, ToSchema};

/// Generic notice shown whenever a provider call fails, whatever the cause
const INSIGHT_FAILURE_NOTICE: &str = "Could not load insight. Try again in a moment.";

/// Application state
struct AppState {
    /// Immutable product set, loaded once at startup
    catalog: Catalog,
    /// The single user session
    session: RwLock<Session>,
    /// Model selection for the insight provider
    insight: InsightConfig,
    event_tx: broadcast::Sender<StoreEvent>,
}

type SharedState = Arc<AppState>;

impl AppState {
    /// Build a provider client for one call. The API key is read from the
    /// environment each time, so keys added after startup are picked up
    /// and a missing key is just another provider failure.
    fn provider(&self) -> Result<GeminiInsight, apex_core::insight::InsightError> {
        GeminiInsight::from_env(&self.insight)
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.event_tx.send(event);
    }
}

// === API Types ===

#[derive(Serialize, ToSchema)]
struct ApiResponse {
    success: bool,
    message: String,
}

impl ApiResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }

    fn fail(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            message: message.into(),
        })
    }
}

#[derive(Serialize, ToSchema)]
struct ProductResponse {
    id: String,
    name: String,
    price: f64,
    category: String,
    category_label: String,
    description: String,
    image: String,
    rating: f64,
    stock_status: Option<String>,
    badge: Option<String>,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            price: p.price,
            category: p.category.as_str().to_string(),
            category_label: p.category.display_name().to_string(),
            description: p.description.clone(),
            image: p.image.clone(),
            rating: p.rating,
            stock_status: p.stock_status.map(|s| s.as_str().to_string()),
            badge: p.badge.map(|b| b.as_str().to_string()),
        }
    }
}

#[derive(Serialize, ToSchema)]
struct FilterStateResponse {
    /// Selected category id, absent meaning "All"
    category: Option<String>,
    query: String,
    sort: String,
    /// Whether any filter deviates from the defaults
    active: bool,
}

impl From<&FilterState> for FilterStateResponse {
    fn from(f: &FilterState) -> Self {
        Self {
            category: f.category.map(|c| c.as_str().to_string()),
            query: f.query.clone(),
            sort: f.sort.as_str().to_string(),
            active: f.is_active(),
        }
    }
}

#[derive(Serialize, ToSchema)]
struct CatalogResponse {
    products: Vec<ProductResponse>,
    filters: FilterStateResponse,
    /// Size of the full catalog
    total: usize,
    /// Size of the filtered view
    shown: usize,
}

#[derive(Serialize, ToSchema)]
struct CategoryInfo {
    id: String,
    name: String,
}

#[derive(Serialize, ToSchema)]
struct CategoriesResponse {
    categories: Vec<CategoryInfo>,
}

#[derive(Deserialize, ToSchema)]
struct UpdateFiltersRequest {
    /// Category id, or "all" to clear the selector
    category: Option<String>,
    query: Option<String>,
    sort: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct CartLineResponse {
    product_id: String,
    name: String,
    unit_price: f64,
    quantity: u32,
    line_total: f64,
}

#[derive(Serialize, ToSchema)]
struct CartResponse {
    lines: Vec<CartLineResponse>,
    subtotal: f64,
    /// Sum of quantities across lines (display count)
    item_count: u32,
}

#[derive(Deserialize, ToSchema)]
struct AddCartItemRequest {
    product_id: String,
}

#[derive(Deserialize, ToSchema)]
struct UpdateQuantityRequest {
    /// Signed quantity change; the result is clamped at a floor of 1
    delta: i64,
}

#[derive(Serialize, ToSchema)]
struct CheckoutResponse {
    success: bool,
    subtotal: f64,
    item_count: u32,
    message: String,
    completed_at: String,
}

/// Topic chips offered by the health-tip picker
const TIP_TOPICS: [&str; 7] = [
    "Protein Intake",
    "Recovery",
    "Pre-workout",
    "Vitamin D",
    "Creatine",
    "Sleep",
    "Progressive Overload",
];

#[derive(Serialize, ToSchema)]
struct TopicsResponse {
    topics: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
struct HealthTipRequest {
    topic: String,
}

#[derive(Serialize, ToSchema)]
struct HealthTipResponse {
    success: bool,
    tip: Option<HealthTipBody>,
    message: String,
}

#[derive(Serialize, ToSchema)]
struct HealthTipBody {
    title: String,
    content: String,
    tags: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
struct MacroEstimateRequest {
    weight_kg: f64,
    height_cm: f64,
    age: u32,
    activity_level: String,
    goal: String,
}

#[derive(Serialize, ToSchema)]
struct MacroEstimateResponse {
    success: bool,
    estimate: Option<MacroEstimateBody>,
    message: String,
}

#[derive(Serialize, ToSchema)]
struct MacroEstimateBody {
    calories: f64,
    protein: f64,
    carbs: f64,
    fats: f64,
    explanation: String,
}

#[derive(Serialize, ToSchema)]
struct ProductInsightResponse {
    success: bool,
    insight: Option<ProductInsightBody>,
    message: String,
}

#[derive(Serialize, ToSchema)]
struct ProductInsightBody {
    verdict: String,
    benefits: Vec<String>,
    pro_tip: String,
}

#[derive(Serialize, ToSchema)]
struct ChatMessageResponse {
    role: String,
    text: String,
    timestamp: String,
}

impl From<&ChatMessage> for ChatMessageResponse {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: match m.role {
                ChatRole::User => "user".to_string(),
                ChatRole::Coach => "coach".to_string(),
            },
            text: m.text.clone(),
            timestamp: m.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
struct CoachResponse {
    messages: Vec<ChatMessageResponse>,
    /// Whether a reply is currently streaming
    typing: bool,
}

#[derive(Deserialize, ToSchema)]
struct ChatRequest {
    message: String,
}

#[derive(Parser, Clone)]
#[command(author, version, about = "Apex Store - storefront session server")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the Apex server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Override the insight model
        #[arg(long)]
        model: Option<String>,
    },
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Apex Store API",
        version = "1.0.0",
        description = "Catalog, cart and AI insight panels for the Apex Store"
    ),
    paths(
        get_catalog,
        get_categories,
        update_filters,
        reset_filters,
        get_cart,
        add_cart_item,
        update_cart_item,
        remove_cart_item,
        checkout,
        tip_topics,
        health_tip,
        macro_estimate,
        product_insight,
        get_coach,
        reset_coach
    ),
    components(
        schemas(
            ApiResponse,
            ProductResponse,
            FilterStateResponse,
            CatalogResponse,
            CategoriesResponse,
            CategoryInfo,
            UpdateFiltersRequest,
            CartLineResponse,
            CartResponse,
            AddCartItemRequest,
            UpdateQuantityRequest,
            CheckoutResponse,
            TopicsResponse,
            HealthTipRequest,
            HealthTipResponse,
            HealthTipBody,
            MacroEstimateRequest,
            MacroEstimateResponse,
            MacroEstimateBody,
            ProductInsightResponse,
            ProductInsightBody,
            ChatMessageResponse,
            CoachResponse,
            ChatRequest
        )
    ),
    tags(
        (name = "catalog", description = "Catalog browsing: filter, search, sort"),
        (name = "cart", description = "Cart lines, totals and checkout"),
        (name = "insights", description = "Generated tips, macros and product analysis"),
        (name = "coach", description = "Conversational AI coach")
    )
)]
struct ApiDoc;

// === Catalog Handlers ===

/// Get the catalog view under the session's current filters
#[utoipa::path(
    get,
    path = "/api/v1/catalog",
    tag = "catalog",
    responses(
        (status = 200, description = "Filtered and sorted product list", body = CatalogResponse)
    )
)]
async fn get_catalog(State(state): State<SharedState>) -> Json<CatalogResponse> {
    let session = state.session.read().await;
    let view = session.filters.apply(&state.catalog);

    Json(CatalogResponse {
        shown: view.len(),
        total: state.catalog.len(),
        products: view.into_iter().map(ProductResponse::from).collect(),
        filters: FilterStateResponse::from(&session.filters),
    })
}

/// List the fixed category set
#[utoipa::path(
    get,
    path = "/api/v1/catalog/categories",
    tag = "catalog",
    responses(
        (status = 200, description = "All product categories", body = CategoriesResponse)
    )
)]
async fn get_categories() -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: Category::all()
            .into_iter()
            .map(|c| CategoryInfo {
                id: c.as_str().to_string(),
                name: c.display_name().to_string(),
            })
            .collect(),
    })
}

/// Update the session filters (partial)
#[utoipa::path(
    patch,
    path = "/api/v1/catalog/filters",
    tag = "catalog",
    request_body = UpdateFiltersRequest,
    responses(
        (status = 200, description = "Updated catalog view, or a failure notice for a rejected value", body = CatalogResponse)
    )
)]
async fn update_filters(
    State(state): State<SharedState>,
    Json(req): Json<UpdateFiltersRequest>,
) -> Response {
    // Validate before touching the session so a bad payload changes nothing.
    let category = match req.category.as_deref() {
        None => None,
        Some("all") => Some(None),
        Some(other) => match Category::parse(other) {
            Some(c) => Some(Some(c)),
            None => return ApiResponse::fail(format!("Unknown category: {}", other)).into_response(),
        },
    };
    let sort = match req.sort.as_deref() {
        None => None,
        Some(s) => match SortMode::parse(s) {
            Some(mode) => Some(mode),
            None => return ApiResponse::fail(format!("Unknown sort mode: {}", s)).into_response(),
        },
    };

    let mut session = state.session.write().await;
    if let Some(category) = category {
        session.filters.category = category;
    }
    if let Some(query) = req.query {
        session.filters.query = query;
    }
    if let Some(sort) = sort {
        session.filters.sort = sort;
    }

    state.emit(StoreEvent::new(StoreEventKind::FiltersChanged, "catalog"));

    let view = session.filters.apply(&state.catalog);
    Json(CatalogResponse {
        shown: view.len(),
        total: state.catalog.len(),
        products: view.into_iter().map(ProductResponse::from).collect(),
        filters: FilterStateResponse::from(&session.filters),
    })
    .into_response()
}

/// Reset the session filters to defaults
#[utoipa::path(
    post,
    path = "/api/v1/catalog/filters/reset",
    tag = "catalog",
    responses(
        (status = 200, description = "Filters reset", body = ApiResponse)
    )
)]
async fn reset_filters(State(state): State<SharedState>) -> Json<ApiResponse> {
    state.session.write().await.filters.reset();
    state.emit(StoreEvent::new(StoreEventKind::FiltersReset, "catalog"));
    ApiResponse::ok("Filters reset")
}

// === Cart Handlers ===

fn cart_response(session: &Session) -> CartResponse {
    CartResponse {
        lines: session
            .cart
            .lines()
            .iter()
            .map(|l| CartLineResponse {
                product_id: l.product_id.clone(),
                name: l.name.clone(),
                unit_price: l.unit_price,
                quantity: l.quantity,
                line_total: l.line_total(),
            })
            .collect(),
        subtotal: session.cart.subtotal(),
        item_count: session.cart.item_count(),
    }
}

/// Get the cart contents
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 200, description = "Cart lines and totals", body = CartResponse)
    )
)]
async fn get_cart(State(state): State<SharedState>) -> Json<CartResponse> {
    let session = state.session.read().await;
    Json(cart_response(&session))
}

/// Add one unit of a product to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    tag = "cart",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Updated cart, or a failure notice for an unknown product", body = CartResponse)
    )
)]
async fn add_cart_item(
    State(state): State<SharedState>,
    Json(req): Json<AddCartItemRequest>,
) -> Response {
    let Some(product) = state.catalog.get(&req.product_id) else {
        return ApiResponse::fail(format!("Unknown product: {}", req.product_id)).into_response();
    };

    let mut session = state.session.write().await;
    session.cart.add(product);

    state.emit(
        StoreEvent::new(StoreEventKind::CartUpdated, "cart")
            .with_data(serde_json::json!({ "product_id": product.id, "op": "add" })),
    );

    Json(cart_response(&session)).into_response()
}

/// Adjust a line's quantity by a signed delta (floor of 1)
#[utoipa::path(
    patch,
    path = "/api/v1/cart/items/{id}",
    tag = "cart",
    params(("id" = String, Path, description = "Product ID")),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse)
    )
)]
async fn update_cart_item(
    State(state): State<SharedState>,
    axum::extract::Path(id): axum::extract::Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Json<CartResponse> {
    let mut session = state.session.write().await;
    // Absent lines are a no-op by contract, not an error.
    if session.cart.update_quantity(&id, req.delta).is_some() {
        state.emit(
            StoreEvent::new(StoreEventKind::CartUpdated, "cart")
                .with_data(serde_json::json!({ "product_id": id, "op": "update_quantity" })),
        );
    }
    Json(cart_response(&session))
}

/// Remove a line from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{id}",
    tag = "cart",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Updated cart", body = CartResponse)
    )
)]
async fn remove_cart_item(
    State(state): State<SharedState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Json<CartResponse> {
    let mut session = state.session.write().await;
    if session.cart.remove(&id) {
        state.emit(
            StoreEvent::new(StoreEventKind::CartUpdated, "cart")
                .with_data(serde_json::json!({ "product_id": id, "op": "remove" })),
        );
    }
    Json(cart_response(&session))
}

/// Check out: report the final subtotal and clear the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/checkout",
    tag = "cart",
    responses(
        (status = 200, description = "Checkout notice", body = CheckoutResponse)
    )
)]
async fn checkout(State(state): State<SharedState>) -> Json<CheckoutResponse> {
    let mut session = state.session.write().await;
    let notice = session.cart.checkout();

    state.emit(
        StoreEvent::new(StoreEventKind::CheckoutCompleted, "cart")
            .with_data(serde_json::json!({ "subtotal": notice.subtotal })),
    );

    Json(CheckoutResponse {
        success: true,
        subtotal: notice.subtotal,
        item_count: notice.item_count,
        message: notice.message,
        completed_at: notice.completed_at.to_rfc3339(),
    })
}

// === Insight Handlers ===

/// List the suggested health-tip topics
#[utoipa::path(
    get,
    path = "/api/v1/insights/topics",
    tag = "insights",
    responses(
        (status = 200, description = "Suggested topics", body = TopicsResponse)
    )
)]
async fn tip_topics() -> Json<TopicsResponse> {
    Json(TopicsResponse {
        topics: TIP_TOPICS.iter().map(|t| t.to_string()).collect(),
    })
}

/// Generate a health tip for a topic
#[utoipa::path(
    post,
    path = "/api/v1/insights/health-tip",
    tag = "insights",
    request_body = HealthTipRequest,
    responses(
        (status = 200, description = "Generated tip or failure notice", body = HealthTipResponse)
    )
)]
async fn health_tip(
    State(state): State<SharedState>,
    Json(req): Json<HealthTipRequest>,
) -> Json<HealthTipResponse> {
    state.emit(StoreEvent::new(StoreEventKind::InsightRequested, "health_tips"));

    let outcome = match state.provider() {
        Ok(provider) => provider.health_tip(&req.topic).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(tip) => {
            state.emit(StoreEvent::new(StoreEventKind::InsightDelivered, "health_tips"));
            Json(HealthTipResponse {
                success: true,
                tip: Some(HealthTipBody {
                    title: tip.title,
                    content: tip.content,
                    tags: tip.tags,
                }),
                message: String::new(),
            })
        }
        Err(e) => {
            tracing::warn!("health tip failed: {}", e);
            state.emit(StoreEvent::new(StoreEventKind::InsightFailed, "health_tips"));
            Json(HealthTipResponse {
                success: false,
                tip: None,
                message: INSIGHT_FAILURE_NOTICE.to_string(),
            })
        }
    }
}

/// Estimate daily macros for a profile
#[utoipa::path(
    post,
    path = "/api/v1/insights/macros",
    tag = "insights",
    request_body = MacroEstimateRequest,
    responses(
        (status = 200, description = "Generated estimate or failure notice", body = MacroEstimateResponse)
    )
)]
async fn macro_estimate(
    State(state): State<SharedState>,
    Json(req): Json<MacroEstimateRequest>,
) -> Json<MacroEstimateResponse> {
    state.emit(StoreEvent::new(StoreEventKind::InsightRequested, "macros"));

    let profile = MacroProfile {
        weight_kg: req.weight_kg,
        height_cm: req.height_cm,
        age: req.age,
        activity_level: req.activity_level,
        goal: req.goal,
    };

    let outcome = match state.provider() {
        Ok(provider) => provider.macro_estimate(&profile).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(estimate) => {
            state.emit(StoreEvent::new(StoreEventKind::InsightDelivered, "macros"));
            Json(MacroEstimateResponse {
                success: true,
                estimate: Some(MacroEstimateBody {
                    calories: estimate.calories,
                    protein: estimate.protein,
                    carbs: estimate.carbs,
                    fats: estimate.fats,
                    explanation: estimate.explanation,
                }),
                message: String::new(),
            })
        }
        Err(e) => {
            tracing::warn!("macro estimate failed: {}", e);
            state.emit(StoreEvent::new(StoreEventKind::InsightFailed, "macros"));
            Json(MacroEstimateResponse {
                success: false,
                estimate: None,
                message: INSIGHT_FAILURE_NOTICE.to_string(),
            })
        }
    }
}

/// Generate an expert insight for a catalog product
#[utoipa::path(
    post,
    path = "/api/v1/insights/products/{id}",
    tag = "insights",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Generated insight or failure notice", body = ProductInsightResponse)
    )
)]
async fn product_insight(
    State(state): State<SharedState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Json<ProductInsightResponse> {
    let Some(product) = state.catalog.get(&id) else {
        return Json(ProductInsightResponse {
            success: false,
            insight: None,
            message: format!("Unknown product: {}", id),
        });
    };

    state.emit(StoreEvent::new(StoreEventKind::InsightRequested, "product_insight"));

    let outcome = match state.provider() {
        Ok(provider) => provider.product_insight(&product.name, product.category).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(insight) => {
            state.emit(StoreEvent::new(StoreEventKind::InsightDelivered, "product_insight"));
            Json(ProductInsightResponse {
                success: true,
                insight: Some(ProductInsightBody {
                    verdict: insight.verdict,
                    benefits: insight.benefits,
                    pro_tip: insight.pro_tip,
                }),
                message: String::new(),
            })
        }
        Err(e) => {
            tracing::warn!("product insight failed for {}: {}", id, e);
            state.emit(StoreEvent::new(StoreEventKind::InsightFailed, "product_insight"));
            Json(ProductInsightResponse {
                success: false,
                insight: None,
                message: INSIGHT_FAILURE_NOTICE.to_string(),
            })
        }
    }
}

// === Coach Handlers ===

/// Get the committed conversation
#[utoipa::path(
    get,
    path = "/api/v1/coach",
    tag = "coach",
    responses(
        (status = 200, description = "Conversation history", body = CoachResponse)
    )
)]
async fn get_coach(State(state): State<SharedState>) -> Json<CoachResponse> {
    let session = state.session.read().await;
    Json(CoachResponse {
        messages: session
            .coach
            .history()
            .iter()
            .map(ChatMessageResponse::from)
            .collect(),
        typing: session.coach.is_typing(),
    })
}

/// Start a fresh conversation
#[utoipa::path(
    post,
    path = "/api/v1/coach/reset",
    tag = "coach",
    responses(
        (status = 200, description = "Conversation reset", body = ApiResponse)
    )
)]
async fn reset_coach(State(state): State<SharedState>) -> Json<ApiResponse> {
    state.session.write().await.coach.reset();
    ApiResponse::ok("Conversation reset")
}

/// SSE endpoint streaming one coach reply. Each `fragment` event carries
/// the next piece of text; the stream ends with a `done` event carrying
/// the full reply, or an `error` event carrying the failure notice.
async fn coach_chat(
    State(state): State<SharedState>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return ApiResponse::fail("Message is empty").into_response();
    }

    // Commit the user message and claim the single reply slot. The history
    // snapshot excludes the new message; the provider takes it separately.
    let history = {
        let mut session = state.session.write().await;
        let history = session.coach.history().to_vec();
        if session.coach.begin_reply(&message).is_err() {
            return ApiResponse::fail("The coach is still replying").into_response();
        }
        history
    };

    let stream_result = match state.provider() {
        Ok(provider) => provider.chat_stream(&history, &message).await,
        Err(e) => Err(e),
    };

    let fragments = match stream_result {
        Ok(fragments) => fragments,
        Err(e) => {
            tracing::warn!("coach stream failed to open: {}", e);
            let mut session = state.session.write().await;
            let _ = session.coach.fail_reply();
            state.emit(StoreEvent::new(StoreEventKind::CoachReplyFailed, "coach"));
            return ApiResponse::fail(INSIGHT_FAILURE_NOTICE).into_response();
        }
    };

    state.emit(StoreEvent::new(StoreEventKind::CoachReplyStarted, "coach"));

    // Fold each fragment into the session conversation as it is relayed,
    // so the accumulated reply is swapped in exactly once at the end.
    let sse_stream = stream::unfold(
        (fragments, state.clone(), false),
        |(mut fragments, state, done)| async move {
            if done {
                return None;
            }
            match fragments.next().await {
                Some(Ok(text)) => {
                    {
                        let mut session = state.session.write().await;
                        let _ = session.coach.push_fragment(&text);
                    }
                    Some((
                        Event::default().event("fragment").data(text),
                        (fragments, state, false),
                    ))
                }
                Some(Err(e)) => {
                    tracing::warn!("coach stream interrupted: {}", e);
                    {
                        let mut session = state.session.write().await;
                        let _ = session.coach.fail_reply();
                    }
                    state.emit(StoreEvent::new(StoreEventKind::CoachReplyFailed, "coach"));
                    Some((
                        Event::default().event("error").data(INSIGHT_FAILURE_NOTICE),
                        (fragments, state, true),
                    ))
                }
                None => {
                    let full = {
                        let mut session = state.session.write().await;
                        session.coach.finish_reply().unwrap_or_default()
                    };
                    state.emit(StoreEvent::new(StoreEventKind::CoachReplyCompleted, "coach"));
                    Some((
                        Event::default().event("done").data(full),
                        (fragments, state, true),
                    ))
                }
            }
        },
    )
    .map(Ok::<_, Infallible>);

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// === Event Feed ===

/// SSE endpoint for real-time store events with heartbeat
async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    // Use timeout-based stream with heartbeat every 15 seconds
    let stream = stream::unfold(
        (rx, tokio::time::Instant::now()),
        |(mut rx, _last_event)| async move {
            let timeout = tokio::time::timeout(std::time::Duration::from_secs(15), rx.recv()).await;

            match timeout {
                Ok(Ok(event)) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    Some((
                        Ok(Event::default().data(json)),
                        (rx, tokio::time::Instant::now()),
                    ))
                }
                Ok(Err(_)) => None, // Channel closed
                Err(_) => {
                    // Timeout - send heartbeat comment
                    Some((
                        Ok(Event::default().comment("heartbeat")),
                        (rx, tokio::time::Instant::now()),
                    ))
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// === OpenAPI Handler ===

async fn serve_openapi() -> impl IntoResponse {
    let spec = ApiDoc::openapi().to_json().unwrap_or_default();
    Response::builder()
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(spec))
        .unwrap()
}

// === Server Entry ===

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let (server_port, model_override) = match args.command {
        Some(CliCommand::Serve { port, model }) => (port, model),
        None => (8080, None),
    };

    let catalog = Catalog::builtin()?;
    println!("📦 Loaded catalog v{} with {} products", catalog.version, catalog.len());

    let mut insight = InsightConfig::default();
    if let Some(model) = model_override {
        insight.model = model;
    }

    if std::env::var("GEMINI_API_KEY").is_err() && std::env::var("GOOGLE_API_KEY").is_err() {
        println!("⚠️ GEMINI_API_KEY not set - insight panels will return failure notices");
    }

    let (event_tx, _) = broadcast::channel::<StoreEvent>(100);

    let state: SharedState = Arc::new(AppState {
        catalog,
        session: RwLock::new(Session::new()),
        insight,
        event_tx,
    });

    let catalog_routes = Router::new()
        .route("/", get(get_catalog))
        .route("/categories", get(get_categories))
        .route("/filters", patch(update_filters))
        .route("/filters/reset", post(reset_filters));

    let cart_routes = Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_cart_item))
        .route("/items/:id", patch(update_cart_item).delete(remove_cart_item))
        .route("/checkout", post(checkout));

    let insight_routes = Router::new()
        .route("/topics", get(tip_topics))
        .route("/health-tip", post(health_tip))
        .route("/macros", post(macro_estimate))
        .route("/products/:id", post(product_insight));

    let coach_routes = Router::new()
        .route("/", get(get_coach))
        .route("/chat", post(coach_chat))
        .route("/reset", post(reset_coach));

    let app = Router::new()
        .nest("/api/v1/catalog", catalog_routes)
        .nest("/api/v1/cart", cart_routes)
        .nest("/api/v1/insights", insight_routes)
        .nest("/api/v1/coach", coach_routes)
        .route("/api/v1/events", get(events))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], server_port));
    println!("🚀 Apex Server running at http://{}", addr);
    println!("   API v1 Routes:");
    println!("   Catalog:  /api/v1/catalog, /categories, /filters");
    println!("   Cart:     /api/v1/cart, /items, /checkout");
    println!("   Insights: /api/v1/insights/health-tip, /macros, /products/:id");
    println!("   Coach:    /api/v1/coach, /chat (SSE), /reset");
    println!("   Events:   /api/v1/events (SSE)");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════╗");
    println!("║           APEX STORE SERVER          ║");
    println!("╚══════════════════════════════════════╝");

    run_server().await
}
