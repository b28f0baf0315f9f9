use async_trait::async_trait;
use http::header::ACCEPT;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use micro_city::{
    BoxError, CityHandler, CityPlan, ContentMenu, DocumentHead, DocumentMeta, Json, RenderRequest, Renderer,
    RequestEvent, RequestHandler, RouteModule, StreamWriter, empty_body, full_body, handler_fn, ready_menu,
    ready_module,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Debug)]
struct Order {
    product: String,
    quantity: u32,
}

struct HtmlRenderer;

#[async_trait]
impl Renderer for HtmlRenderer {
    async fn render(&self, request: RenderRequest, mut writer: StreamWriter) -> Result<(), BoxError> {
        writer.write(format!("<html><head><title>{}</title></head>", request.head.title)).await?;
        let data = request.data.map_err(|rejection| -> BoxError { Box::new(rejection) })?;
        writer.write(format!("<body><pre>{data}</pre></body></html>")).await?;
        Ok(())
    }
}

async fn require_session(ev: RequestEvent) -> Result<(), BoxError> {
    if ev.request().headers().get("x-session").is_none() && ev.url().path().starts_with("/account") {
        ev.response().redirect("/login", None)?;
    }
    Ok(())
}

async fn get_product(ev: RequestEvent) -> Result<Json<serde_json::Value>, BoxError> {
    ev.response().set_header("cache-control", "max-age=60")?;
    let id = ev.params().get("id").unwrap_or_default();
    Ok(Json(json!({ "id": id, "price": 12 })))
}

// curl -X POST -H 'Content-Type: application/json' -d '{"product":"hat","quantity":2}' /api/orders
async fn create_order(ev: RequestEvent) -> Result<Json<serde_json::Value>, BoxError> {
    let order: Order = ev.request().json().await?;
    ev.response().set_status(StatusCode::CREATED);
    Ok(Json(json!({ "product": order.product, "quantity": order.quantity })))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let layout = ready_module(
        RouteModule::builder()
            .on_request(handler_fn(require_session))
            .head(DocumentHead {
                title: Some("Shop".into()),
                meta: vec![DocumentMeta::name("description", "a demo shop").with_key("description")],
                ..DocumentHead::default()
            })
            .component()
            .build(),
    );
    let product = ready_module(
        RouteModule::builder()
            .on_get(handler_fn(get_product))
            .head_fn(|props| DocumentHead {
                title: Some(format!("{} | {}", props.data["id"].as_str().unwrap_or("product"), props.head.title)),
                ..DocumentHead::default()
            })
            .component()
            .build(),
    );
    let orders = ready_module(RouteModule::builder().on_post(handler_fn(create_order)).build());
    let account = ready_module(RouteModule::builder().component().build());

    let plan = CityPlan::builder()
        .route("/products/[id]", vec![Arc::clone(&layout), product])
        .route("/account", vec![layout, account])
        .endpoint("/api/orders", vec![orders])
        .menu("/products", ready_menu(ContentMenu { text: "Products".into(), ..ContentMenu::default() }))
        .build()?;

    let handler = CityHandler::builder().plan(plan).renderer(HtmlRenderer).build()?;

    let requests = vec![
        Request::builder().uri("/products/hat").body(empty_body())?,
        Request::builder().uri("/products/hat").header(ACCEPT, "application/json").body(empty_body())?,
        Request::builder()
            .method(Method::POST)
            .uri("/api/orders")
            .body(full_body(r#"{"product":"hat","quantity":2}"#))?,
        Request::builder().uri("/account").body(empty_body())?,
        Request::builder().uri("/nowhere").body(empty_body())?,
    ];

    for request in requests {
        let uri = request.uri().clone();
        let response = handler.invoke(request.into()).await;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        info!(%uri, %status, body = %String::from_utf8_lossy(&body), "answered");
    }

    Ok(())
}
