//! A small order service.
//!
//! ```text
//! cargo run -p keel --example orders
//! curl -H 'kt-session-id: alice' -H 'content-type: application/json' \
//!      -d '{"sku":"A-1","quantity":2}' localhost:20808/orders
//! curl -H 'kt-session-id: alice' localhost:20808/orders/1
//! ```

use anyhow::Context as _;
use chrono::{DateTime, Duration, Local};
use http::Method;
use keel::prelude::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
struct Account {
    name: String,
    admin: bool,
}

impl SessionInfo for Account {
    fn user_id(&self) -> &str {
        &self.name
    }

    fn expire_at(&self) -> DateTime<Local> {
        Local::now() + Duration::hours(8)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Deserialize)]
struct CreateOrder {
    sku: String,
    quantity: u32,
}

impl Payload for CreateOrder {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.sku.trim().is_empty() {
            errors.add("sku", "must not be empty");
        }
        if self.quantity == 0 {
            errors.add("quantity", "must be positive");
        }
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
struct OrderId {
    id: u64,
}

impl Payload for OrderId {}

#[derive(Debug, Clone, Serialize)]
struct Order {
    id: u64,
    sku: String,
    quantity: u32,
    owner: String,
}

#[derive(Default)]
struct OrderBook {
    orders: Mutex<BTreeMap<u64, Order>>,
}

fn load_account(
    _view: &RequestView,
    token: &str,
) -> BoxFuture<'static, Result<Arc<dyn SessionInfo>, WebError>> {
    let account = match token {
        "alice" => Some(Account {
            name: "alice".into(),
            admin: true,
        }),
        "bob" => Some(Account {
            name: "bob".into(),
            admin: false,
        }),
        _ => None,
    };
    Box::pin(async move {
        account
            .map(|a| Arc::new(a) as Arc<dyn SessionInfo>)
            .ok_or_else(WebError::unauthorized)
    })
}

fn load_permissions(
    _view: &RequestView,
    session: &AuthSession,
) -> BoxFuture<'static, Result<Vec<Arc<dyn Permission>>, WebError>> {
    let admin = session.info::<Account>().is_some_and(|a| a.admin);
    Box::pin(async move {
        let mut granted: Vec<Arc<dyn Permission>> = vec![
            Arc::new(RoutePermission::new("orders:read", Method::GET, "/orders")),
            Arc::new(RoutePermission::any_method("health", "/health")),
        ];
        if admin {
            granted.push(Arc::new(RoutePermission::new(
                "orders:write",
                Method::POST,
                "/orders",
            )));
        }
        Ok(granted)
    })
}

fn flush_audit(
    _view: &RequestView,
    record: &AuditRecord,
) -> BoxFuture<'static, Result<(), WebError>> {
    tracing::info!(
        user_id = record.user_id(),
        resource_id = record.resource_id(),
        client_ip = record.client_ip(),
        errors = %record.dump_errors(),
        "audit"
    );
    Box::pin(async { Ok(()) })
}

async fn health() -> Result<&'static str, WebError> {
    Ok("ok")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = ConfigLoader::new()
        .with_optional_file("web.toml")
        .context("reading web.toml")?
        .load()
        .context("loading configuration")?;
    config.auth.enabled = true;
    config.auth.whitelist = vec!["^/health$".into()];
    config.acl.enabled = true;
    config.audit.enabled = true;

    let mut logging = LogConfig::from(&config.logging);
    if config.debug {
        logging = LogConfig::development();
    }
    init_logging(&logging)?;

    let book = Arc::new(OrderBook::default());

    let create = {
        let book = Arc::clone(&book);
        move |ctx: RequestContext, req: CreateOrder| {
            let book = Arc::clone(&book);
            async move {
                let owner = ctx
                    .session()
                    .map(|s| s.user_id.clone())
                    .unwrap_or_default();
                let mut orders = book.orders.lock();
                if orders.values().any(|o| o.sku == req.sku) {
                    return Err(WebError::biz_msg(code::DUPLICATE_ADD, "order exists"));
                }
                let id = orders.len() as u64 + 1;
                let order = Order {
                    id,
                    sku: req.sku,
                    quantity: req.quantity,
                    owner,
                };
                orders.insert(id, order.clone());
                ctx.with_audit(|record| record.set_resource_id(id.to_string()));
                Ok(order)
            }
        }
    };

    let find = {
        let book = Arc::clone(&book);
        move |path: OrderId| {
            let book = Arc::clone(&book);
            async move {
                book.orders
                    .lock()
                    .get(&path.id)
                    .cloned()
                    .ok_or_else(|| WebError::biz_msg(code::NOT_FOUND, "no such order"))
            }
        }
    };

    Web::builder()
        .config(config)
        .session_loader(load_account)
        .permission_loader(load_permissions)
        .acl_skipper(skipper::path_prefixes(["/health"]))
        .audit_flush(flush_audit)
        .audit_skipper(skipper::path_prefixes(["/health"]))
        .layer(
            LoggerMiddleware::builder()
                .hide_headers(["kt-session-id"])
                .build(),
        )
        .get("/health", health)
        .post("/orders", create)
        .get("/orders/{id}", find)
        .build()?
        .run()
        .await?;
    Ok(())
}
