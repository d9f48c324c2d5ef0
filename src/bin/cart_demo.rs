use rust_decimal::Decimal;
use std::sync::Arc;
use storefront::application_impl::*;
use storefront::domain_model::*;
use storefront::domain_port::*;
use storefront::infra_memory::MemoryStorefrontBackend;
use storefront::logger::*;
use tokio_util::sync::CancellationToken;

fn line(id: i64, name: &str, qty: u32, price: i64) -> CartLine {
    CartLine {
        id: CartLineId(id),
        product_id: Some(id * 10),
        product_detail_id: Some(id * 100),
        product_name: name.to_string(),
        product_image: None,
        color_name: None,
        size_name: None,
        qty,
        sale_price: Some(Decimal::from(price)),
        discount_price: None,
    }
}

// $ cargo run --bin cart_demo
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _logger = Logger::new_bootstrap();

    let backend = Arc::new(
        MemoryStorefrontBackend::new()
            .with_latency(std::time::Duration::from_millis(50))
            .with_lines(vec![line(1, "Linen shirt", 1, 350), line(2, "Canvas tote", 2, 120)]),
    );

    let session = Arc::new(SessionManager::new(
        backend.clone(),
        Arc::new(SystemClock),
        SessionPolicy::default(),
    ));
    let tokens = backend
        .login(
            LoginInput {
                mobile: "01012345678".to_string(),
                password: "secret".to_string(),
            },
            Locale::En,
        )
        .await?;
    session.sign_in(tokens);

    let cancel = CancellationToken::new();
    let watcher = session.clone().spawn_watcher(cancel.clone());

    let store = CartStore::load(backend.clone(), session.clone(), Locale::En).await;
    info!(lines = store.view().snapshot.lines.len(), "cart loaded");

    let (up, down) = tokio::join!(store.increment(CartLineId(1)), store.decrement(CartLineId(2)));
    info!(?up, ?down, "mutations settled");

    store.toggle(CartLineId(2));
    let offer = backend.shipping_offer(Locale::En).await;
    let summary = store.summary(&offer, Decimal::from(50));
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let report = store.batch_delete(&[CartLineId(1), CartLineId(2)]).await;
    info!(ok = report.success_count, failed = report.failed_count, "batch delete");

    store.close();
    cancel.cancel();
    watcher.await?;
    Ok(())
}
