//! End-to-end smoke test: build the full service graph the way
//! `main.rs` does, seed one organization/subscription/cycle, and run
//! one turn of the billing pipeline through the scheduler.

use billing_core::{ActorType, Currency, IdMinter, RequestContext};
use billing_engine::app::BillingEngine;
use billing_engine::config::EngineConfig;
use billing_catalog::{BillingInterval, BillingMode, PricingModel};
use billing_subscriptions::{BillingCycleType, CollectionMode, SubscriptionItemInput};

fn ctx(org_id: i64) -> RequestContext {
    RequestContext::new(org_id, ActorType::System)
}

#[tokio::test]
async fn engine_builds_and_closes_a_due_cycle_end_to_end() {
    let _ = IdMinter::install(99);
    let engine = BillingEngine::build(EngineConfig::default()).await.unwrap();

    let org = engine.tenancy.create_organization("acme".into(), Currency::usd()).await;
    let ctx = ctx(org.id);
    let customer = engine.tenancy.create_customer(&ctx, "acme customer".into(), None, None).await;

    let product = engine.catalog.create_product(&ctx, "pro plan".into(), Default::default()).await.unwrap();
    let price = engine
        .catalog
        .create_price(
            &ctx,
            product.id,
            "flat monthly".into(),
            PricingModel::Flat,
            BillingMode::Licensed,
            BillingInterval::Month,
            1,
            vec![],
        )
        .await
        .unwrap();

    let t0 = chrono::Utc::now() - chrono::Duration::days(32);
    engine
        .catalog
        .create_price_amount(&ctx, price.id, Currency::usd(), 1_000, None, None, None, t0 - chrono::Duration::days(1), None)
        .await
        .unwrap();

    let sub = engine
        .subscriptions
        .create(
            &ctx,
            customer.id,
            CollectionMode::SendInvoice,
            Some(BillingCycleType::Monthly),
            None,
            vec![SubscriptionItemInput { price_id: price.id, quantity: 1, billing_threshold: None }],
            None,
        )
        .await
        .unwrap();
    engine.subscriptions.activate(&ctx, sub.id).await.unwrap();
    engine.cycles.open_initial_cycle(&ctx, sub.id, BillingCycleType::Monthly, t0).await;

    let run = engine.scheduler.close_cycles(None).await.unwrap();
    assert!(run.error.is_none());
    assert_eq!(run.processed_count, 1);

    let run = engine.scheduler.rate_cycles(None).await.unwrap();
    assert!(run.error.is_none());
    assert_eq!(run.processed_count, 1);

    let run = engine.scheduler.generate_invoices(None).await.unwrap();
    assert!(run.error.is_none());
    assert_eq!(run.processed_count, 1);
}
