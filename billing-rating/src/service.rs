use std::sync::Arc;

use billing_catalog::store::select_effective;
use billing_catalog::{Aggregation, CatalogService, Price, PriceAmount, PriceTier, PricingModel};
use billing_core::{IdMinter, RequestContext};
use billing_cycles::{CycleService, CycleStatus};
use billing_subscriptions::SubscriptionService;
use billing_usage::{UsageEvent, UsageStore};

use crate::errors::{RatingError, RatingOpResult};
use crate::store::RatingStore;
use crate::types::RatingResult;

pub struct RatingService {
    store: Arc<dyn RatingStore>,
    catalog: Arc<CatalogService>,
    subscriptions: Arc<SubscriptionService>,
    cycles: Arc<CycleService>,
    usage: Arc<dyn UsageStore>,
}

impl RatingService {
    pub fn new(
        store: Arc<dyn RatingStore>,
        catalog: Arc<CatalogService>,
        subscriptions: Arc<SubscriptionService>,
        cycles: Arc<CycleService>,
        usage: Arc<dyn UsageStore>,
    ) -> Self {
        Self { store, catalog, subscriptions, cycles, usage }
    }

    /// `RunRating(billing_cycle_id)`. Idempotent: re-running
    /// for the same cycle upserts the same `(cycle, item)` rows.
    pub async fn run_rating(
        &self,
        ctx: &RequestContext,
        billing_cycle_id: i64,
    ) -> RatingOpResult<Vec<RatingResult>> {
        let cycle = self
            .cycles
            .get(ctx, billing_cycle_id)
            .await
            .map_err(|_| RatingError::CycleNotFound(billing_cycle_id))?;
        if cycle.status != CycleStatus::Closing {
            return Err(RatingError::CycleNotClosing(billing_cycle_id));
        }

        let subscription = self
            .subscriptions
            .get(ctx, cycle.subscription_id)
            .await
            .map_err(|_| RatingError::InvalidRequest("subscription not found".into()))?;
        let items = self.subscriptions.items(cycle.subscription_id).await;
        let entitlements = self.subscriptions.entitlements(cycle.subscription_id).await;

        let mut results = Vec::with_capacity(items.len());

        for item in &items {
            let price = self
                .catalog
                .get_price(ctx, item.price_id)
                .await
                .map_err(|_| RatingError::InvalidRequest(format!("price {} not found", item.price_id)))?;

            let quantity = match item.meter_id {
                None => item.quantity,
                Some(meter_id) => {
                    let meter = self
                        .catalog
                        .get_meter(ctx, meter_id)
                        .await
                        .map_err(|_| RatingError::InvalidRequest(format!("meter {meter_id} not found")))?;
                    let events = self
                        .usage
                        .in_range(cycle.subscription_id, meter_id, cycle.period_start, cycle.period_end)
                        .await;
                    aggregate(&events, meter.aggregation)
                }
            };

            let price_amounts = self.catalog.price_amounts_for(price.id).await;
            let candidates: Vec<PriceAmount> = price_amounts
                .into_iter()
                .filter(|a| a.currency == subscription.default_currency)
                .collect();
            let price_amount = select_effective(&candidates, cycle.period_end)
                .cloned()
                .ok_or(RatingError::NoPriceAmountCovering { price_id: price.id, at: cycle.period_end })?;

            let amount_cents = compute_amount(&price, quantity, &price_amount)?;

            let feature_code = entitlements
                .iter()
                .find(|e| item.meter_id.is_some() && e.meter_id == item.meter_id)
                .map(|e| e.feature_code.clone())
                .unwrap_or_else(|| item.price_code.clone());

            let result = RatingResult {
                id: IdMinter::global().next_id(),
                org_id: ctx.org_id,
                billing_cycle_id,
                subscription_item_id: item.id,
                price_id: price.id,
                meter_id: item.meter_id,
                feature_code,
                quantity,
                unit_price_cents: price_amount.unit_amount_cents,
                amount_cents,
                currency: subscription.default_currency,
                period_start: cycle.period_start,
                period_end: cycle.period_end,
            };
            self.store.upsert(result.clone()).await;
            results.push(result);
        }

        self.cycles.mark_rated(ctx, billing_cycle_id).await.ok();
        Ok(results)
    }

    pub async fn for_cycle(&self, billing_cycle_id: i64) -> Vec<RatingResult> {
        self.store.for_cycle(billing_cycle_id).await
    }
}

/// Collapses raw usage events into a billable quantity per the meter's
/// aggregation function.
fn aggregate(events: &[UsageEvent], aggregation: Aggregation) -> i64 {
    if events.is_empty() {
        return 0;
    }
    match aggregation {
        Aggregation::Sum => events.iter().map(|e| e.value).sum::<f64>().round() as i64,
        Aggregation::Max => events
            .iter()
            .map(|e| e.value)
            .fold(f64::MIN, f64::max)
            .round() as i64,
        Aggregation::Last => {
            events.iter().max_by_key(|e| e.recorded_at).map(|e| e.value).unwrap_or(0.0).round() as i64
        }
        Aggregation::Count => events.len() as i64,
        Aggregation::Unique => {
            let mut seen = std::collections::HashSet::new();
            for e in events {
                seen.insert(e.value.to_bits());
            }
            seen.len() as i64
        }
    }
}

/// Applies the pricing model's amount formula.
fn compute_amount(price: &Price, quantity: i64, price_amount: &PriceAmount) -> RatingOpResult<i64> {
    match price.pricing_model {
        PricingModel::Flat => Ok(price_amount.unit_amount_cents),
        PricingModel::PerUnit => {
            let raw = quantity.saturating_mul(price_amount.unit_amount_cents);
            let mut clamped = raw;
            if let Some(min) = price_amount.minimum_amount_cents {
                clamped = clamped.max(min);
            }
            if let Some(max) = price_amount.maximum_amount_cents {
                clamped = clamped.min(max);
            }
            Ok(clamped)
        }
        PricingModel::TieredVolume => {
            let tier = price
                .tiers
                .iter()
                .find(|t| t.contains(quantity))
                .ok_or(RatingError::NoTierCoversQuantity { price_id: price.id, quantity })?;
            Ok(quantity.saturating_mul(tier.unit_amount_cents.unwrap_or(0)) + tier.flat_amount_cents.unwrap_or(0))
        }
        PricingModel::TieredGraduated => {
            let mut tiers: Vec<&PriceTier> = price.tiers.iter().collect();
            tiers.sort_by_key(|t| t.start_quantity);
            let mut total = 0i64;
            for tier in tiers {
                if quantity <= tier.start_quantity {
                    break;
                }
                let tier_end = tier.end_quantity.unwrap_or(quantity).min(quantity);
                let tier_quantity = (tier_end - tier.start_quantity).max(0);
                if tier_quantity > 0 {
                    total += tier_quantity.saturating_mul(tier.unit_amount_cents.unwrap_or(0));
                    total += tier.flat_amount_cents.unwrap_or(0);
                }
            }
            Ok(total)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_catalog::{BillingInterval, BillingMode, InMemoryCatalogStore, TierMode};
    use billing_core::{ActorType, Currency};
    use billing_cycles::InMemoryCycleStore;
    use billing_subscriptions::{
        BillingCycleType, CollectionMode, InMemorySubscriptionStore, SubscriptionItemInput,
    };
    use billing_tenancy::{InMemoryTenancyStore, TenancyService};
    use billing_usage::InMemoryUsageStore;
    use chrono::Utc;

    fn ctx(org_id: i64) -> RequestContext {
        RequestContext::new(org_id, ActorType::System)
    }

    #[test]
    fn per_unit_amount_clamps_into_bounds() {
        let price = Price {
            id: 1,
            org_id: 1,
            product_id: 1,
            code: "per-call".into(),
            pricing_model: PricingModel::PerUnit,
            billing_mode: BillingMode::Metered,
            billing_interval: BillingInterval::Month,
            version: 1,
            active: true,
            retired_at: None,
            tiers: vec![],
            created_at: Utc::now(),
        };
        let amount = PriceAmount {
            id: 1,
            org_id: 1,
            price_id: 1,
            currency: Currency::usd(),
            unit_amount_cents: 10,
            minimum_amount_cents: Some(50),
            maximum_amount_cents: Some(200),
            meter_id: None,
            effective_from: Utc::now(),
            effective_to: None,
            created_at: Utc::now(),
        };
        assert_eq!(compute_amount(&price, 2, &amount).unwrap(), 50);
        assert_eq!(compute_amount(&price, 30, &amount).unwrap(), 200);
        assert_eq!(compute_amount(&price, 10, &amount).unwrap(), 100);
    }

    #[test]
    fn tiered_graduated_sums_bounded_contributions() {
        let price = Price {
            id: 1,
            org_id: 1,
            product_id: 1,
            code: "graduated".into(),
            pricing_model: PricingModel::TieredGraduated,
            billing_mode: BillingMode::Metered,
            billing_interval: BillingInterval::Month,
            version: 1,
            active: true,
            retired_at: None,
            tiers: vec![
                PriceTier {
                    tier_mode: TierMode::Graduated,
                    start_quantity: 0,
                    end_quantity: Some(100),
                    unit_amount_cents: Some(10),
                    flat_amount_cents: None,
                    unit: "calls".into(),
                },
                PriceTier {
                    tier_mode: TierMode::Graduated,
                    start_quantity: 100,
                    end_quantity: None,
                    unit_amount_cents: Some(5),
                    flat_amount_cents: None,
                    unit: "calls".into(),
                },
            ],
            created_at: Utc::now(),
        };
        let amount = PriceAmount {
            id: 1,
            org_id: 1,
            price_id: 1,
            currency: Currency::usd(),
            unit_amount_cents: 0,
            minimum_amount_cents: None,
            maximum_amount_cents: None,
            meter_id: None,
            effective_from: Utc::now(),
            effective_to: None,
            created_at: Utc::now(),
        };
        // first 100 units @ 10c = 1000, next 50 @ 5c = 250 -> 1250
        assert_eq!(compute_amount(&price, 150, &amount).unwrap(), 1250);
    }

    #[tokio::test]
    async fn run_rating_is_idempotent_on_rerun() {
        let _ = IdMinter::install(1);
        let catalog = Arc::new(CatalogService::new(InMemoryCatalogStore::new()));
        let tenancy = Arc::new(TenancyService::new(InMemoryTenancyStore::new()));
        let sub_store = InMemorySubscriptionStore::new();
        let subscriptions =
            Arc::new(SubscriptionService::new(sub_store, catalog.clone(), tenancy.clone()));
        let cycle_store = InMemoryCycleStore::new();
        let clock = Arc::new(billing_core::Clock::default());
        let cycles = Arc::new(CycleService::new(cycle_store, clock));
        let usage_store: Arc<dyn UsageStore> = InMemoryUsageStore::new();
        let rating_store = crate::store::InMemoryRatingStore::new();

        let org = tenancy.create_organization("acme".into(), Currency::usd()).await;
        let ctx = ctx(org.id);
        let customer = tenancy.create_customer(&ctx, "cust".into(), None, None).await;
        let product = catalog.create_product(&ctx, "pro".into(), Default::default()).await.unwrap();
        let price = catalog
            .create_price(
                &ctx,
                product.id,
                "flat".into(),
                PricingModel::Flat,
                BillingMode::Licensed,
                BillingInterval::Month,
                1,
                vec![],
            )
            .await
            .unwrap();
        let t0 = Utc::now();
        catalog
            .create_price_amount(&ctx, price.id, Currency::usd(), 500, None, None, None, t0 - chrono::Duration::days(1), None)
            .await
            .unwrap();

        let sub = subscriptions
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
        subscriptions.activate(&ctx, sub.id).await.unwrap();

        let cycle = cycles.open_initial_cycle(&ctx, sub.id, BillingCycleType::Monthly, t0).await;
        let (closing, _next) = cycles.close_and_reopen(&ctx, &cycle, BillingCycleType::Monthly).await.unwrap();

        let rating = RatingService::new(rating_store, catalog, subscriptions, cycles, usage_store);
        let first = rating.run_rating(&ctx, closing.id).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].amount_cents, 500);

        let second = rating.run_rating(&ctx, closing.id).await.unwrap();
        assert_eq!(second.len(), 1);
        let stored = rating.for_cycle(closing.id).await;
        assert_eq!(stored.len(), 1);
    }

    mod determinism {
        use super::*;
        use proptest::prelude::*;

        fn usage_event(value: f64, recorded_at_offset_secs: i64) -> UsageEvent {
            UsageEvent {
                id: 1,
                org_id: 1,
                customer_id: 1,
                subscription_id: Some(1),
                subscription_item_id: None,
                meter_id: Some(1),
                meter_code: "calls".into(),
                value,
                recorded_at: Utc::now() + chrono::Duration::seconds(recorded_at_offset_secs),
                idempotency_key: None,
                status: billing_usage::UsageEventStatus::Accepted,
                error: None,
                metadata: Default::default(),
            }
        }

        proptest! {
            // Aggregating the same usage events twice, in any order,
            // must yield the same billable quantity: re-running rating
            // on unchanged inputs can't depend on store iteration order.
            #[test]
            fn aggregate_is_order_independent(
                values in proptest::collection::vec(-1000.0f64..1000.0, 0..20),
                agg in prop_oneof![
                    Just(Aggregation::Sum),
                    Just(Aggregation::Max),
                    Just(Aggregation::Count),
                    Just(Aggregation::Unique),
                ],
            ) {
                let events: Vec<UsageEvent> = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| usage_event(*v, i as i64))
                    .collect();
                let forward = aggregate(&events, agg);
                let mut reversed = events.clone();
                reversed.reverse();
                let backward = aggregate(&reversed, agg);
                prop_assert_eq!(forward, backward);
                // Determinism: repeating the call changes nothing.
                prop_assert_eq!(forward, aggregate(&events, agg));
            }

            // compute_amount is a pure function of its inputs: calling it
            // twice with identical arguments must produce an identical
            // RatingResult.amount_cents, and PerUnit amounts must stay
            // within their configured [minimum, maximum] bounds.
            #[test]
            fn per_unit_amount_is_deterministic_and_bounded(
                quantity in 0i64..10_000,
                unit_amount_cents in 0i64..10_000,
                minimum in proptest::option::of(0i64..5_000),
                maximum in proptest::option::of(5_000i64..50_000),
            ) {
                let price = Price {
                    id: 1,
                    org_id: 1,
                    product_id: 1,
                    code: "per-call".into(),
                    pricing_model: PricingModel::PerUnit,
                    billing_mode: BillingMode::Metered,
                    billing_interval: BillingInterval::Month,
                    version: 1,
                    active: true,
                    retired_at: None,
                    tiers: vec![],
                    created_at: Utc::now(),
                };
                let amount = PriceAmount {
                    id: 1,
                    org_id: 1,
                    price_id: 1,
                    currency: Currency::usd(),
                    unit_amount_cents,
                    minimum_amount_cents: minimum,
                    maximum_amount_cents: maximum,
                    meter_id: None,
                    effective_from: Utc::now(),
                    effective_to: None,
                    created_at: Utc::now(),
                };
                let first = compute_amount(&price, quantity, &amount).unwrap();
                let second = compute_amount(&price, quantity, &amount).unwrap();
                prop_assert_eq!(first, second);
                if let Some(min) = minimum {
                    prop_assert!(first >= min);
                }
                if let Some(max) = maximum {
                    prop_assert!(first <= max);
                }
            }
        }
    }
}
