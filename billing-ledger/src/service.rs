//! Ledger service: validates and posts double-entry `LedgerEntry` rows
//!.

use std::sync::Arc;

use billing_core::{Clock, IdMinter, RequestContext};

use crate::errors::{LedgerError, LedgerResult};
use crate::store::LedgerStore;
use crate::types::{Direction, LedgerAccountCode, LedgerEntry, LedgerEntryLine, SourceType};

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    clock: Arc<Clock>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get_entry(&self, ctx: &RequestContext, id: i64) -> LedgerResult<LedgerEntry> {
        self.store.get_entry(ctx.org_id, id).await.ok_or(LedgerError::EntryNotFound(id))
    }

    pub async fn entries_for_source(
        &self,
        source_type: SourceType,
        source_id: i64,
    ) -> Vec<LedgerEntry> {
        self.store.entries_for_source(source_type, source_id).await
    }

    /// Validates `Σ debit = Σ credit` per currency (a single entry always
    /// carries one currency, so this reduces to the whole-entry balance)
    /// and persists the entry. Callers build `lines` against account ids
    /// resolved via [`LedgerService::account`].
    pub async fn create_entry(
        &self,
        ctx: &RequestContext,
        source_type: SourceType,
        source_id: i64,
        currency: billing_core::Currency,
        lines: Vec<LedgerEntryLine>,
    ) -> LedgerResult<LedgerEntry> {
        let entry = LedgerEntry {
            id: IdMinter::global().next_id(),
            org_id: ctx.org_id,
            source_type,
            source_id,
            occurred_at: self.clock.now(ctx),
            currency,
            lines,
        };
        let imbalance = entry.imbalance_cents();
        if imbalance != 0 {
            return Err(LedgerError::UnbalancedEntry { imbalance_cents: imbalance });
        }
        self.store.insert_entry(entry.clone()).await;
        Ok(entry)
    }

    pub async fn account(&self, ctx: &RequestContext, code: LedgerAccountCode) -> i64 {
        self.store.get_or_create_account(ctx.org_id, code).await.id
    }

    /// `Dr AR / Cr Revenue.Usage` (or `Revenue.Flat` for flat-priced
    /// items) posted once per rated amount at cycle close.
    pub async fn post_usage_accrual(
        &self,
        ctx: &RequestContext,
        cycle_id: i64,
        currency: billing_core::Currency,
        amount_cents: i64,
        revenue_code: LedgerAccountCode,
    ) -> LedgerResult<LedgerEntry> {
        let ar = self.account(ctx, LedgerAccountCode::AccountsReceivable).await;
        let revenue = self.account(ctx, revenue_code).await;
        self.create_entry(
            ctx,
            SourceType::UsageAccrual,
            cycle_id,
            currency,
            vec![
                LedgerEntryLine { account_id: ar, direction: Direction::Debit, amount_cents },
                LedgerEntryLine { account_id: revenue, direction: Direction::Credit, amount_cents },
            ],
        )
        .await
    }

    /// `Dr Cash / Cr AR`.
    pub async fn post_payment_succeeded(
        &self,
        ctx: &RequestContext,
        payment_id: i64,
        currency: billing_core::Currency,
        amount_cents: i64,
    ) -> LedgerResult<LedgerEntry> {
        let cash = self.account(ctx, LedgerAccountCode::Cash).await;
        let ar = self.account(ctx, LedgerAccountCode::AccountsReceivable).await;
        self.create_entry(
            ctx,
            SourceType::Payment,
            payment_id,
            currency,
            vec![
                LedgerEntryLine { account_id: cash, direction: Direction::Debit, amount_cents },
                LedgerEntryLine { account_id: ar, direction: Direction::Credit, amount_cents },
            ],
        )
        .await
    }

    /// `Dr AR / Cr Cash`.
    pub async fn post_refund(
        &self,
        ctx: &RequestContext,
        payment_id: i64,
        currency: billing_core::Currency,
        amount_cents: i64,
    ) -> LedgerResult<LedgerEntry> {
        let ar = self.account(ctx, LedgerAccountCode::AccountsReceivable).await;
        let cash = self.account(ctx, LedgerAccountCode::Cash).await;
        self.create_entry(
            ctx,
            SourceType::Refund,
            payment_id,
            currency,
            vec![
                LedgerEntryLine { account_id: ar, direction: Direction::Debit, amount_cents },
                LedgerEntryLine { account_id: cash, direction: Direction::Credit, amount_cents },
            ],
        )
        .await
    }

    /// `Dr Dispute.Reserve / Cr Cash` when funds are withdrawn for a
    /// dispute; the reversing entry uses the same accounts with
    /// directions swapped when the dispute is reinstated in the
    /// merchant's favor.
    pub async fn post_dispute_withdrawn(
        &self,
        ctx: &RequestContext,
        dispute_id: i64,
        currency: billing_core::Currency,
        amount_cents: i64,
    ) -> LedgerResult<LedgerEntry> {
        let reserve = self.account(ctx, LedgerAccountCode::DisputeReserve).await;
        let cash = self.account(ctx, LedgerAccountCode::Cash).await;
        self.create_entry(
            ctx,
            SourceType::DisputeWithdrawn,
            dispute_id,
            currency,
            vec![
                LedgerEntryLine { account_id: reserve, direction: Direction::Debit, amount_cents },
                LedgerEntryLine { account_id: cash, direction: Direction::Credit, amount_cents },
            ],
        )
        .await
    }

    pub async fn post_dispute_reinstated(
        &self,
        ctx: &RequestContext,
        dispute_id: i64,
        currency: billing_core::Currency,
        amount_cents: i64,
    ) -> LedgerResult<LedgerEntry> {
        let reserve = self.account(ctx, LedgerAccountCode::DisputeReserve).await;
        let cash = self.account(ctx, LedgerAccountCode::Cash).await;
        self.create_entry(
            ctx,
            SourceType::DisputeReinstated,
            dispute_id,
            currency,
            vec![
                LedgerEntryLine { account_id: cash, direction: Direction::Debit, amount_cents },
                LedgerEntryLine { account_id: reserve, direction: Direction::Credit, amount_cents },
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLedgerStore;
    use billing_core::{ActorType, Currency};

    fn ctx() -> RequestContext {
        RequestContext::new(1, ActorType::System)
    }

    fn service() -> LedgerService {
        let _ = IdMinter::install(1);
        LedgerService::new(InMemoryLedgerStore::new(), Arc::new(Clock::default()))
    }

    #[tokio::test]
    async fn balanced_entry_is_accepted() {
        let svc = service();
        let c = ctx();
        let entry = svc
            .post_usage_accrual(&c, 1, Currency::usd(), 500, LedgerAccountCode::RevenueUsage)
            .await
            .unwrap();
        assert_eq!(entry.imbalance_cents(), 0);
    }

    #[tokio::test]
    async fn unbalanced_entry_is_rejected() {
        let svc = service();
        let c = ctx();
        let ar = svc.account(&c, LedgerAccountCode::AccountsReceivable).await;
        let revenue = svc.account(&c, LedgerAccountCode::RevenueUsage).await;
        let err = svc
            .create_entry(
                &c,
                SourceType::UsageAccrual,
                1,
                Currency::usd(),
                vec![
                    LedgerEntryLine { account_id: ar, direction: Direction::Debit, amount_cents: 500 },
                    LedgerEntryLine { account_id: revenue, direction: Direction::Credit, amount_cents: 400 },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnbalancedEntry { imbalance_cents: 100 }));
    }

    #[tokio::test]
    async fn payment_then_refund_nets_ar_to_zero() {
        let svc = service();
        let c = ctx();
        svc.post_usage_accrual(&c, 1, Currency::usd(), 1000, LedgerAccountCode::RevenueUsage)
            .await
            .unwrap();
        svc.post_payment_succeeded(&c, 1, Currency::usd(), 1000).await.unwrap();
        let refund = svc.post_refund(&c, 1, Currency::usd(), 1000).await.unwrap();
        assert_eq!(refund.imbalance_cents(), 0);

        let entries = svc.entries_for_source(SourceType::Refund, 1).await;
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn same_account_pair_is_reused_across_postings() {
        let svc = service();
        let c = ctx();
        let first = svc.account(&c, LedgerAccountCode::Cash).await;
        let second = svc.account(&c, LedgerAccountCode::Cash).await;
        assert_eq!(first, second);
    }

    mod balance_law {
        use super::*;
        use proptest::prelude::*;

        // Universal invariant: for every LedgerEntry, Σ debits = Σ
        // credits. create_entry must accept arbitrary line sets
        // exactly when that holds and reject them otherwise.
        proptest! {
            #[test]
            fn create_entry_accepts_iff_balanced(
                debit in 0i64..1_000_000,
                credit in 0i64..1_000_000,
            ) {
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap()
                    .block_on(async {
                        let svc = service();
                        let c = ctx();
                        let ar = svc.account(&c, LedgerAccountCode::AccountsReceivable).await;
                        let revenue = svc.account(&c, LedgerAccountCode::RevenueUsage).await;
                        let result = svc
                            .create_entry(
                                &c,
                                SourceType::UsageAccrual,
                                1,
                                Currency::usd(),
                                vec![
                                    LedgerEntryLine { account_id: ar, direction: Direction::Debit, amount_cents: debit },
                                    LedgerEntryLine { account_id: revenue, direction: Direction::Credit, amount_cents: credit },
                                ],
                            )
                            .await;
                        if debit == credit {
                            prop_assert_eq!(result.unwrap().imbalance_cents(), 0);
                        } else {
                            prop_assert!(matches!(
                                result.unwrap_err(),
                                LedgerError::UnbalancedEntry { imbalance_cents } if imbalance_cents == debit - credit
                            ));
                        }
                        Ok(())
                    })?;
            }
        }
    }
}
