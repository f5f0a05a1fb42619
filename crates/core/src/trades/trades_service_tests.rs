#[cfg(test)]
mod tests {
    use crate::errors::{DatabaseError, Error, Result, ValidationError};
    use crate::history::{HistoryEntry, HistoryFilter, HistoryRepositoryTrait, TradeType};
    use crate::lots::test_support::MockLotRepository;
    use crate::lots::{Lot, LotKey, LotLedger, LotLedgerTrait, PriceQuote};
    use crate::trades::{SyncRequest, TradeRequest, TradeService, TradeServiceTrait};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, RwLock};

    const ACCOUNT_ID: &str = "test-user";
    const MARKET: &str = "poloniex";

    // --- Mock HistoryRepository ---
    #[derive(Default)]
    struct MockHistoryRepository {
        entries: RwLock<Vec<HistoryEntry>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl HistoryRepositoryTrait for MockHistoryRepository {
        async fn append(&self, entries: Vec<HistoryEntry>) -> Result<usize> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Database(DatabaseError::QueryFailed(
                    "history table locked".to_string(),
                )));
            }
            let count = entries.len();
            self.entries.write().unwrap().extend(entries);
            Ok(count)
        }

        fn list(
            &self,
            account_id: &str,
            market: &str,
            filter: &HistoryFilter,
        ) -> Result<Vec<HistoryEntry>> {
            Ok(self
                .entries
                .read()
                .unwrap()
                .iter()
                .filter(|e| e.account_id == account_id && e.market == market)
                .filter(|e| filter.base.as_ref().map_or(true, |b| &e.base == b))
                .filter(|e| filter.asset_type.as_ref().map_or(true, |a| &e.asset_type == a))
                .cloned()
                .collect())
        }
    }

    struct Fixture {
        lots: Arc<MockLotRepository>,
        history: Arc<MockHistoryRepository>,
        ledger: Arc<LotLedger>,
        service: TradeService,
    }

    fn setup() -> Fixture {
        let lots = Arc::new(MockLotRepository::new());
        let history = Arc::new(MockHistoryRepository::default());
        let ledger = Arc::new(LotLedger::new(lots.clone()));
        let service = TradeService::new(ledger.clone(), history.clone());
        Fixture {
            lots,
            history,
            ledger,
            service,
        }
    }

    fn trade(base: &str, asset_type: &str, units: Decimal, rate: Decimal) -> TradeRequest {
        TradeRequest {
            base: base.to_string(),
            asset_type: asset_type.to_string(),
            units,
            rate,
        }
    }

    fn history(f: &Fixture) -> Vec<HistoryEntry> {
        f.service
            .get_history(ACCOUNT_ID, MARKET, &HistoryFilter::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_buy_adds_lot_and_records_history() {
        let f = setup();

        let lot = f
            .service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(1.23), dec!(2500)))
            .await
            .unwrap();

        assert_eq!(lot.base, "USDT");
        assert_eq!(lot.asset_type, "BTC");
        assert_eq!(lot.units, dec!(1.23));

        let entries = history(&f);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trade_type, TradeType::Buy);
        assert_eq!(entries[0].total, dec!(3075));
        assert_eq!(entries[0].cost_basis, None);
    }

    #[tokio::test]
    async fn test_sell_reports_realized_gain_from_cheapest_lots() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(2), dec!(2500)))
            .await
            .unwrap();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(1), dec!(2400)))
            .await
            .unwrap();

        let sale = f
            .service
            .sell(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(2.5), dec!(3000)))
            .await
            .unwrap();

        assert_eq!(sale.proceeds, dec!(7500));
        // 1 @ 2400 + 1.5 @ 2500
        assert_eq!(sale.cost_basis, dec!(6150));
        assert_eq!(sale.realized_gain, dec!(1350));

        let remaining = f
            .ledger
            .load_lots(&LotKey::new(ACCOUNT_ID, MARKET, "USDT", "BTC"))
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!((remaining[0].units, remaining[0].rate), (dec!(0.5), dec!(2500)));

        let entries = history(&f);
        let sell = entries.last().unwrap();
        assert_eq!(sell.trade_type, TradeType::Sell);
        assert_eq!(sell.realized_gain(), Some(dec!(1350)));
    }

    #[tokio::test]
    async fn test_sell_more_than_held_records_nothing() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "ETH", dec!(1), dec!(200)))
            .await
            .unwrap();

        let err = f
            .service
            .sell(ACCOUNT_ID, MARKET, trade("USDT", "ETH", dec!(1.5), dec!(210)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InsufficientHoldings { .. }));
        assert_eq!(history(&f).len(), 1);
    }

    #[tokio::test]
    async fn test_sell_with_negative_rate_is_rejected_before_removal() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "ETH", dec!(1), dec!(200)))
            .await
            .unwrap();

        let err = f
            .service
            .sell(ACCOUNT_ID, MARKET, trade("USDT", "ETH", dec!(1), dec!(-1)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidQuantity(_)));
        assert_eq!(f.lots.all_lots().len(), 1);
    }

    #[tokio::test]
    async fn test_history_failure_keeps_ledger_change() {
        let f = setup();
        f.history.fail.store(true, Ordering::SeqCst);

        let err = f
            .service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(1), dec!(100)))
            .await
            .unwrap_err();

        assert!(err.is_storage_unavailable());
        assert_eq!(f.lots.all_lots().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_balances_records_reconciliation_entries() {
        let f = setup();
        let seeded = |asset: &str, rate: Decimal| Lot {
            id: format!("{}-{}", asset, rate),
            base: "BTC".to_string(),
            asset_type: asset.to_string(),
            units: dec!(1),
            rate,
            created_at: Utc::now(),
        };
        f.lots.seed(
            &LotKey::new(ACCOUNT_ID, MARKET, "BTC", "ETH"),
            vec![seeded("ETH", dec!(0.1)), seeded("ETH", dec!(0.2))],
        );
        f.lots.seed(
            &LotKey::new(ACCOUNT_ID, MARKET, "BTC", "LTC"),
            vec![seeded("LTC", dec!(0.01))],
        );

        let request = SyncRequest {
            base: "BTC".to_string(),
            balances: HashMap::from([
                ("ETH".to_string(), dec!(1)),
                ("LTC".to_string(), dec!(3)),
                ("XMR".to_string(), Decimal::ZERO),
            ]),
            prices: HashMap::from([
                (
                    "ETH".to_string(),
                    PriceQuote {
                        ask: dec!(0.16),
                        bid: Some(dec!(0.15)),
                    },
                ),
                ("LTC".to_string(), PriceQuote::from_ask(dec!(0.02))),
            ]),
        };

        let result = f
            .service
            .sync_balances(ACCOUNT_ID, MARKET, request)
            .await
            .unwrap();

        assert_eq!(result.len(), 3);
        assert!(result["XMR"].is_empty());
        assert_eq!(result["ETH"].len(), 1);
        assert_eq!(result["ETH"][0].rate, dec!(0.2));
        assert_eq!(result["LTC"].len(), 2);

        let entries = history(&f);
        assert_eq!(entries.len(), 2);

        let eth = entries.iter().find(|e| e.asset_type == "ETH").unwrap();
        assert_eq!(eth.trade_type, TradeType::ReconcileOut);
        assert_eq!(eth.units, dec!(1));
        assert_eq!(eth.rate, dec!(0.15));
        assert_eq!(eth.cost_basis, Some(dec!(0.1)));

        let ltc = entries.iter().find(|e| e.asset_type == "LTC").unwrap();
        assert_eq!(ltc.trade_type, TradeType::ReconcileIn);
        assert_eq!(ltc.units, dec!(2));
        assert_eq!(ltc.rate, dec!(0.02));
        assert_eq!(ltc.total, dec!(0.04));
    }

    #[tokio::test]
    async fn test_sync_disposal_without_quote_reports_no_gain() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "ETH", dec!(2), dec!(100)))
            .await
            .unwrap();

        let request = SyncRequest {
            base: "USDT".to_string(),
            balances: HashMap::from([("ETH".to_string(), dec!(0.5))]),
            prices: HashMap::new(),
        };
        f.service
            .sync_balances(ACCOUNT_ID, MARKET, request)
            .await
            .unwrap();

        let entries = history(&f);
        let out = entries.last().unwrap();
        assert_eq!(out.trade_type, TradeType::ReconcileOut);
        assert_eq!(out.rate, dec!(100));
        assert_eq!(out.realized_gain(), Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_search_assets_groups_by_base_and_asset() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(2), dec!(2500)))
            .await
            .unwrap();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(1), dec!(2400)))
            .await
            .unwrap();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("BTC", "ETH", dec!(4), dec!(0.05)))
            .await
            .unwrap();
        f.service
            .buy("someone-else", MARKET, trade("USDT", "BTC", dec!(9), dec!(1)))
            .await
            .unwrap();

        let holdings = f.service.search_assets(ACCOUNT_ID, MARKET).unwrap();

        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings["USDT"]["BTC"].len(), 2);
        assert_eq!(holdings["USDT"]["BTC"][0].rate, dec!(2500));
        assert_eq!(holdings["BTC"]["ETH"].len(), 1);
    }

    #[tokio::test]
    async fn test_history_filter_by_asset() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(1), dec!(2500)))
            .await
            .unwrap();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "ETH", dec!(1), dec!(200)))
            .await
            .unwrap();

        let filter = HistoryFilter {
            base: Some("USDT".to_string()),
            asset_type: Some("ETH".to_string()),
        };
        let entries = f.service.get_history(ACCOUNT_ID, MARKET, &filter).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].asset_type, "ETH");
    }

    fn units_held(f: &Fixture, base: &str, asset_type: &str) -> Decimal {
        f.ledger
            .load_lots(&LotKey::new(ACCOUNT_ID, MARKET, base, asset_type))
            .unwrap()
            .iter()
            .map(|lot| lot.units)
            .sum()
    }

    fn sync_request(balances: &[(&str, Decimal)]) -> SyncRequest {
        SyncRequest {
            base: "USDT".to_string(),
            balances: balances
                .iter()
                .map(|(asset, units)| (asset.to_string(), *units))
                .collect(),
            prices: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_sync_missing_price_for_later_asset_changes_nothing() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BCH", dec!(1), dec!(300)))
            .await
            .unwrap();

        let err = f
            .service
            .sync_balances(
                ACCOUNT_ID,
                MARKET,
                sync_request(&[("BCH", dec!(0.5)), ("ETH", dec!(1))]),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingPrice(ref asset)) if asset == "ETH"
        ));
        assert_eq!(units_held(&f, "USDT", "BCH"), dec!(1));
        assert_eq!(history(&f).len(), 1);
    }

    #[tokio::test]
    async fn test_sync_failure_still_records_committed_assets() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BCH", dec!(1), dec!(300)))
            .await
            .unwrap();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "ETH", dec!(1), dec!(200)))
            .await
            .unwrap();
        f.lots.fail_writes_for_asset("ETH");

        let err = f
            .service
            .sync_balances(
                ACCOUNT_ID,
                MARKET,
                sync_request(&[("BCH", dec!(0.5)), ("ETH", dec!(0.5))]),
            )
            .await
            .unwrap_err();

        assert!(err.is_storage_unavailable());
        assert_eq!(units_held(&f, "USDT", "BCH"), dec!(0.5));
        assert_eq!(units_held(&f, "USDT", "ETH"), dec!(1));

        let entries = history(&f);
        assert_eq!(entries.len(), 3);
        let disposal = &entries[2];
        assert_eq!(disposal.trade_type, TradeType::ReconcileOut);
        assert_eq!(disposal.asset_type, "BCH");
        assert_eq!(disposal.units, dec!(0.5));
        assert_eq!(disposal.cost_basis, Some(dec!(150)));
    }

    #[tokio::test]
    async fn test_buy_with_unrepresentable_total_is_rejected() {
        let f = setup();

        let err = f
            .service
            .buy(
                ACCOUNT_ID,
                MARKET,
                trade("USDT", "BTC", dec!(1000000000000000), dec!(1000000000000000)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidQuantity(_)));
        assert!(f.lots.all_lots().is_empty());
        assert!(history(&f).is_empty());
    }

    #[tokio::test]
    async fn test_sell_with_unrepresentable_proceeds_is_rejected_before_removal() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(2), dec!(1)))
            .await
            .unwrap();

        let err = f
            .service
            .sell(ACCOUNT_ID, MARKET, trade("USDT", "BTC", dec!(2), Decimal::MAX))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidQuantity(_)));
        assert_eq!(units_held(&f, "USDT", "BTC"), dec!(2));
        assert_eq!(history(&f).len(), 1);
    }

    #[tokio::test]
    async fn test_sync_disposal_with_unusable_quote_falls_back_to_average_cost() {
        let f = setup();
        f.service
            .buy(ACCOUNT_ID, MARKET, trade("USDT", "ETH", dec!(4), dec!(200)))
            .await
            .unwrap();

        let mut request = sync_request(&[("ETH", dec!(2))]);
        request
            .prices
            .insert("ETH".to_string(), PriceQuote::from_ask(Decimal::MAX));
        f.service
            .sync_balances(ACCOUNT_ID, MARKET, request)
            .await
            .unwrap();

        let entries = history(&f);
        let disposal = entries.last().unwrap();
        assert_eq!(disposal.trade_type, TradeType::ReconcileOut);
        assert_eq!(disposal.units, dec!(2));
        assert_eq!(disposal.rate, dec!(200));
        assert_eq!(disposal.realized_gain(), Some(Decimal::ZERO));
    }
}
