mod common;

use std::sync::Arc;

use alpaca_options::client::{LogProgress, RawResponse, RequestSender, RetryPolicy, TransportError};
use alpaca_options::{
    Contract, Credentials, EndpointMode, FetchConfig, FetchError, MarketData, MarketDataMerger,
    OptionType, OptionsFetcher, Phase, Query,
};
use common::*;
use rust_decimal_macros::dec;
use serde_json::json;

const SYM_335: &str = "TSLA250523C00335000";
const SYM_340: &str = "TSLA250523C00340000";
const SYM_345: &str = "TSLA250523C00345000";

fn no_snapshots() -> Result<RawResponse, TransportError> {
    ok(snapshots_page(vec![], None))
}

fn ids(contracts: &[Contract]) -> Vec<&str> {
    contracts.iter().map(|c| c.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_two_pages_with_one_retry() {
    let transport = ScriptedTransport::new(|url, n| {
        if is_contracts(url) {
            if n == 0 {
                return status(500);
            }
            return match page_token(url).as_str() {
                "" => ok(contracts_page(vec![contract("id-1", SYM_335)], Some("p2"))),
                _ => ok(contracts_page(vec![contract("id-2", SYM_340)], Some(""))),
            };
        }
        ok(snapshots_page(
            vec![(SYM_335, snapshot(12.3, 12.6)), (SYM_340, snapshot(10.1, 10.4))],
            None,
        ))
    });

    let out = fetcher(transport.clone()).run(&query(), -1).await.unwrap();

    assert_eq!(ids(&out.contracts), vec!["id-1", "id-2"]);
    assert_eq!(out.stats.retries, 1);
    assert_eq!(out.stats.requests, 3);
    assert!(out.unmatched.is_empty());
    assert!(out.log.is_empty());
    assert_eq!(transport.calls_to("/options/contracts"), 3);

    let first = &out.contracts[0];
    assert_eq!(first.strike_price, dec!(335));
    assert_eq!(first.option_type, Some(OptionType::Call));
    assert_eq!(first.multiplier, 100);
    assert_eq!(first.market_data.latest_quote.bid_price, 12.3);
    assert_eq!(first.market_data.greeks.delta, 0.52);
    assert_eq!(out.contracts[1].market_data.latest_quote.ask_price, 10.4);

    let calls = transport.calls();
    assert_eq!(param(&calls[0].url, "underlying_symbols").as_deref(), Some("TSLA"));
    assert_eq!(param(&calls[0].url, "expiration_date_gte").as_deref(), Some("2025-05-23"));
    assert_eq!(param(&calls[0].url, "strike_price_lte").as_deref(), Some("10000"));
    assert_eq!(page_token(&calls[2].url), "p2");
}

#[tokio::test(start_paused = true)]
async fn test_empty_token_stops_after_one_request() {
    let transport = ScriptedTransport::new(|url, _| {
        if is_contracts(url) {
            ok(contracts_page(vec![contract("id-1", SYM_335)], Some("")))
        } else {
            no_snapshots()
        }
    });

    let out = fetcher(transport.clone()).run(&query(), -1).await.unwrap();
    assert_eq!(out.contracts.len(), 1);
    assert_eq!(transport.calls_to("/options/contracts"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_pages_keep_one_copy() {
    let transport = ScriptedTransport::new(|url, _| {
        if !is_contracts(url) {
            return no_snapshots();
        }
        match page_token(url).as_str() {
            "" => ok(contracts_page(
                vec![contract("a", SYM_335), contract("b", SYM_340)],
                Some("p2"),
            )),
            _ => ok(contracts_page(
                vec![contract("b", SYM_340), contract("c", SYM_345)],
                None,
            )),
        }
    });

    let out = fetcher(transport).run(&query(), -1).await.unwrap();
    assert_eq!(ids(&out.contracts), vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_cap_stops_mid_page() {
    let transport = ScriptedTransport::new(|url, _| {
        if !is_contracts(url) {
            return no_snapshots();
        }
        ok(contracts_page(
            vec![
                contract("a", SYM_335),
                contract("b", SYM_340),
                contract("c", SYM_345),
            ],
            Some("more"),
        ))
    });

    let out = fetcher(transport.clone()).run(&query(), 2).await.unwrap();
    assert_eq!(ids(&out.contracts), vec!["a", "b"]);
    assert!(out.capped);
    assert_eq!(transport.calls_to("/options/contracts"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cap_still_reports_last_page() {
    let transport = ScriptedTransport::new(|url, _| {
        if !is_contracts(url) {
            return no_snapshots();
        }
        ok(contracts_page(
            vec![
                contract("a", SYM_335),
                contract("b", SYM_340),
                contract("c", SYM_345),
            ],
            Some("more"),
        ))
    });
    let progress = Arc::new(RecordingProgress::default());

    fetcher(transport)
        .with_progress(progress.clone())
        .run(&query(), 2)
        .await
        .unwrap();

    let pages = progress.pages(Phase::Contracts);
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].requests, 1);
    assert_eq!(pages[0].items, 2);
}

#[tokio::test(start_paused = true)]
async fn test_zero_page_spacing_still_paginates() {
    let transport = ScriptedTransport::new(|url, _| {
        if !is_contracts(url) {
            return no_snapshots();
        }
        match page_token(url).as_str() {
            "" => ok(contracts_page(vec![contract("a", SYM_335)], Some("p2"))),
            _ => ok(contracts_page(vec![contract("b", SYM_340)], None)),
        }
    });
    let config = FetchConfig {
        page_spacing_ms: 0,
        ..FetchConfig::default()
    };

    let out = fetcher_with(config, transport.clone())
        .run(&query(), -1)
        .await
        .unwrap();
    assert_eq!(ids(&out.contracts), vec!["a", "b"]);
    assert!(!out.capped);
    assert_eq!(transport.calls_to("/options/contracts"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_symbol_reported_once() {
    let transport = ScriptedTransport::new(|url, _| {
        if is_contracts(url) {
            return ok(contracts_page(vec![contract("id-1", SYM_335)], None));
        }
        match page_token(url).as_str() {
            "" => ok(snapshots_page(
                vec![(SYM_335, snapshot(12.3, 12.6)), ("TSLA250523C00999000", snapshot(0.1, 0.2))],
                Some("s2"),
            )),
            _ => ok(snapshots_page(
                vec![("TSLA250523C00999000", snapshot(0.1, 0.2))],
                None,
            )),
        }
    });

    let out = fetcher(transport.clone()).run(&query(), -1).await.unwrap();
    assert_eq!(out.unmatched.len(), 1);
    assert!(out.unmatched.contains("TSLA250523C00999000"));
    assert_eq!(out.contracts[0].market_data.latest_quote.bid_price, 12.3);
    assert_eq!(transport.calls_to("/snapshots/TSLA"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_merge_is_idempotent_and_leaves_unmatched_untouched() {
    let transport =
        ScriptedTransport::new(|_, _| ok(snapshots_page(vec![(SYM_335, snapshot(1.0, 1.2))], None)));
    let sender = RequestSender::new(transport, credentials(), RetryPolicy::default());
    let config = FetchConfig::default();
    let progress = LogProgress;
    let merger = MarketDataMerger::new(&sender, &config, &progress);

    let mut contracts = vec![
        Contract {
            id: "a".into(),
            symbol: SYM_335.into(),
            ..Contract::default()
        },
        Contract {
            id: "b".into(),
            symbol: SYM_340.into(),
            ..Contract::default()
        },
    ];

    let report = merger.merge(&mut contracts, &query()).await;
    assert_eq!(report.updated, 1);
    let once = contracts.clone();

    merger.merge(&mut contracts, &query()).await;
    assert_eq!(contracts, once);
    assert_eq!(contracts[0].market_data.implied_volatility, 0.61);
    assert_eq!(contracts[1].market_data, MarketData::default());
}

#[tokio::test(start_paused = true)]
async fn test_partial_snapshots_are_additive() {
    let transport = ScriptedTransport::new(|url, _| match page_token(url).as_str() {
        "" => ok(snapshots_page(
            vec![(SYM_335, json!({"latestQuote": {"bp": 2.0, "ap": 2.2}}))],
            Some("s2"),
        )),
        _ => ok(snapshots_page(
            vec![(SYM_335, json!({"greeks": {"delta": 0.4}}))],
            None,
        )),
    });
    let sender = RequestSender::new(transport, credentials(), RetryPolicy::default());
    let config = FetchConfig::default();
    let progress = LogProgress;
    let merger = MarketDataMerger::new(&sender, &config, &progress);

    let mut contracts = vec![Contract {
        id: "a".into(),
        symbol: SYM_335.into(),
        ..Contract::default()
    }];
    merger.merge(&mut contracts, &query()).await;

    let md = &contracts[0].market_data;
    assert_eq!(md.latest_quote.bid_price, 2.0);
    assert_eq!(md.greeks.delta, 0.4);
    assert_eq!(md.implied_volatility, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_date_makes_no_request() {
    let transport = ScriptedTransport::new(|_, _| no_snapshots());
    let query = Query {
        underlying: "TSLA".into(),
        option_type: OptionType::Call,
        strike_range: [0, 10000],
        expiration_range: ["2025-13-01".into(), "2027-01-23".into()],
    };

    let err = fetcher(transport.clone()).run(&query, -1).await.unwrap_err();
    assert!(matches!(err.error, FetchError::InvalidDateRange(_)));
    assert!(err.items.is_empty());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_credentials_makes_no_request() {
    let transport = ScriptedTransport::new(|_, _| no_snapshots());
    let fetcher = OptionsFetcher::new(FetchConfig::default(), Credentials::default(), transport.clone());

    let err = fetcher.run(&query(), -1).await.unwrap_err();
    assert!(matches!(err.error, FetchError::CredentialsMissing));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_partial_contracts() {
    let transport = ScriptedTransport::new(|url, n| {
        if !is_contracts(url) {
            return no_snapshots();
        }
        let id = format!("id-{}", n);
        let next = format!("p{}", n + 1);
        ok(contracts_page(vec![contract(&id, &id)], Some(next.as_str())))
    });
    let config = FetchConfig {
        operation_timeout_ms: 2_500,
        ..FetchConfig::default()
    };

    let err = fetcher_with(config, transport.clone())
        .run(&query(), -1)
        .await
        .unwrap_err();

    assert!(matches!(err.error, FetchError::OperationTimeout { collected: 3 }));
    assert_eq!(ids(&err.items), vec!["id-0", "id-1", "id-2"]);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_contracts_page_aborts() {
    let transport = ScriptedTransport::new(|url, _| {
        if !is_contracts(url) {
            return no_snapshots();
        }
        match page_token(url).as_str() {
            "" => ok(contracts_page(vec![contract("a", SYM_335)], Some("p2"))),
            _ => ok(json!({"contracts": []})),
        }
    });

    let err = fetcher(transport.clone()).run(&query(), -1).await.unwrap_err();
    assert!(matches!(err.error, FetchError::MalformedResponse(_)));
    assert_eq!(ids(&err.items), vec!["a"]);
    assert_eq!(transport.calls_to("/snapshots/TSLA"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_market_data_failure_degrades() {
    let transport = ScriptedTransport::new(|url, _| {
        if is_contracts(url) {
            ok(contracts_page(vec![contract("a", SYM_335)], None))
        } else {
            ok(json!({"message": "subscription does not permit querying snapshots"}))
        }
    });

    let out = fetcher(transport).run(&query(), -1).await.unwrap();
    assert_eq!(out.contracts.len(), 1);
    assert_eq!(out.contracts[0].market_data, MarketData::default());
    assert_eq!(out.log.len(), 1);
    assert!(out.log[0].contains("subscription does not permit"));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_timeout_keeps_merged_data() {
    let transport = ScriptedTransport::new(|url, n| {
        if is_contracts(url) {
            return ok(contracts_page(vec![contract("a", SYM_335)], None));
        }
        let next = format!("s{}", n + 1);
        ok(snapshots_page(
            vec![(SYM_335, snapshot(12.3, 12.6))],
            Some(next.as_str()),
        ))
    });
    let config = FetchConfig {
        operation_timeout_ms: 2_500,
        ..FetchConfig::default()
    };

    let out = fetcher_with(config, transport.clone())
        .run(&query(), -1)
        .await
        .unwrap();

    assert_eq!(out.contracts.len(), 1);
    assert_eq!(out.contracts[0].market_data.latest_quote.bid_price, 12.3);
    assert_eq!(out.log.len(), 1);
    assert!(out.log[0].contains("timed out"));
    assert_eq!(transport.calls_to("/snapshots/TSLA"), 3);
    assert_eq!(out.stats.requests, 4);
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_page_without_snapshots_degrades() {
    let transport = ScriptedTransport::new(|url, _| {
        if is_contracts(url) {
            ok(contracts_page(vec![contract("a", SYM_335)], None))
        } else {
            ok(json!({"next_page_token": null}))
        }
    });

    let out = fetcher(transport).run(&query(), -1).await.unwrap();
    assert_eq!(out.contracts.len(), 1);
    assert_eq!(out.contracts[0].market_data, MarketData::default());
    assert_eq!(out.log.len(), 1);
    assert!(out.log[0].contains("missing snapshots object"));
}

#[tokio::test(start_paused = true)]
async fn test_market_data_failure_keeps_request_counts() {
    let transport = ScriptedTransport::new(|url, _| {
        if is_contracts(url) {
            return ok(contracts_page(vec![contract("a", SYM_335)], None));
        }
        match page_token(url).as_str() {
            "" => ok(snapshots_page(vec![(SYM_335, snapshot(12.3, 12.6))], Some("s2"))),
            _ => ok(json!({"snapshots": "unavailable"})),
        }
    });

    let out = fetcher(transport).run(&query(), -1).await.unwrap();
    assert_eq!(out.contracts[0].market_data.latest_quote.ask_price, 12.6);
    assert_eq!(out.log.len(), 1);
    assert_eq!(out.stats.requests, 2);
}

fn batch_transport() -> Arc<ScriptedTransport> {
    ScriptedTransport::new(|url, _| {
        if is_snapshots(url) {
            return no_snapshots();
        }
        let underlying = param(url, "underlying_symbols").unwrap_or_default();
        match (underlying.as_str(), page_token(url).as_str()) {
            ("TSLA", _) => ok(contracts_page(
                vec![contract("t1", SYM_335), contract("t2", SYM_340)],
                None,
            )),
            ("AAPL", "") => ok(contracts_page(
                vec![contract("a1", "AAPL250523C00200000")],
                Some("p2"),
            )),
            ("AAPL", _) => ok(json!({"unexpected": true})),
            _ => ok(contracts_page(vec![contract("m1", "MSFT250523C00400000")], None)),
        }
    })
}

fn batch_query(underlying: &str) -> Query {
    Query::new(underlying, OptionType::Call, [0, 10000], ["2025-05-23", "2027-01-23"]).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_batch_concatenates_in_order() {
    let transport = batch_transport();
    let queries = vec![batch_query("TSLA"), batch_query("MSFT")];

    let out = fetcher(transport).run_many(&queries, -1).await.unwrap();
    assert_eq!(ids(&out.contracts), vec!["t1", "t2", "m1"]);
    assert_eq!(out.stats.requests, 4);
}

#[tokio::test(start_paused = true)]
async fn test_batch_aborts_on_first_failure() {
    let transport = batch_transport();
    let queries = vec![batch_query("TSLA"), batch_query("AAPL"), batch_query("MSFT")];

    let err = fetcher(transport.clone())
        .run_many(&queries, -1)
        .await
        .unwrap_err();

    assert!(matches!(err.error, FetchError::MalformedResponse(_)));
    assert_eq!(ids(&err.items), vec!["t1", "t2", "a1"]);
    let msft_calls = transport
        .calls()
        .iter()
        .filter(|c| param(&c.url, "underlying_symbols").as_deref() == Some("MSFT"))
        .count();
    assert_eq!(msft_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_checks_every_date_before_fetching() {
    let transport = batch_transport();
    let mut bad = batch_query("MSFT");
    bad.expiration_range[0] = "2025-13-01".into();
    let queries = vec![batch_query("TSLA"), bad];

    let err = fetcher(transport.clone())
        .run_many(&queries, -1)
        .await
        .unwrap_err();

    assert!(matches!(err.error, FetchError::InvalidDateRange(_)));
    assert!(err.items.is_empty());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_endpoint_mode() {
    let transport = ScriptedTransport::new(|url, _| {
        let mut entry = snapshot(12.3, 12.6);
        entry["option_contracts"] = json!({"id": "n1", "strike_price": 335, "type": "call"});
        match page_token(url).as_str() {
            "" => ok(snapshots_page(vec![(SYM_335, entry)], Some("s2"))),
            _ => ok(snapshots_page(vec![(SYM_340, snapshot(10.1, 10.4))], None)),
        }
    });
    let config = FetchConfig {
        endpoint_mode: EndpointMode::Snapshots,
        ..FetchConfig::default()
    };

    let out = fetcher_with(config, transport.clone())
        .run(&query(), -1)
        .await
        .unwrap();

    assert_eq!(transport.calls_to("/options/contracts"), 0);
    assert_eq!(out.contracts.len(), 2);
    assert_eq!(out.contracts[0].id, "n1");
    assert_eq!(out.contracts[0].symbol, SYM_335);
    assert_eq!(out.contracts[0].strike_price, dec!(335));
    assert_eq!(out.contracts[0].market_data.latest_quote.ask_price, 12.6);
    assert_eq!(out.contracts[1].symbol, SYM_340);
    assert_eq!(
        param(&transport.calls()[0].url, "feed").as_deref(),
        Some("indicative")
    );
}

#[tokio::test(start_paused = true)]
async fn test_latest_ask() {
    let transport = ScriptedTransport::new(|url, _| {
        assert!(url.path().ends_with("/stocks/quotes/latest"));
        assert_eq!(param(url, "symbols").as_deref(), Some("TSLA"));
        ok(json!({"quotes": {"TSLA": {"ap": 341.5, "bp": 341.2}}}))
    });

    let ask = fetcher(transport).latest_ask("TSLA").await.unwrap();
    assert_eq!(ask, 341.5);
}
