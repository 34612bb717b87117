//! URL construction for the Alpaca endpoints.

use reqwest::Url;

use crate::config::FetchConfig;
use crate::data::Query;
use crate::error::{FetchError, Result};

fn parse_base(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| FetchError::Config(format!("invalid endpoint {:?}: {}", raw, e)))
}

/// One page of the contracts listing.
pub fn contracts_page_url(config: &FetchConfig, query: &Query, page_token: &str) -> Result<Url> {
    let mut url = parse_base(&config.contracts_url)?;
    url.query_pairs_mut()
        .append_pair("underlying_symbols", &query.underlying)
        .append_pair("show_deliverables", "false")
        .append_pair("expiration_date_gte", query.expiration_start())
        .append_pair("expiration_date_lte", query.expiration_end())
        .append_pair("type", query.option_type.as_str())
        .append_pair("strike_price_gte", &query.strike_low().to_string())
        .append_pair("strike_price_lte", &query.strike_high().to_string())
        .append_pair("page_token", page_token)
        .append_pair("limit", &config.page_size.to_string());
    Ok(url)
}

/// One page of option snapshots for the query's underlying.
pub fn snapshots_page_url(config: &FetchConfig, query: &Query, page_token: &str) -> Result<Url> {
    let mut url = parse_base(&config.snapshots_url)?;
    url.path_segments_mut()
        .map_err(|_| FetchError::Config(format!("cannot extend {:?}", config.snapshots_url)))?
        .pop_if_empty()
        .push(&query.underlying);
    url.query_pairs_mut()
        .append_pair("feed", &config.feed)
        .append_pair("limit", &config.page_size.to_string())
        .append_pair("page_token", page_token)
        .append_pair("strike_price_gte", &query.strike_low().to_string())
        .append_pair("strike_price_lte", &query.strike_high().to_string())
        .append_pair("expiration_date_gte", query.expiration_start())
        .append_pair("expiration_date_lte", query.expiration_end())
        .append_pair("type", query.option_type.as_str());
    Ok(url)
}

/// Latest stock quote for one ticker.
pub fn stock_quote_url(config: &FetchConfig, ticker: &str) -> Result<Url> {
    let mut url = parse_base(&config.stocks_quotes_url)?;
    url.query_pairs_mut().append_pair("symbols", ticker);
    Ok(url)
}
