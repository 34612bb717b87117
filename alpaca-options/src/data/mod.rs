pub mod decode;
pub mod types;

pub use decode::{decode_contract, decode_market_data, decode_snapshot_entry, decode_stored, Dialect};
pub use types::{
    Bar, Contract, ExerciseStyle, Greeks, MarketData, MarketDataFragment, OptionType, Query,
    Quote, Trade,
};
