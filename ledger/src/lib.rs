//! External-collaborator interfaces: the ledger the delegate forges on and
//! the optional currency-exchange provider.
//!
//! The payout engine treats the ledger as already-final ground truth. These
//! traits are the whole surface it relies on; the query/broadcast client
//! behind them is supplied by the operator.

pub mod error;
pub mod exchange;
pub mod http;
pub mod source;

pub use error::LedgerError;
pub use exchange::{ExchangeProvider, HttpExchange};
pub use http::HttpLedger;
pub use source::{BalanceDelta, LedgerBroadcast, LedgerSource};
