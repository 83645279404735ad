//! HTTP relay client implementing [`LedgerSource`] and [`LedgerBroadcast`].
//!
//! Speaks the relay's delegate-facing REST API. Transport failures map to
//! [`LedgerError::Transport`] and undecodable bodies to
//! [`LedgerError::Protocol`]; both abort the current cycle and retry after
//! backoff.

use serde::{Deserialize, Serialize};
use tbw_types::{
    Address, Amount, ForgedBlock, PublicKey, SettlementTransaction, Timestamp, TxId, UnvoteEvent,
    VoteEvent,
};

use crate::{BalanceDelta, LedgerBroadcast, LedgerError, LedgerSource};

#[derive(Deserialize)]
struct VoteHistoryBody {
    votes: Vec<VoteRow>,
    unvotes: Vec<VoteRow>,
}

#[derive(Deserialize)]
struct VoteRow {
    #[serde(rename = "publicKey")]
    public_key: String,
    timestamp: u64,
}

#[derive(Deserialize)]
struct ActivityBody {
    debit: u64,
    credit: u64,
}

#[derive(Deserialize)]
struct ForgedBody {
    reward: u64,
}

#[derive(Deserialize)]
struct BlockRow {
    height: u64,
    timestamp: u64,
    reward: u64,
    fees: u64,
}

#[derive(Deserialize)]
struct WalletBody {
    nonce: u64,
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    transactions: &'a [SettlementTransaction],
}

#[derive(Deserialize)]
struct SubmitResponse {
    accepted: Vec<String>,
}

/// Relay-backed ledger client for one delegate.
pub struct HttpLedger {
    client: reqwest::blocking::Client,
    base_url: String,
    delegate: String,
}

impl HttpLedger {
    pub fn new(base_url: impl Into<String>, delegate: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            delegate: delegate.into(),
        }
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, LedgerError> {
        self.client
            .get(format!("{}/{path}", self.base_url))
            .query(query)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .json::<T>()
            .map_err(|e| LedgerError::Protocol(e.to_string()))
    }
}

impl LedgerSource for HttpLedger {
    fn votes(&self, since: Timestamp) -> Result<(Vec<VoteEvent>, Vec<UnvoteEvent>), LedgerError> {
        let body: VoteHistoryBody = self.get(
            &format!("delegates/{}/votes", self.delegate),
            &[("since", since.as_secs().to_string())],
        )?;
        let votes = body
            .votes
            .into_iter()
            .map(|r| VoteEvent {
                voter_public_key: PublicKey::new(r.public_key),
                timestamp: Timestamp::new(r.timestamp),
            })
            .collect();
        let unvotes = body
            .unvotes
            .into_iter()
            .map(|r| UnvoteEvent {
                voter_public_key: PublicKey::new(r.public_key),
                timestamp: Timestamp::new(r.timestamp),
            })
            .collect();
        Ok((votes, unvotes))
    }

    fn balance_delta(
        &self,
        address: &Address,
        up_to: Timestamp,
        since: Timestamp,
    ) -> Result<BalanceDelta, LedgerError> {
        let body: ActivityBody = self.get(
            &format!("wallets/{address}/activity"),
            &[
                ("from", since.as_secs().to_string()),
                ("to", up_to.as_secs().to_string()),
            ],
        )?;
        Ok(BalanceDelta {
            debit: Amount::new(body.debit),
            credit: Amount::new(body.credit),
        })
    }

    fn block_rewards(
        &self,
        address: &Address,
        up_to: Timestamp,
        since: Timestamp,
    ) -> Result<Amount, LedgerError> {
        let body: ForgedBody = self.get(
            &format!("wallets/{address}/forged"),
            &[
                ("from", since.as_secs().to_string()),
                ("to", up_to.as_secs().to_string()),
            ],
        )?;
        Ok(Amount::new(body.reward))
    }

    fn new_blocks(&self, since: Timestamp) -> Result<Vec<ForgedBlock>, LedgerError> {
        let rows: Vec<BlockRow> = self.get(
            &format!("delegates/{}/blocks", self.delegate),
            &[("since", since.as_secs().to_string())],
        )?;
        Ok(rows
            .into_iter()
            .map(|r| {
                ForgedBlock::new(
                    r.height,
                    Timestamp::new(r.timestamp),
                    Amount::new(r.reward),
                    Amount::new(r.fees),
                )
            })
            .collect())
    }

    fn nonce(&self, account: &Address) -> Result<u64, LedgerError> {
        let body: WalletBody = self.get(&format!("wallets/{account}"), &[])?;
        Ok(body.nonce)
    }
}

impl LedgerBroadcast for HttpLedger {
    fn submit(&self, transactions: &[SettlementTransaction]) -> Result<Vec<TxId>, LedgerError> {
        let response: SubmitResponse = self
            .client
            .post(format!("{}/transactions", self.base_url))
            .json(&SubmitBody { transactions })
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .json()
            .map_err(|e| LedgerError::Protocol(e.to_string()))?;
        tracing::info!(
            submitted = transactions.len(),
            accepted = response.accepted.len(),
            "transactions broadcast"
        );
        Ok(response.accepted.into_iter().map(TxId::new).collect())
    }
}
