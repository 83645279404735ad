//! Currency-exchange provider interface and HTTP implementation.

use serde::Deserialize;
use tbw_types::{Address, Amount, ExchangeRoute};

/// Quotes a deposit address for converting a payout into another currency.
///
/// Infallible by contract: any provider failure returns the refund address,
/// so the payment proceeds on-chain unconverted instead of blocking the
/// settlement run.
pub trait ExchangeProvider {
    fn quote(&self, route: &ExchangeRoute, amount: Amount, refund: &Address) -> Address;
}

#[derive(Deserialize)]
struct QuoteResponse {
    status: String,
    #[serde(rename = "payinAddress")]
    payin_address: Option<String>,
    #[serde(rename = "exchangeId")]
    exchange_id: Option<String>,
}

/// Exchange provider speaking the common quote-endpoint JSON shape over
/// HTTP.
pub struct HttpExchange {
    client: reqwest::blocking::Client,
    /// Atomic units per whole token, for rendering the quote amount.
    atomic: u64,
}

impl HttpExchange {
    pub fn new(atomic: u64) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            atomic,
        }
    }

    /// Render an atomic amount as whole tokens truncated to 4 decimals,
    /// the precision quote endpoints accept.
    fn render_amount(&self, amount: Amount) -> String {
        let whole = amount.raw() / self.atomic;
        let frac = (amount.raw() % self.atomic) as u128 * 10_000 / self.atomic as u128;
        format!("{whole}.{frac:04}")
    }

    fn request_quote(
        &self,
        route: &ExchangeRoute,
        amount: Amount,
        refund: &Address,
    ) -> Result<QuoteResponse, reqwest::Error> {
        self.client
            .get(&route.provider_url)
            .query(&[
                ("fromCurrency", route.from_currency.as_str()),
                ("toCurrency", route.to_currency.as_str()),
                ("address", route.deposit_to.as_str()),
                ("fromAmount", self.render_amount(amount).as_str()),
                ("refundAddress", refund.as_str()),
            ])
            .send()?
            .json::<QuoteResponse>()
    }
}

impl ExchangeProvider for HttpExchange {
    fn quote(&self, route: &ExchangeRoute, amount: Amount, refund: &Address) -> Address {
        match self.request_quote(route, amount, refund) {
            Ok(resp) if resp.status == "success" => match resp.payin_address {
                Some(payin) => {
                    tracing::info!(
                        exchange_id = resp.exchange_id.as_deref().unwrap_or("-"),
                        recipient = %refund,
                        "exchange quote accepted"
                    );
                    Address::new(payin)
                }
                None => {
                    tracing::warn!(recipient = %refund, "exchange quote missing deposit address");
                    refund.clone()
                }
            },
            Ok(resp) => {
                tracing::warn!(status = %resp.status, recipient = %refund, "exchange quote refused");
                refund.clone()
            }
            Err(e) => {
                tracing::warn!(error = %e, recipient = %refund, "exchange provider unreachable");
                refund.clone()
            }
        }
    }
}
