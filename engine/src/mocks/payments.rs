//! Mock payment gateway for testing.

use crate::error::{EngineError, Result};
use crate::providers::PaymentGateway;
use crate::types::{ChargeId, Currency, IdempotencyKey, Money, PayoutAccount, RefundId, TransferId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

/// One transfer the mock processor actually issued.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCall {
    /// Destination account.
    pub destination: PayoutAccount,
    /// Transferred amount.
    pub amount: Money,
    /// Settlement currency.
    pub currency: Currency,
    /// Idempotency key the caller supplied.
    pub key: IdempotencyKey,
}

/// One refund the mock processor actually issued.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundCall {
    /// The refunded charge.
    pub charge: ChargeId,
    /// Idempotency key the caller supplied.
    pub key: IdempotencyKey,
}

#[derive(Debug, Default)]
struct GatewayData {
    transfers_by_key: HashMap<IdempotencyKey, TransferId>,
    refunds_by_key: HashMap<IdempotencyKey, RefundId>,
    transfer_calls: Vec<TransferCall>,
    refund_calls: Vec<RefundCall>,
    fail_next_transfers: usize,
    fail_next_refunds: usize,
    sequence: u64,
}

/// Mock payment gateway.
///
/// Honours idempotency keys the way a real processor does: a repeated call
/// with a seen key returns the original identifier without issuing a
/// second movement of money. Failures can be scripted to exercise retry
/// paths.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway {
    data: Arc<Mutex<GatewayData>>,
}

impl MockPaymentGateway {
    /// Create a gateway that succeeds on every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` transfer calls fail transiently.
    pub fn fail_next_transfers(&self, n: usize) {
        self.lock().fail_next_transfers = n;
    }

    /// Make the next `n` refund calls fail transiently.
    pub fn fail_next_refunds(&self, n: usize) {
        self.lock().fail_next_refunds = n;
    }

    /// Transfers actually issued (idempotent repeats excluded).
    #[must_use]
    pub fn transfer_calls(&self) -> Vec<TransferCall> {
        self.lock().transfer_calls.clone()
    }

    /// Refunds actually issued (idempotent repeats excluded).
    #[must_use]
    pub fn refund_calls(&self) -> Vec<RefundCall> {
        self.lock().refund_calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn transfer(
        &self,
        destination: &PayoutAccount,
        amount: Money,
        currency: Currency,
        key: &IdempotencyKey,
    ) -> impl Future<Output = Result<TransferId>> + Send {
        let data = Arc::clone(&self.data);
        let destination = destination.clone();
        let key = key.clone();
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);

            if data.fail_next_transfers > 0 {
                data.fail_next_transfers -= 1;
                return Err(EngineError::Payment("injected transfer failure".into()));
            }

            if let Some(existing) = data.transfers_by_key.get(&key) {
                return Ok(existing.clone());
            }

            data.sequence += 1;
            let id = TransferId::new(format!("tr_{:06}", data.sequence));
            data.transfers_by_key.insert(key.clone(), id.clone());
            data.transfer_calls.push(TransferCall {
                destination,
                amount,
                currency,
                key,
            });
            Ok(id)
        }
    }

    fn refund(
        &self,
        charge: &ChargeId,
        key: &IdempotencyKey,
    ) -> impl Future<Output = Result<RefundId>> + Send {
        let data = Arc::clone(&self.data);
        let charge = charge.clone();
        let key = key.clone();
        async move {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);

            if data.fail_next_refunds > 0 {
                data.fail_next_refunds -= 1;
                return Err(EngineError::Payment("injected refund failure".into()));
            }

            if let Some(existing) = data.refunds_by_key.get(&key) {
                return Ok(existing.clone());
            }

            data.sequence += 1;
            let id = RefundId::new(format!("re_{:06}", data.sequence));
            data.refunds_by_key.insert(key.clone(), id.clone());
            data.refund_calls.push(RefundCall { charge, key });
            Ok(id)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::GigId;

    #[tokio::test]
    async fn idempotency_key_dedupes_transfers() {
        let gateway = MockPaymentGateway::new();
        let destination = PayoutAccount::new("acct_1");
        let key = IdempotencyKey::for_transition(GigId::new(), "clearing");

        let a = gateway
            .transfer(&destination, Money::from_pounds(50), Currency::Gbp, &key)
            .await
            .unwrap();
        let b = gateway
            .transfer(&destination, Money::from_pounds(50), Currency::Gbp, &key)
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(gateway.transfer_calls().len(), 1);
    }

    #[tokio::test]
    async fn scripted_failure_then_success() {
        let gateway = MockPaymentGateway::new();
        gateway.fail_next_transfers(1);
        let destination = PayoutAccount::new("acct_1");
        let key = IdempotencyKey::for_transition(GigId::new(), "clearing");

        let err = gateway
            .transfer(&destination, Money::from_pounds(50), Currency::Gbp, &key)
            .await
            .unwrap_err();
        assert!(err.is_transient());

        gateway
            .transfer(&destination, Money::from_pounds(50), Currency::Gbp, &key)
            .await
            .unwrap();
        assert_eq!(gateway.transfer_calls().len(), 1);
    }
}
