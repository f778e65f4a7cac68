//! Payment-processor provider trait.
//!
//! The processor itself is out of scope; the engine only reaches it
//! through a narrow transfer/refund capability. Every call carries an
//! idempotency key derived from the gig id and the transition being
//! applied, so a retry after a lost acknowledgement can never move money
//! twice.

use crate::error::Result;
use crate::types::{ChargeId, Currency, IdempotencyKey, Money, PayoutAccount, RefundId, TransferId};
use std::future::Future;

/// The payment-processor collaborator.
pub trait PaymentGateway: Send + Sync {
    /// Transfer a cleared fee to a performer's payout destination.
    ///
    /// Implementations must treat `key` as an idempotency key: a repeated
    /// call with the same key returns the original transfer rather than
    /// issuing a second one.
    ///
    /// # Errors
    ///
    /// Returns a transient payment error if the processor call fails or
    /// times out; the transfer must not be assumed issued without the
    /// returned identifier.
    fn transfer(
        &self,
        destination: &PayoutAccount,
        amount: Money,
        currency: Currency,
        key: &IdempotencyKey,
    ) -> impl Future<Output = Result<TransferId>> + Send;

    /// Refund an escrow charge back to the venue.
    ///
    /// Idempotent under `key`, like [`PaymentGateway::transfer`].
    ///
    /// # Errors
    ///
    /// Returns a transient payment error if the processor call fails or
    /// times out.
    fn refund(
        &self,
        charge: &ChargeId,
        key: &IdempotencyKey,
    ) -> impl Future<Output = Result<RefundId>> + Send;
}
