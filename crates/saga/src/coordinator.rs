//! Checkout coordinator for orchestrating the checkout saga.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::{Money, OrderId, OwnerId};
use domain::{NewOrder, Order};
use store::{CartStore, OrderStore, OwnerLease, OwnerLock, StoreError};

use crate::admission::{self, Admission};
use crate::attempt::CheckoutAttempt;
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, RemoteError};
use crate::services::conversion::ConversionService;
use crate::services::payment::{ChargeRequest, IdempotencyKey, PaymentInstrument, PaymentService};
use crate::step::CheckoutStep;

/// Input of a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub owner: OwnerId,
    pub instrument: PaymentInstrument,
}

impl CheckoutRequest {
    pub fn new(owner: impl Into<OwnerId>, instrument: PaymentInstrument) -> Self {
        Self {
            owner: owner.into(),
            instrument,
        }
    }
}

/// Result of reconciling a single order against the payment service.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// A charge existed; the order was settled with its reference.
    Settled(Order),
    /// No charge existed; the order was cancelled.
    Cancelled(Order),
    /// The order was already settled or cancelled; nothing changed.
    AlreadyTerminal(Order),
}

impl ReconcileOutcome {
    pub fn order(&self) -> &Order {
        match self {
            ReconcileOutcome::Settled(order)
            | ReconcileOutcome::Cancelled(order)
            | ReconcileOutcome::AlreadyTerminal(order) => order,
        }
    }
}

/// Outcome of the conversion step.
enum Conversion {
    /// Amount to charge in the payment currency.
    Converted(Money),
    /// The resumed order already has a captured charge.
    AlreadyCaptured(String),
}

/// Orchestrates the checkout saga.
///
/// The coordinator drives cart → order → conversion → payment → settlement
/// under the owner's lock, cancelling the order when conversion or payment
/// fails. All collaborators are shared trait objects so the same stores can
/// back the HTTP handlers.
pub struct CheckoutCoordinator {
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    locks: Arc<dyn OwnerLock>,
    conversion: Arc<dyn ConversionService>,
    payment: Arc<dyn PaymentService>,
    config: CheckoutConfig,
}

impl CheckoutCoordinator {
    /// Creates a new checkout coordinator.
    pub fn new(
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
        locks: Arc<dyn OwnerLock>,
        conversion: Arc<dyn ConversionService>,
        payment: Arc<dyn PaymentService>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            carts,
            orders,
            locks,
            conversion,
            payment,
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Checks out the owner's cart.
    ///
    /// Returns the settled order. On failure the error reports the step that
    /// failed and the state the order was left in. Dropping the returned
    /// future releases the owner's lock; the order then stays ready and the
    /// next checkout resumes it with the same idempotency key.
    #[tracing::instrument(skip(self, request), fields(owner = %request.owner))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order, CheckoutError> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.checkout_locked(&request).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("checkout_duration_seconds").record(duration);
        match &result {
            Ok(order) => {
                metrics::counter!("checkout_settled_total").increment(1);
                tracing::info!(
                    order_id = %order.id(),
                    payment_reference = order.payment_reference().unwrap_or_default(),
                    duration,
                    "checkout settled"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.code()).increment(1);
                tracing::warn!(
                    step = %e.step(),
                    order_id = ?e.order_id(),
                    order_left = ?e.order_left(),
                    error = %e,
                    "checkout failed"
                );
            }
        }
        result
    }

    async fn checkout_locked(&self, request: &CheckoutRequest) -> Result<Order, CheckoutError> {
        let lease = self.acquire_lease(&request.owner).await?;

        match self.run(request).await {
            Ok(order) => {
                // 7. Release the cart (lease is handed over)
                self.release_cart(lease).await;
                Ok(order)
            }
            Err(e) => {
                release_lease(lease).await;
                Err(e)
            }
        }
    }

    async fn run(&self, request: &CheckoutRequest) -> Result<Order, CheckoutError> {
        let attempt = self.begin(&request.owner).await?;
        let payment_reference = match self.convert(&attempt).await? {
            Conversion::Converted(amount) => {
                self.capture(&attempt, amount, &request.instrument).await?
            }
            Conversion::AlreadyCaptured(payment_reference) => payment_reference,
        };
        self.settle(&attempt, payment_reference).await
    }

    async fn acquire_lease(&self, owner: &OwnerId) -> Result<OwnerLease, CheckoutError> {
        self.locks
            .acquire(owner, self.config.lock_timeout)
            .await
            .map_err(|e| match e {
                StoreError::LockTimeout { owner, waited } => {
                    tracing::info!(%owner, ?waited, "owner lock busy");
                    CheckoutError::CheckoutInProgress { owner }
                }
                other => CheckoutError::store(CheckoutStep::AcquireLock, None, other),
            })
    }

    /// Steps 1 to 3: snapshot the cart and create or resume the order.
    async fn begin(&self, owner: &OwnerId) -> Result<CheckoutAttempt, CheckoutError> {
        // 1. Acquire the cart
        let cart = self
            .carts
            .read(owner)
            .await
            .map_err(|e| CheckoutError::store(CheckoutStep::AcquireCart, None, e))?
            .filter(|cart| !cart.is_empty())
            .ok_or_else(|| CheckoutError::EmptyCart {
                owner: owner.clone(),
            })?;

        // 2. Admission check
        let admission = admission::admit(self.orders.as_ref(), owner)
            .await
            .map_err(|e| CheckoutError::store(CheckoutStep::Admission, None, e))?;

        match admission {
            Admission::Resume(order) => {
                metrics::counter!("checkout_resumed_total").increment(1);
                tracing::info!(order_id = %order.id(), "resuming ready order");
                Ok(CheckoutAttempt::resumed(owner.clone(), order))
            }
            Admission::Fresh => {
                // 3. Create the order
                let new_order = NewOrder::from_cart(
                    owner.clone(),
                    &cart,
                    self.config.settlement_currency.clone(),
                )?;
                let order = self.orders.create(new_order).await.map_err(|e| match e {
                    StoreError::ReadyOrderExists { owner } => {
                        CheckoutError::CheckoutInProgress { owner }
                    }
                    other => CheckoutError::store(CheckoutStep::CreateOrder, None, other),
                })?;

                tracing::info!(order_id = %order.id(), total = %order.total(), "order created");
                Ok(CheckoutAttempt::fresh(owner.clone(), order))
            }
        }
    }

    /// 4. Convert the total to the payment currency.
    async fn convert(&self, attempt: &CheckoutAttempt) -> Result<Conversion, CheckoutError> {
        let order = attempt.order();
        tracing::info!(
            step = %CheckoutStep::ConvertCurrency,
            order_id = %order.id(),
            "saga step started"
        );

        let result = self
            .call_remote(self.conversion.convert(
                order.currency(),
                &self.config.payment_currency,
                order.total(),
            ))
            .await;

        match result {
            Ok(amount) => Ok(Conversion::Converted(amount)),
            Err(reason) if attempt.is_resumed() => self.reconcile_resumed(attempt, reason).await,
            Err(reason) => Err(self
                .compensate(attempt.order_id(), CheckoutStep::ConvertCurrency, reason)
                .await),
        }
    }

    /// Asks the payment service about a resumed order before cancelling it.
    ///
    /// An earlier checkout may have captured the charge and then failed, so a
    /// found charge settles the order instead.
    async fn reconcile_resumed(
        &self,
        attempt: &CheckoutAttempt,
        reason: RemoteError,
    ) -> Result<Conversion, CheckoutError> {
        let order_id = attempt.order_id();
        tracing::warn!(
            %order_id,
            owner = %attempt.owner(),
            error = %reason,
            "conversion failed for resumed order, reconciling"
        );

        let key = IdempotencyKey::for_order(order_id);
        match self.call_remote(self.payment.reconcile(&key)).await {
            Ok(Some(found)) => {
                metrics::counter!("checkout_reconciled_charges_total").increment(1);
                tracing::info!(
                    %order_id,
                    payment_reference = %found.payment_id,
                    "resumed order was already charged"
                );
                Ok(Conversion::AlreadyCaptured(found.payment_id))
            }
            Ok(None) => Err(self
                .compensate(order_id, CheckoutStep::ConvertCurrency, reason)
                .await),
            Err(reconcile_error) => {
                tracing::error!(
                    %order_id,
                    conversion_error = %reason,
                    %reconcile_error,
                    "charge of resumed order unknown, order left ready"
                );
                Err(CheckoutError::ReconciliationFailed {
                    order_id,
                    reason: reconcile_error,
                })
            }
        }
    }

    /// 5. Capture the payment, reconciling once if the capture fails.
    async fn capture(
        &self,
        attempt: &CheckoutAttempt,
        amount: Money,
        instrument: &PaymentInstrument,
    ) -> Result<String, CheckoutError> {
        let order_id = attempt.order_id();
        tracing::info!(
            step = %CheckoutStep::CapturePayment,
            %order_id,
            %amount,
            "saga step started"
        );

        let key = IdempotencyKey::for_order(order_id);
        let request = ChargeRequest {
            amount,
            currency: self.config.payment_currency.clone(),
            instrument: instrument.clone(),
            idempotency_key: key.clone(),
        };

        match self.call_remote(self.payment.charge(&request)).await {
            Ok(result) => Ok(result.payment_id),
            Err(charge_error) => {
                tracing::warn!(%order_id, error = %charge_error, "payment capture failed, reconciling");

                match self.call_remote(self.payment.reconcile(&key)).await {
                    Ok(Some(found)) => {
                        metrics::counter!("checkout_reconciled_charges_total").increment(1);
                        tracing::info!(
                            %order_id,
                            payment_reference = %found.payment_id,
                            "capture succeeded despite the error"
                        );
                        Ok(found.payment_id)
                    }
                    Ok(None) => Err(self
                        .compensate(order_id, CheckoutStep::CapturePayment, charge_error)
                        .await),
                    Err(reconcile_error) => {
                        tracing::error!(
                            %order_id,
                            %charge_error,
                            %reconcile_error,
                            "payment outcome unknown, order left ready"
                        );
                        Err(CheckoutError::AmbiguousPaymentOutcome {
                            order_id,
                            charge: charge_error,
                            reconcile: reconcile_error,
                        })
                    }
                }
            }
        }
    }

    /// 6. Settle the order.
    async fn settle(
        &self,
        attempt: &CheckoutAttempt,
        payment_reference: String,
    ) -> Result<Order, CheckoutError> {
        let order_id = attempt.order_id();

        match self.orders.settle(order_id, &payment_reference).await {
            Ok(order) => Ok(order),
            Err(reason) => {
                metrics::counter!("checkout_settlement_persist_failed_total").increment(1);
                tracing::error!(
                    %order_id,
                    %payment_reference,
                    error = %reason,
                    "payment captured but settlement not persisted, operator reconciliation required"
                );
                Err(CheckoutError::SettlementPersistFailed {
                    order_id,
                    payment_reference,
                    reason,
                })
            }
        }
    }

    /// Cancels the order after a failed remote step.
    #[tracing::instrument(skip(self, reason))]
    async fn compensate(
        &self,
        order_id: OrderId,
        step: CheckoutStep,
        reason: RemoteError,
    ) -> CheckoutError {
        metrics::counter!("checkout_compensations_total", "step" => step.as_str()).increment(1);

        match self.orders.cancel(order_id).await {
            Ok(_) => {
                tracing::warn!(%order_id, %step, error = %reason, "order cancelled");
                match step {
                    CheckoutStep::ConvertCurrency => {
                        CheckoutError::ConversionFailed { order_id, reason }
                    }
                    _ => CheckoutError::PaymentFailed { order_id, reason },
                }
            }
            Err(compensation) => {
                tracing::error!(
                    %order_id,
                    %step,
                    error = %reason,
                    %compensation,
                    "compensation failed, order left ready"
                );
                CheckoutError::CompensationFailed {
                    order_id,
                    step,
                    reason: reason.to_string(),
                    compensation,
                }
            }
        }
    }

    /// Deletes the owner's cart, falling back to background retries.
    ///
    /// The lease is held until the cart is gone or the retries run out, so
    /// the next checkout of the owner cannot see the settled cart.
    async fn release_cart(&self, lease: OwnerLease) {
        let owner = lease.owner().clone();

        match self.carts.delete(&owner).await {
            Ok(()) => release_lease(lease).await,
            Err(e) => {
                tracing::warn!(%owner, error = %e, "cart release failed, retrying in background");
                tokio::spawn(retry_cart_release(
                    Arc::clone(&self.carts),
                    lease,
                    self.config.cart_release_attempts,
                    self.config.cart_release_backoff,
                ));
            }
        }
    }

    /// Settles or cancels a ready order from the payment service's record.
    ///
    /// Intended for operators after `SettlementPersistFailed`,
    /// `AmbiguousPaymentOutcome` or an abandoned checkout. Runs under the
    /// owner's lock and leaves the cart untouched.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_order(
        &self,
        order_id: OrderId,
    ) -> Result<ReconcileOutcome, CheckoutError> {
        let order = self.load_order(order_id).await?;
        if order.is_terminal() {
            return Ok(ReconcileOutcome::AlreadyTerminal(order));
        }

        let lease = self.acquire_lease(order.owner_id()).await?;
        let outcome = self.reconcile_locked(order_id).await;
        release_lease(lease).await;

        if let Ok(outcome) = &outcome {
            tracing::info!(%order_id, status = %outcome.order().status(), "order reconciled");
        }
        outcome
    }

    async fn reconcile_locked(&self, order_id: OrderId) -> Result<ReconcileOutcome, CheckoutError> {
        // A checkout may have finished while we waited for the lock.
        let order = self.load_order(order_id).await?;
        if order.is_terminal() {
            return Ok(ReconcileOutcome::AlreadyTerminal(order));
        }

        let key = IdempotencyKey::for_order(order_id);
        let found = self
            .call_remote(self.payment.reconcile(&key))
            .await
            .map_err(|reason| CheckoutError::ReconciliationFailed { order_id, reason })?;

        match found {
            Some(payment) => {
                let settled = self
                    .orders
                    .settle(order_id, &payment.payment_id)
                    .await
                    .map_err(|reason| CheckoutError::SettlementPersistFailed {
                        order_id,
                        payment_reference: payment.payment_id.clone(),
                        reason,
                    })?;
                metrics::counter!("checkout_reconciled_charges_total").increment(1);
                Ok(ReconcileOutcome::Settled(settled))
            }
            None => {
                let cancelled = self.orders.cancel(order_id).await.map_err(|e| {
                    CheckoutError::store(CheckoutStep::Reconcile, Some(order_id), e)
                })?;
                Ok(ReconcileOutcome::Cancelled(cancelled))
            }
        }
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order, CheckoutError> {
        self.orders
            .get(order_id)
            .await
            .map_err(|e| CheckoutError::store(CheckoutStep::Reconcile, Some(order_id), e))?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }

    /// Runs a remote call under the configured timeout.
    async fn call_remote<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        let limit = self.config.remote_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(RemoteError::Timeout(limit)))
    }
}

async fn release_lease(lease: OwnerLease) {
    let owner = lease.owner().clone();
    if let Err(e) = lease.release().await {
        tracing::warn!(%owner, error = %e, "failed to release owner lock");
    }
}

async fn retry_cart_release(
    carts: Arc<dyn CartStore>,
    lease: OwnerLease,
    attempts: u32,
    mut backoff: Duration,
) {
    let owner = lease.owner().clone();

    for attempt in 1..=attempts {
        tokio::time::sleep(backoff).await;
        metrics::counter!("cart_release_retries_total").increment(1);

        match carts.delete(&owner).await {
            Ok(()) => {
                tracing::debug!(%owner, attempt, "cart released on retry");
                release_lease(lease).await;
                return;
            }
            Err(e) => {
                tracing::warn!(%owner, attempt, error = %e, "cart release retry failed");
                backoff *= 2;
            }
        }
    }

    tracing::error!(%owner, attempts, "giving up on cart release");
    release_lease(lease).await;
}
