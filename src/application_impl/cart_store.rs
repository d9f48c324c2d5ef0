use crate::application_impl::run_batch;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::{AuthContext, CartBackend};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the UI renders: the server snapshot with every pending mutation applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub snapshot: CartSnapshot,
    pub selection: BTreeSet<CartLineId>,
    pub loading: BTreeMap<CartLineId, CartAction>,
    pub error: Option<String>,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub selected_count: usize,
    pub subtotal: Decimal,
    pub shipping: ShippingQuote,
    pub total: Decimal,
}

struct PendingMutation {
    ticket: u64,
    mutation: CartMutation,
    /// Highest refetch sequence issued when the backend answered.
    settled_at: Option<u64>,
    failed: bool,
}

#[derive(Default)]
struct CartState {
    server: CartSnapshot,
    pending: Vec<PendingMutation>,
    selection: BTreeSet<CartLineId>,
    selection_seeded: bool,
    loading: BTreeMap<CartLineId, CartAction>,
    error: Option<String>,
    next_ticket: u64,
    issued_refetch: u64,
    installed_refetch: u64,
}

impl CartState {
    fn optimistic(&self) -> CartSnapshot {
        self.server
            .apply_all(self.pending.iter().map(|p| &p.mutation))
    }

    fn push(&mut self, mutation: CartMutation) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        for id in mutation.ids() {
            if mutation.removes(id) {
                self.selection.remove(&id);
            }
        }
        self.pending.push(PendingMutation {
            ticket,
            mutation,
            settled_at: None,
            failed: false,
        });
        ticket
    }

    fn settle(&mut self, ticket: u64, failed: bool) {
        let issued = self.issued_refetch;
        if let Some(pending) = self.pending.iter_mut().find(|p| p.ticket == ticket) {
            pending.settled_at = Some(issued);
            pending.failed = failed;
        }
    }

    fn seed_selection(&mut self) {
        if !self.selection_seeded {
            self.selection = self.server.ids();
            self.selection_seeded = true;
        }
    }

    /// Lands a refetch result. Returns false when a newer refetch already landed.
    fn install(&mut self, seq: u64, result: &Result<CartSnapshot, UpstreamError>) -> bool {
        if seq <= self.installed_refetch {
            return false;
        }
        self.installed_refetch = seq;

        match result {
            Ok(snapshot) => {
                self.server = snapshot.clone();
                self.seed_selection();
                let present = self.server.ids();
                self.selection.retain(|id| present.contains(id));
                // a settled mutation is folded once a refetch issued after it lands
                self.pending
                    .retain(|p| p.settled_at.is_none_or(|settled| settled >= seq));
            }
            Err(error) => {
                if error.is_auth() {
                    self.server.requires_login = true;
                }
                self.server.error = Some(error.message.clone());
                self.pending
                    .retain(|p| !(p.failed && p.settled_at.is_some_and(|settled| settled < seq)));
            }
        }
        true
    }
}

/// Headless cart: applies mutations optimistically, sends them upstream and
/// reconciles through refetch.
pub struct CartStore {
    backend: Arc<dyn CartBackend>,
    tokens: Arc<dyn TokenSource>,
    locale: Locale,
    state: Mutex<CartState>,
    closed: CancellationToken,
}

impl CartStore {
    pub fn new(
        backend: Arc<dyn CartBackend>,
        tokens: Arc<dyn TokenSource>,
        locale: Locale,
        initial: CartSnapshot,
    ) -> Self {
        let mut state = CartState {
            server: initial,
            ..CartState::default()
        };
        if !state.server.is_empty() {
            state.seed_selection();
        }
        Self {
            backend,
            tokens,
            locale,
            state: Mutex::new(state),
            closed: CancellationToken::new(),
        }
    }

    /// Creates the store and waits for the first fetch.
    pub async fn load(
        backend: Arc<dyn CartBackend>,
        tokens: Arc<dyn TokenSource>,
        locale: Locale,
    ) -> Self {
        let store = Self::new(backend, tokens, locale, CartSnapshot::default());
        if let Err(error) = store.refetch().await {
            warn!(code = ?error.code, "initial cart fetch failed");
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn view(&self) -> CartView {
        let state = self.lock();
        CartView {
            snapshot: state.optimistic(),
            selection: state.selection.clone(),
            loading: state.loading.clone(),
            error: state.error.clone(),
            pending: state.pending.len(),
        }
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Stops the store; requests still in flight finish without touching state.
    pub fn close(&self) {
        self.closed.cancel();
        debug!("cart store closed");
    }

    pub async fn increment(&self, id: CartLineId) -> MutationOutcome {
        self.dispatch(CartAction::Increment, id).await
    }

    pub async fn decrement(&self, id: CartLineId) -> MutationOutcome {
        self.dispatch(CartAction::Decrement, id).await
    }

    pub async fn delete(&self, id: CartLineId) -> MutationOutcome {
        self.dispatch(CartAction::Delete, id).await
    }

    async fn dispatch(&self, action: CartAction, id: CartLineId) -> MutationOutcome {
        if self.is_closed() {
            return MutationOutcome::Cancelled;
        }

        let ticket = {
            let mut state = self.lock();
            let view = state.optimistic();
            let Some(line) = view.line(id) else {
                let error = UpstreamError::from(ValidationError::UnknownLine(id));
                state.error = Some(error.message.clone());
                return MutationOutcome::Failed(error);
            };
            if state.loading.contains_key(&id) {
                return MutationOutcome::Busy;
            }
            let mutation = match action {
                CartAction::Increment => CartMutation::Increment(id),
                CartAction::Decrement if line.qty <= 1 => return MutationOutcome::Skipped,
                CartAction::Decrement => CartMutation::Decrement(id),
                CartAction::Delete => CartMutation::Delete(id),
            };
            state.error = None;
            state.loading.insert(id, action);
            state.push(mutation)
        };

        let result = tokio::select! {
            _ = self.closed.cancelled() => return MutationOutcome::Cancelled,
            result = self.send(action, id) => result,
        };

        {
            let mut state = self.lock();
            state.settle(ticket, result.is_err());
            state.loading.remove(&id);
            if let Err(error) = &result {
                state.error = Some(error.message.clone());
                if error.is_auth() {
                    state.server.requires_login = true;
                }
            }
        }

        let _ = self.refetch().await;

        match result {
            Ok(()) => MutationOutcome::Applied,
            Err(error) => MutationOutcome::Failed(error),
        }
    }

    async fn send(&self, action: CartAction, id: CartLineId) -> Result<(), UpstreamError> {
        let auth = self.auth().await?;
        let result = match action {
            CartAction::Increment => self.backend.increment(&auth, id).await,
            CartAction::Decrement => self.backend.decrement(&auth, id).await,
            CartAction::Delete => self.backend.delete(&auth, id).await,
        };
        self.observe(result)
    }

    /// Deletes every id concurrently. Ids that are unknown or busy are skipped.
    pub async fn batch_delete(&self, ids: &[CartLineId]) -> BatchReport {
        if self.is_closed() {
            return BatchReport::from_results(Vec::new());
        }

        let (ticket, ids) = {
            let mut state = self.lock();
            let view = state.optimistic();
            let ids: Vec<CartLineId> = ids
                .iter()
                .copied()
                .filter(|id| view.line(*id).is_some() && !state.loading.contains_key(id))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if ids.is_empty() {
                return BatchReport::from_results(Vec::new());
            }
            state.error = None;
            for id in &ids {
                state.loading.insert(*id, CartAction::Delete);
            }
            (state.push(CartMutation::BatchDelete(ids.clone())), ids)
        };

        let operations: Vec<BatchOperation> = ids
            .iter()
            .map(|id| BatchOperation {
                id: *id,
                action: CartAction::Delete,
            })
            .collect();

        let report = tokio::select! {
            _ = self.closed.cancelled() => return BatchReport::from_results(Vec::new()),
            report = self.send_batch(&operations) => report,
        };

        {
            let mut state = self.lock();
            state.settle(ticket, report.failed_count > 0);
            for id in &ids {
                state.loading.remove(id);
            }
            if report.failed_count > 0 {
                state.error = Some(format!("{} items failed to delete", report.failed_count));
            }
        }
        info!(
            success = report.success_count,
            failed = report.failed_count,
            "cart batch delete finished"
        );

        let _ = self.refetch().await;
        report
    }

    async fn send_batch(&self, operations: &[BatchOperation]) -> BatchReport {
        match self.auth().await {
            Ok(auth) => {
                let report = run_batch(self.backend.as_ref(), &auth, operations).await;
                if report.auth_expired() {
                    self.tokens.invalidate(SessionFailure::Revoked);
                }
                report
            }
            Err(error) => BatchReport::from_results(
                operations
                    .iter()
                    .map(|op| BatchItemResult {
                        id: op.id,
                        success: false,
                        error: Some(error.message.clone()),
                        code: Some(error.code),
                    })
                    .collect(),
            ),
        }
    }

    /// Re-reads the cart from the backend. Results older than the last
    /// installed refetch are dropped.
    pub async fn refetch(&self) -> Result<(), UpstreamError> {
        if self.is_closed() {
            return Ok(());
        }
        let seq = {
            let mut state = self.lock();
            state.issued_refetch += 1;
            state.issued_refetch
        };

        let result = tokio::select! {
            _ = self.closed.cancelled() => return Ok(()),
            result = self.fetch() => result,
        };

        let installed = self.lock().install(seq, &result);
        if !installed {
            debug!(seq, "stale cart refetch dropped");
        }
        result.map(|_| ())
    }

    async fn fetch(&self) -> Result<CartSnapshot, UpstreamError> {
        let auth = self.auth().await?;
        let result = self.backend.fetch_cart(&auth).await;
        self.observe(result)
    }

    async fn auth(&self) -> Result<AuthContext, UpstreamError> {
        match self.tokens.usable_token().await {
            Ok(token) => Ok(AuthContext {
                token,
                locale: self.locale,
            }),
            Err(error) => {
                let error = error.to_upstream(self.locale);
                self.lock().server.requires_login = true;
                Err(error)
            }
        }
    }

    fn observe<T>(&self, result: Result<T, UpstreamError>) -> Result<T, UpstreamError> {
        if let Err(error) = &result {
            if error.code == ErrorCode::AuthExpired {
                self.tokens.invalidate(SessionFailure::Revoked);
            }
        }
        result
    }

    pub fn toggle(&self, id: CartLineId) {
        let mut state = self.lock();
        if !state.selection.remove(&id) && state.optimistic().line(id).is_some() {
            state.selection.insert(id);
        }
    }

    pub fn toggle_all(&self) {
        let mut state = self.lock();
        let ids = state.optimistic().ids();
        if state.selection.len() == ids.len() {
            state.selection.clear();
        } else {
            state.selection = ids;
        }
    }

    pub fn selected(&self) -> BTreeSet<CartLineId> {
        self.lock().selection.clone()
    }

    pub fn checkout_ids(&self) -> Result<Vec<CartLineId>, UpstreamError> {
        let state = self.lock();
        if state.selection.is_empty() {
            return Err(ValidationError::NothingSelected.into());
        }
        Ok(state.selection.iter().copied().collect())
    }

    pub fn summary(&self, offer: &ShippingOffer, base_delivery_fee: Decimal) -> CartSummary {
        let state = self.lock();
        let snapshot = state.optimistic();
        let subtotal = snapshot.subtotal(&state.selection);
        let shipping = offer.quote(subtotal, base_delivery_fee);
        CartSummary {
            selected_count: state.selection.len(),
            subtotal,
            total: subtotal + shipping.delivery_fee,
            shipping,
        }
    }
}
