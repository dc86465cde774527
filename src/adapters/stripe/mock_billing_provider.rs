//! Mock billing provider for testing.
//!
//! Keeps customers, prices, subscriptions and payment methods in memory and
//! mutates them the way the real provider would: cancelling sets the status,
//! price swaps replace the item's price, new subscriptions start active.
//! Supports per-method error injection and records every call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::billing::{
    PaymentMethod, PriceSnapshot, SubscriptionItem, SubscriptionSnapshot, SubscriptionStatus,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{BillingError, BillingProvider, CreateCustomerRequest, Customer};

/// Mock billing provider.
///
/// # Example
///
/// ```ignore
/// let billing = MockBillingProvider::new();
/// billing.add_price(price("price_gold", 1000, "month"));
/// billing.add_customer("cus_1", Some("jamie@example.com"));
/// billing.add_subscription(snapshot);
///
/// billing.set_method_error("get_subscription", BillingError::network("timeout"));
/// ```
#[derive(Default, Clone)]
pub struct MockBillingProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    customers: HashMap<String, StoredCustomer>,
    prices: HashMap<String, PriceSnapshot>,
    subscriptions: HashMap<String, SubscriptionSnapshot>,
    payment_methods: HashMap<String, PaymentMethod>,
    method_errors: HashMap<String, BillingError>,
    next_error: Option<BillingError>,
    call_log: Vec<MethodCall>,
    next_id: u64,
}

#[derive(Clone)]
struct StoredCustomer {
    email: Option<String>,
    name: Option<String>,
}

impl MockState {
    fn customer(&self, id: &str) -> Result<Customer, BillingError> {
        let stored = self
            .customers
            .get(id)
            .ok_or_else(|| BillingError::not_found("Customer", id))?;
        let mut subscriptions: Vec<SubscriptionSnapshot> = self
            .subscriptions
            .values()
            .filter(|s| s.customer_id == id)
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Customer {
            id: id.to_string(),
            email: stored.email.clone(),
            name: stored.name.clone(),
            subscriptions,
        })
    }

    fn subscription_mut(&mut self, id: &str) -> Result<&mut SubscriptionSnapshot, BillingError> {
        self.subscriptions
            .get_mut(id)
            .ok_or_else(|| BillingError::not_found("Subscription", id))
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_mock_{}", prefix, self.next_id)
    }
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner
            .lock()
            .expect("MockBillingProvider: state lock poisoned")
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_price(&self, price: PriceSnapshot) {
        self.state().prices.insert(price.id.clone(), price);
    }

    pub fn add_customer(&self, id: &str, email: Option<&str>) {
        self.state().customers.insert(
            id.to_string(),
            StoredCustomer {
                email: email.map(str::to_string),
                name: None,
            },
        );
    }

    /// Adds or replaces a subscription. Its prices become known prices.
    pub fn add_subscription(&self, subscription: SubscriptionSnapshot) {
        let mut state = self.state();
        for item in &subscription.items {
            state
                .prices
                .entry(item.price.id.clone())
                .or_insert_with(|| item.price.clone());
        }
        state
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    pub fn add_payment_method(&self, payment_method: PaymentMethod) {
        self.state()
            .payment_methods
            .insert(payment_method.id.clone(), payment_method);
    }

    /// Provider-side status change, as if done from the provider dashboard.
    pub fn set_subscription_status(&self, id: &str, status: SubscriptionStatus) {
        if let Some(sub) = self.state().subscriptions.get_mut(id) {
            sub.status = status;
        }
    }

    pub fn subscription(&self, id: &str) -> Option<SubscriptionSnapshot> {
        self.state().subscriptions.get(id).cloned()
    }

    pub fn customer_email(&self, id: &str) -> Option<String> {
        self.state().customers.get(id).and_then(|c| c.email.clone())
    }

    /// Error returned on the next call to any method.
    pub fn set_error(&self, error: BillingError) {
        self.state().next_error = Some(error);
    }

    /// Error returned by every call to `method` until cleared.
    pub fn set_method_error(&self, method: &str, error: BillingError) {
        self.state()
            .method_errors
            .insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    /// Records the call, then returns any injected error for it.
    fn enter(&self, method: &str, args: &[&str]) -> Result<MutexGuard<'_, MockState>, BillingError> {
        let mut state = self.state();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(state)
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let state = self.enter("get_subscription", &[subscription_id])?;
        state
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("Subscription", subscription_id))
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Customer, BillingError> {
        let state = self.enter("get_customer", &[customer_id])?;
        state.customer(customer_id)
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, BillingError> {
        let mut state = self.enter(
            "create_customer",
            &[request.email.as_str(), request.member_id.as_str()],
        )?;
        let id = state.next_id("cus");
        state.customers.insert(
            id.clone(),
            StoredCustomer {
                email: Some(request.email),
                name: request.name,
            },
        );
        state.customer(&id)
    }

    async fn update_customer_email(
        &self,
        customer_id: &str,
        email: &str,
    ) -> Result<Customer, BillingError> {
        let mut state = self.enter("update_customer_email", &[customer_id, email])?;
        let customer = state
            .customers
            .get_mut(customer_id)
            .ok_or_else(|| BillingError::not_found("Customer", customer_id))?;
        customer.email = Some(email.to_string());
        state.customer(customer_id)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let mut state = self.enter("cancel_subscription", &[subscription_id])?;
        let sub = state.subscription_mut(subscription_id)?;
        sub.status = SubscriptionStatus::Canceled;
        sub.cancel_at_period_end = false;
        Ok(sub.clone())
    }

    async fn cancel_subscription_at_period_end(
        &self,
        subscription_id: &str,
        reason: Option<&str>,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let mut state = self.enter(
            "cancel_subscription_at_period_end",
            &[subscription_id, reason.unwrap_or_default()],
        )?;
        let sub = state.subscription_mut(subscription_id)?;
        sub.cancel_at_period_end = true;
        sub.cancellation_reason = reason.map(str::to_string);
        Ok(sub.clone())
    }

    async fn continue_subscription_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let mut state = self.enter("continue_subscription_at_period_end", &[subscription_id])?;
        let sub = state.subscription_mut(subscription_id)?;
        sub.cancel_at_period_end = false;
        sub.cancellation_reason = None;
        Ok(sub.clone())
    }

    async fn update_subscription_item_price(
        &self,
        subscription_id: &str,
        item_id: &str,
        price_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let mut state = self.enter(
            "update_subscription_item_price",
            &[subscription_id, item_id, price_id],
        )?;
        let price = state
            .prices
            .get(price_id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("Price", price_id))?;
        let sub = state.subscription_mut(subscription_id)?;
        let item = sub
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| BillingError::not_found("SubscriptionItem", item_id))?;
        item.price = price;
        Ok(sub.clone())
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let mut state = self.enter("create_subscription", &[customer_id, price_id])?;
        if !state.customers.contains_key(customer_id) {
            return Err(BillingError::not_found("Customer", customer_id));
        }
        let price = state
            .prices
            .get(price_id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("Price", price_id))?;

        let now = Timestamp::now();
        let subscription = SubscriptionSnapshot {
            id: state.next_id("sub"),
            customer_id: customer_id.to_string(),
            status: SubscriptionStatus::Active,
            cancel_at_period_end: false,
            cancellation_reason: None,
            start_date: now.as_unix_secs(),
            current_period_end: now.add_days(30).as_unix_secs(),
            trial_start: None,
            trial_end: None,
            items: vec![SubscriptionItem {
                id: state.next_id("si"),
                price,
            }],
            discount: None,
            default_payment_method: None,
        };
        state
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn get_card_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        let state = self.enter("get_card_payment_method", &[payment_method_id])?;
        state
            .payment_methods
            .get(payment_method_id)
            .cloned()
            .ok_or_else(|| BillingError::not_found("PaymentMethod", payment_method_id))
    }
}
