//! The supported object kinds.
//!
//! This enum is the single source of truth: API list paths, event-type
//! routing, and the engine's backfill order all derive from it. Adding a kind
//! means adding a variant here and a projector + mirror table on the engine
//! side; nothing else enumerates kinds.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Product,
    Price,
    Plan,
    Customer,
    PaymentMethod,
    Subscription,
    SubscriptionSchedule,
    CheckoutSession,
    Invoice,
    CreditNote,
    Charge,
    PaymentIntent,
    SetupIntent,
    Refund,
    Dispute,
    EarlyFraudWarning,
    TaxId,
}

/// Every kind, in backfill dependency order: parents before children so
/// foreign keys mostly hold without stub rows.
pub const ALL_KINDS: &[ObjectKind] = &[
    ObjectKind::Product,
    ObjectKind::Price,
    ObjectKind::Plan,
    ObjectKind::Customer,
    ObjectKind::PaymentMethod,
    ObjectKind::Subscription,
    ObjectKind::SubscriptionSchedule,
    ObjectKind::CheckoutSession,
    ObjectKind::Invoice,
    ObjectKind::CreditNote,
    ObjectKind::Charge,
    ObjectKind::PaymentIntent,
    ObjectKind::SetupIntent,
    ObjectKind::Refund,
    ObjectKind::Dispute,
    ObjectKind::EarlyFraudWarning,
    ObjectKind::TaxId,
];

impl ObjectKind {
    /// Stable singular name; used as the `_sync_status.resource` key and in
    /// the public API.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Product => "product",
            ObjectKind::Price => "price",
            ObjectKind::Plan => "plan",
            ObjectKind::Customer => "customer",
            ObjectKind::PaymentMethod => "payment_method",
            ObjectKind::Subscription => "subscription",
            ObjectKind::SubscriptionSchedule => "subscription_schedule",
            ObjectKind::CheckoutSession => "checkout_session",
            ObjectKind::Invoice => "invoice",
            ObjectKind::CreditNote => "credit_note",
            ObjectKind::Charge => "charge",
            ObjectKind::PaymentIntent => "payment_intent",
            ObjectKind::SetupIntent => "setup_intent",
            ObjectKind::Refund => "refund",
            ObjectKind::Dispute => "dispute",
            ObjectKind::EarlyFraudWarning => "early_fraud_warning",
            ObjectKind::TaxId => "tax_id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ALL_KINDS.iter().copied().find(|k| k.as_str() == s)
    }

    /// Path segment under `/v1/` for the list endpoint.
    pub fn list_path(self) -> &'static str {
        match self {
            ObjectKind::Product => "products",
            ObjectKind::Price => "prices",
            ObjectKind::Plan => "plans",
            ObjectKind::Customer => "customers",
            ObjectKind::PaymentMethod => "payment_methods",
            ObjectKind::Subscription => "subscriptions",
            ObjectKind::SubscriptionSchedule => "subscription_schedules",
            ObjectKind::CheckoutSession => "checkout/sessions",
            ObjectKind::Invoice => "invoices",
            ObjectKind::CreditNote => "credit_notes",
            ObjectKind::Charge => "charges",
            ObjectKind::PaymentIntent => "payment_intents",
            ObjectKind::SetupIntent => "setup_intents",
            ObjectKind::Refund => "refunds",
            ObjectKind::Dispute => "disputes",
            ObjectKind::EarlyFraudWarning => "radar/early_fraud_warnings",
            ObjectKind::TaxId => "tax_ids",
        }
    }

    /// Extra fixed query params some list endpoints need to return the full
    /// population rather than a default subset.
    pub fn extra_list_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            // Default listing excludes canceled subscriptions.
            ObjectKind::Subscription => &[("status", "all")],
            _ => &[],
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a webhook event type (`"customer.subscription.updated"`) to the kind
/// it mutates. `None` means the event does not touch a mirrored kind and the
/// pipeline acknowledges it without projecting.
///
/// Longest prefixes first: `charge.dispute.*` must not fall through to
/// `charge.*`.
pub fn kind_for_event_type(event_type: &str) -> Option<ObjectKind> {
    let table: &[(&str, Option<ObjectKind>)] = &[
        ("customer.subscription.", Some(ObjectKind::Subscription)),
        ("customer.tax_id.", Some(ObjectKind::TaxId)),
        ("customer.discount.", None),
        ("customer.source.", None),
        ("customer.", Some(ObjectKind::Customer)),
        ("checkout.session.", Some(ObjectKind::CheckoutSession)),
        ("radar.early_fraud_warning.", Some(ObjectKind::EarlyFraudWarning)),
        ("charge.dispute.", Some(ObjectKind::Dispute)),
        ("charge.refund.", Some(ObjectKind::Refund)),
        ("charge.", Some(ObjectKind::Charge)),
        ("invoiceitem.", None),
        ("invoice.", Some(ObjectKind::Invoice)),
        ("product.", Some(ObjectKind::Product)),
        ("price.", Some(ObjectKind::Price)),
        ("plan.", Some(ObjectKind::Plan)),
        ("payment_intent.", Some(ObjectKind::PaymentIntent)),
        ("payment_method.", Some(ObjectKind::PaymentMethod)),
        ("setup_intent.", Some(ObjectKind::SetupIntent)),
        ("credit_note.", Some(ObjectKind::CreditNote)),
        ("subscription_schedule.", Some(ObjectKind::SubscriptionSchedule)),
        ("refund.", Some(ObjectKind::Refund)),
    ];

    for (prefix, kind) in table {
        if event_type.starts_with(prefix) {
            return *kind;
        }
    }
    None
}

/// Whether an event type marks the object as deleted on the provider side.
pub fn is_tombstone_event(event_type: &str) -> bool {
    event_type.ends_with(".deleted")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_kind() {
        for k in ALL_KINDS {
            assert_eq!(ObjectKind::parse(k.as_str()), Some(*k));
        }
        assert_eq!(ObjectKind::parse("coupon"), None);
    }

    #[test]
    fn all_kinds_has_no_duplicates() {
        let mut seen = ALL_KINDS.to_vec();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), ALL_KINDS.len());
    }

    #[test]
    fn dependency_order_puts_parents_first() {
        let pos = |k: ObjectKind| ALL_KINDS.iter().position(|x| *x == k).unwrap();
        assert!(pos(ObjectKind::Product) < pos(ObjectKind::Price));
        assert!(pos(ObjectKind::Customer) < pos(ObjectKind::Subscription));
        assert!(pos(ObjectKind::Subscription) < pos(ObjectKind::Invoice));
        assert!(pos(ObjectKind::Invoice) < pos(ObjectKind::CreditNote));
        assert!(pos(ObjectKind::Charge) < pos(ObjectKind::Refund));
        assert!(pos(ObjectKind::Charge) < pos(ObjectKind::Dispute));
        assert!(pos(ObjectKind::Charge) < pos(ObjectKind::EarlyFraudWarning));
    }

    #[test]
    fn event_routing_handles_nested_prefixes() {
        assert_eq!(
            kind_for_event_type("customer.subscription.updated"),
            Some(ObjectKind::Subscription)
        );
        assert_eq!(
            kind_for_event_type("charge.dispute.created"),
            Some(ObjectKind::Dispute)
        );
        assert_eq!(kind_for_event_type("charge.succeeded"), Some(ObjectKind::Charge));
        assert_eq!(
            kind_for_event_type("checkout.session.completed"),
            Some(ObjectKind::CheckoutSession)
        );
        assert_eq!(
            kind_for_event_type("radar.early_fraud_warning.created"),
            Some(ObjectKind::EarlyFraudWarning)
        );
        assert_eq!(kind_for_event_type("customer.created"), Some(ObjectKind::Customer));
        assert_eq!(kind_for_event_type("customer.discount.created"), None);
        assert_eq!(kind_for_event_type("invoiceitem.created"), None);
        assert_eq!(kind_for_event_type("account.updated"), None);
    }

    #[test]
    fn tombstone_detection() {
        assert!(is_tombstone_event("customer.deleted"));
        assert!(is_tombstone_event("product.deleted"));
        assert!(!is_tombstone_event("customer.created"));
        assert!(!is_tombstone_event("payment_method.detached"));
    }
}
