//! Storage-side facts about each object kind: mirror table names and the
//! parent relationships that drive stub rows and related-entity backfill.

use ssync_stripe::ObjectKind;

/// Mirror table for a kind.
pub fn table_name(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Product => "products",
        ObjectKind::Price => "prices",
        ObjectKind::Plan => "plans",
        ObjectKind::Customer => "customers",
        ObjectKind::PaymentMethod => "payment_methods",
        ObjectKind::Subscription => "subscriptions",
        ObjectKind::SubscriptionSchedule => "subscription_schedules",
        ObjectKind::CheckoutSession => "checkout_sessions",
        ObjectKind::Invoice => "invoices",
        ObjectKind::CreditNote => "credit_notes",
        ObjectKind::Charge => "charges",
        ObjectKind::PaymentIntent => "payment_intents",
        ObjectKind::SetupIntent => "setup_intents",
        ObjectKind::Refund => "refunds",
        ObjectKind::Dispute => "disputes",
        ObjectKind::EarlyFraudWarning => "early_fraud_warnings",
        ObjectKind::TaxId => "tax_ids",
    }
}

/// Kinds this kind references through a foreign key. Used two ways: webhook
/// arrival out of natural order triggers stub rows for these, and
/// `backfill_related_entities` pulls never-synced parents in first.
pub fn parent_kinds(kind: ObjectKind) -> &'static [ObjectKind] {
    match kind {
        ObjectKind::Product => &[],
        ObjectKind::Price | ObjectKind::Plan => &[ObjectKind::Product],
        ObjectKind::Customer => &[],
        ObjectKind::PaymentMethod
        | ObjectKind::SubscriptionSchedule
        | ObjectKind::CheckoutSession
        | ObjectKind::PaymentIntent
        | ObjectKind::SetupIntent
        | ObjectKind::TaxId
        | ObjectKind::Charge => &[ObjectKind::Customer],
        ObjectKind::Subscription => &[ObjectKind::Customer],
        ObjectKind::Invoice => &[ObjectKind::Customer, ObjectKind::Subscription],
        ObjectKind::CreditNote => &[ObjectKind::Customer, ObjectKind::Invoice],
        ObjectKind::Refund | ObjectKind::Dispute | ObjectKind::EarlyFraudWarning => {
            &[ObjectKind::Charge]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssync_stripe::ALL_KINDS;

    #[test]
    fn every_kind_has_a_table() {
        let mut tables: Vec<_> = ALL_KINDS.iter().map(|k| table_name(*k)).collect();
        tables.sort_unstable();
        let before = tables.len();
        tables.dedup();
        assert_eq!(tables.len(), before, "table names must be distinct");
    }

    #[test]
    fn parents_precede_children_in_backfill_order() {
        let pos = |k: ObjectKind| ALL_KINDS.iter().position(|x| *x == k).unwrap();
        for kind in ALL_KINDS {
            for parent in parent_kinds(*kind) {
                assert!(
                    pos(*parent) < pos(*kind),
                    "{parent} must come before {kind}"
                );
            }
        }
    }
}
