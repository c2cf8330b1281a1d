//! Unit tests for the selection-to-predicate compiler

use crm_rules_core::predicate::*;
use crm_rules_core::selector::*;

fn compiler() -> PredicateCompiler {
    PredicateCompiler::new()
}

// =============================================================================
// Any Subsumption
// =============================================================================

#[test]
fn test_any_subsumes_for_every_relation_and_operator() {
    let extras = [
        vec![],
        vec![Selector::EntireEntity(1)],
        vec![Selector::SimpleEntity(2), Selector::EntityVariant(3, 4)],
        vec![Selector::EntityVariant(3, 4), Selector::EntireEntity(9), Selector::SimpleEntity(9)],
    ];

    for relation in [RelationKind::ActiveSubscription, RelationKind::LeftReview] {
        for operator in [FilterOperator::Include, FilterOperator::Exclude] {
            let alone = compiler()
                .compile(&[Selector::Any], operator, relation)
                .unwrap();

            for extra in &extras {
                for position in 0..=extra.len() {
                    let mut selectors = extra.clone();
                    selectors.insert(position, Selector::Any);
                    let mixed = compiler().compile(&selectors, operator, relation).unwrap();
                    assert_eq!(alone, mixed, "{:?} {:?} {:?}", relation, operator, selectors);
                }
            }
        }
    }
}

// =============================================================================
// Shape Tests
// =============================================================================

#[test]
fn test_duplicates_collapse() {
    let once = compiler()
        .compile(
            &[Selector::EntireEntity(5)],
            FilterOperator::Include,
            RelationKind::ActiveSubscription,
        )
        .unwrap();
    let twice = compiler()
        .compile(
            &[Selector::EntireEntity(5), Selector::EntireEntity(5)],
            FilterOperator::Include,
            RelationKind::ActiveSubscription,
        )
        .unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_status_condition_is_always_conjoined() {
    let outcome = compiler()
        .compile_tokens(
            &["42-7", "8-0"],
            FilterOperator::Include,
            RelationKind::ActiveSubscription,
        )
        .unwrap();

    let Some(Predicate::Exists(check)) = outcome.predicate() else {
        panic!("Expected existence check");
    };
    assert_eq!(check.relation, RelationKind::ActiveSubscription);
    let RecordCondition::All(parts) = &check.condition else {
        panic!("Expected conjunction");
    };
    assert_eq!(
        parts.last(),
        Some(&RecordCondition::eq(RecordField::Status, "active"))
    );
}

#[test]
fn test_review_condition_requires_approval_and_type() {
    let outcome = compiler()
        .compile_tokens(&["12"], FilterOperator::Include, RelationKind::LeftReview)
        .unwrap();

    let Some(Predicate::Exists(check)) = outcome.predicate() else {
        panic!("Expected existence check");
    };
    assert_eq!(
        check.condition,
        RecordCondition::All(vec![
            RecordCondition::eq(RecordField::ProductId, 12u64),
            RecordCondition::All(vec![
                RecordCondition::eq(RecordField::Status, "1"),
                RecordCondition::eq(RecordField::Kind, "edd_review"),
            ]),
        ])
    );
}

// =============================================================================
// Polarity Tests
// =============================================================================

#[test]
fn test_exclude_wraps_include() {
    let tokens = ["42-all", "3-1"];
    let include = compiler()
        .compile_tokens(&tokens, FilterOperator::Include, RelationKind::ActiveSubscription)
        .unwrap()
        .into_predicate()
        .unwrap();
    let exclude = compiler()
        .compile_tokens(&tokens, FilterOperator::Exclude, RelationKind::ActiveSubscription)
        .unwrap()
        .into_predicate()
        .unwrap();

    assert_eq!(
        exclude,
        Predicate::Any(vec![
            include.negate(),
            Predicate::no_linked_account("edd"),
        ])
    );
}

#[test]
fn test_outcome_serializes_for_diagnostics() {
    let outcome = FilterOutcome::Skip(SkipReason::NoUsableSelectors);
    let json = serde_json::to_string(&outcome).unwrap();
    assert_eq!(json, r#"{"Skip":"no_usable_selectors"}"#);
}
