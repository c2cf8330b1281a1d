//! Integration tests for crm-rules-runtime
//!
//! Cross-checks the single-contact evaluator against compiled predicates and
//! covers the workflow-facing operations end to end.

use chrono::NaiveDate;
use crm_rules_core::{
    compile_event_clause, ComparisonMode, FilterClause, FilterOperator, FilterOutcome,
    PredicateCompiler, RelationKind, Value,
};
use crm_rules_runtime::delay::{compute_delay, DelaySettings, WaitUnit};
use crm_rules_runtime::storage::{
    InMemoryStore, ReviewRecord, Subscriber, SubscriptionRecord, TrackedEvent,
};
use crm_rules_runtime::{ConditionEvaluator, PredicateExecutor, SqlDialect, SqlRenderer};
use rand::rngs::StdRng;
use rand::SeedableRng;

const TOKENS: [&str; 12] = [
    "any", "42-all", "42-0", "42-7", "43-all", "43-0", "9-2", "5", "-6", "junk", "0-all", "",
];

fn subscription(id: u64, customer_id: u64, product_id: u64, price_id: Option<u64>, status: &str) -> SubscriptionRecord {
    SubscriptionRecord {
        id,
        customer_id,
        product_id,
        price_id,
        status: status.to_string(),
    }
}

fn review(id: u64, product_id: u64, user_id: u64, email: &str, approved: &str) -> ReviewRecord {
    ReviewRecord {
        id,
        product_id,
        user_id,
        author_email: email.to_string(),
        approved: approved.to_string(),
        kind: "edd_review".to_string(),
    }
}

async fn scenario() -> (InMemoryStore, Vec<Subscriber>) {
    let store = InMemoryStore::new();
    let subjects = vec![
        Subscriber::new(1, "a@example.com").with_user_id(100),
        Subscriber::new(2, "b@example.com"),
        Subscriber::new(3, ""),
        Subscriber::new(4, "d@example.com"),
    ];
    for subject in &subjects {
        store.add_subscriber(subject.clone()).await;
    }

    store.link_account(1, "edd", 10).await;
    store.add_subscription(subscription(1, 10, 42, Some(7), "active")).await;
    store.add_subscription(subscription(2, 10, 43, None, "active")).await;
    store.add_subscription(subscription(3, 10, 9, Some(2), "cancelled")).await;

    store.link_account(3, "edd", 30).await;

    store.link_account(4, "edd", 40).await;
    store.add_subscription(subscription(4, 40, 42, Some(0), "active")).await;

    store.add_review(review(1, 5, 100, "", "1")).await;
    store.add_review(review(2, 6, 100, "", "0")).await;
    store.add_review(review(3, 42, 0, "b@example.com", "1")).await;
    store.add_review(review(4, 6, 0, "", "1")).await;

    (store, subjects)
}

fn selections() -> Vec<Vec<&'static str>> {
    let mut out = vec![Vec::new()];
    for (i, a) in TOKENS.iter().enumerate() {
        out.push(vec![*a]);
        for (j, b) in TOKENS.iter().enumerate().skip(i + 1) {
            out.push(vec![*a, *b]);
            for c in TOKENS.iter().skip(j + 1).step_by(3) {
                out.push(vec![*a, *b, *c]);
            }
        }
    }
    out
}

// ========== Evaluator / Compiler Consistency ==========

#[tokio::test]
async fn test_evaluator_agrees_with_compiled_predicate() {
    let (store, subjects) = scenario().await;
    let evaluator = ConditionEvaluator::new(&store);
    let executor = PredicateExecutor::new(&store);
    let compiler = PredicateCompiler::new();

    for relation in [RelationKind::ActiveSubscription, RelationKind::LeftReview] {
        for tokens in selections() {
            for operator in [FilterOperator::Include, FilterOperator::Exclude] {
                let outcome = compiler.compile_tokens(&tokens, operator, relation).unwrap();
                for subject in &subjects {
                    let direct = evaluator
                        .evaluate_tokens(&tokens, operator, relation, subject)
                        .await
                        .unwrap();
                    let compiled = match &outcome {
                        FilterOutcome::Skip(_) => true,
                        FilterOutcome::Apply(predicate) => {
                            executor.evaluate(predicate, subject).await.unwrap()
                        }
                    };
                    assert_eq!(
                        direct, compiled,
                        "relation={} tokens={:?} operator={:?} subject={}",
                        relation, tokens, operator, subject.id
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn test_exclude_is_complement_of_include() {
    let (store, subjects) = scenario().await;
    let evaluator = ConditionEvaluator::new(&store);

    for relation in [RelationKind::ActiveSubscription, RelationKind::LeftReview] {
        for tokens in selections() {
            let parsed = crm_rules_core::SelectionParser::new(relation).parse(&tokens);
            if parsed.is_empty() {
                continue;
            }
            for subject in &subjects {
                let include = evaluator
                    .evaluate(&parsed.selectors, FilterOperator::Include, relation, subject)
                    .await
                    .unwrap();
                let exclude = evaluator
                    .evaluate(&parsed.selectors, FilterOperator::Exclude, relation, subject)
                    .await
                    .unwrap();
                assert_ne!(include, exclude, "tokens={:?} subject={}", tokens, subject.id);
            }
        }
    }
}

#[tokio::test]
async fn test_active_variant_subscription_matches_entire_product() {
    let (store, subjects) = scenario().await;
    let evaluator = ConditionEvaluator::new(&store);
    assert!(evaluator
        .evaluate_tokens(
            &["42-all"],
            FilterOperator::Include,
            RelationKind::ActiveSubscription,
            &subjects[0]
        )
        .await
        .unwrap());
}

#[tokio::test]
async fn test_exclude_any_without_link_passes() {
    let (store, subjects) = scenario().await;
    let evaluator = ConditionEvaluator::new(&store);
    assert!(evaluator
        .evaluate_tokens(
            &["any"],
            FilterOperator::Exclude,
            RelationKind::ActiveSubscription,
            &subjects[1]
        )
        .await
        .unwrap());
}

#[tokio::test]
async fn test_zero_price_counts_as_simple() {
    let (store, subjects) = scenario().await;
    let evaluator = ConditionEvaluator::new(&store);
    assert!(evaluator
        .evaluate_tokens(
            &["42-0"],
            FilterOperator::Include,
            RelationKind::ActiveSubscription,
            &subjects[3]
        )
        .await
        .unwrap());
}

// ========== Event Property Comparisons ==========

fn tracked(id: u64, hour: u32, value: &str) -> TrackedEvent {
    let at = NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap();
    TrackedEvent {
        id,
        subscriber_id: 1,
        event_key: "purchase".to_string(),
        title: "Purchase".to_string(),
        value: value.to_string(),
        provider: "custom".to_string(),
        counter: 1,
        created_at: at,
        updated_at: at,
    }
}

fn clause(operator: &str, value: &str) -> FilterClause {
    FilterClause::new(
        RelationKind::EventJsonProperty.property_key(),
        operator,
        Value::text(value),
    )
    .with_extra_value("purchase:amount:int")
}

#[tokio::test]
async fn test_event_modes_differ_on_history() {
    let store = InMemoryStore::new();
    store.add_event(tracked(1, 8, r#"{"amount": 50}"#)).await;
    store.add_event(tracked(2, 9, r#"{"amount": 5}"#)).await;
    let executor = PredicateExecutor::new(&store);
    let subject = Subscriber::new(1, "a@example.com");

    let any = compile_event_clause(&clause(">", "10"), ComparisonMode::AnyEvent)
        .into_predicate()
        .unwrap();
    let latest = compile_event_clause(&clause(">", "10"), ComparisonMode::Latest)
        .into_predicate()
        .unwrap();
    assert!(executor.evaluate(&any, &subject).await.unwrap());
    assert!(!executor.evaluate(&latest, &subject).await.unwrap());

    // "no purchase had amount 5" is false once any purchase did
    let none_equal = compile_event_clause(&clause("!=", "5"), ComparisonMode::AnyEvent)
        .into_predicate()
        .unwrap();
    assert!(!executor.evaluate(&none_equal, &subject).await.unwrap());
}

#[tokio::test]
async fn test_event_missing_property_never_matches() {
    let store = InMemoryStore::new();
    store.add_event(tracked(1, 8, r#"{"other": 1}"#)).await;
    store.add_event(tracked(2, 9, "not json")).await;
    let executor = PredicateExecutor::new(&store);
    let subject = Subscriber::new(1, "a@example.com");

    for op in ["=", "<", ">", "contains"] {
        let predicate = compile_event_clause(&clause(op, "1"), ComparisonMode::AnyEvent)
            .into_predicate()
            .unwrap();
        assert!(!executor.evaluate(&predicate, &subject).await.unwrap(), "op {}", op);
    }
}

#[test]
fn test_event_clause_renders_for_both_dialects() {
    let predicate = compile_event_clause(&clause("contains", "gold"), ComparisonMode::Latest)
        .into_predicate()
        .unwrap();
    for dialect in [SqlDialect::MySql, SqlDialect::Sqlite] {
        let fragment = SqlRenderer::new(dialect, "wp_").render(&predicate).unwrap();
        assert_eq!(fragment.placeholder_count(), fragment.params.len());
    }
}

// ========== SQL Rendering ==========

#[test]
fn test_rendered_placeholders_match_params() {
    let compiler = PredicateCompiler::new();
    let renderer = SqlRenderer::default();
    for relation in [RelationKind::ActiveSubscription, RelationKind::LeftReview] {
        for tokens in selections() {
            for operator in [FilterOperator::Include, FilterOperator::Exclude] {
                if let FilterOutcome::Apply(predicate) =
                    compiler.compile_tokens(&tokens, operator, relation).unwrap()
                {
                    let fragment = renderer.render_subject_check(&predicate, 1).unwrap();
                    assert_eq!(
                        fragment.placeholder_count(),
                        fragment.params.len(),
                        "tokens={:?}",
                        tokens
                    );
                }
            }
        }
    }
}

// ========== Delay Randomizer ==========

#[test]
fn test_fixed_two_hours() {
    let mut rng = StdRng::seed_from_u64(0);
    let settings = DelaySettings {
        wait_time_amount: Some(1.0),
        wait_time_amount_min: Some(2.0),
        wait_time_amount_max: Some(2.0),
        wait_time_unit: Some(WaitUnit::Hours),
    };
    assert_eq!(compute_delay(&mut rng, &settings), 7200.0);
}

#[test]
fn test_delay_within_scaled_bounds() {
    let mut rng = StdRng::seed_from_u64(42);
    let units = [
        WaitUnit::Seconds,
        WaitUnit::Minutes,
        WaitUnit::Hours,
        WaitUnit::Days,
        WaitUnit::Weeks,
        WaitUnit::Months,
    ];
    let ranges = [(0.0, 1.0), (1.0, 5.0), (2.5, 3.75), (10.0, 3.0), (0.0, 0.5)];

    for unit in units {
        for (min, max) in ranges {
            let settings = DelaySettings {
                wait_time_amount: Some(1.0),
                wait_time_amount_min: Some(min),
                wait_time_amount_max: Some(max),
                wait_time_unit: Some(unit),
            };
            let (lo, hi) = if min > max { (max, min) } else { (min, max) };
            for _ in 0..100 {
                let delay = compute_delay(&mut rng, &settings);
                let amount = delay / unit.seconds();
                assert!(
                    amount >= lo - 1e-9 && amount <= hi + 1e-9,
                    "unit={:?} range=({}, {}) amount={}",
                    unit,
                    min,
                    max,
                    amount
                );
            }
        }
    }
}
