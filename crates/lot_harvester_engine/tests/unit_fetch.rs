mod common;

use std::time::Duration;

use common::{details_page, fetcher, form_site, query_site, FakeSite, RecordingSleeper, Step};
use lot_harvester_core::{AttemptOutcome, FieldSchema, Identifier, RecordStatus};
use lot_harvester_engine::{ClientErrorKind, RetryPolicy};
use pretty_assertions::assert_eq;

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(100), 1.0)
}

#[tokio::test]
async fn two_transient_faults_then_success() {
    harvest_logging::initialize_for_tests();
    let site = FakeSite::new();
    site.steps(
        7,
        vec![
            Step::Fail(ClientErrorKind::Timeout),
            Step::Fail(ClientErrorKind::StaleReference),
        ],
    )
    .page(7, details_page(7));
    let mut client = site.client();
    let sleeper = RecordingSleeper::new();

    let outcome = fetcher(query_site())
        .fetch(&mut client, &sleeper, Identifier::new(7), &policy(3))
        .await;

    let AttemptOutcome::Success(record) = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    let schema = FieldSchema::permit_details();
    assert_eq!(record.value(&schema, "Name"), Some("worker-7"));
    assert_eq!(record.value(&schema, "Country"), Some("Qatar"));
    assert_eq!(record.value(&schema, "Salary"), Some(""));
    assert_eq!(site.count("navigate"), 3);
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_millis(100), Duration::from_millis(100)]
    );
}

#[tokio::test]
async fn identifier_is_sent_zero_padded() {
    let site = FakeSite::new();
    site.details_for([48363817]);
    let mut client = site.client();

    fetcher(query_site())
        .fetch(
            &mut client,
            &RecordingSleeper::new(),
            Identifier::new(48363817),
            &policy(1),
        )
        .await;

    assert_eq!(
        site.calls()[0],
        "navigate https://fake.test/search?lot=048363817"
    );
}

#[tokio::test]
async fn missing_details_are_not_found_without_retry() {
    let site = FakeSite::new();
    let mut client = site.client();
    let sleeper = RecordingSleeper::new();

    let outcome = fetcher(query_site())
        .fetch(&mut client, &sleeper, Identifier::new(3), &policy(5))
        .await;

    assert_eq!(outcome, AttemptOutcome::NotFound(Identifier::new(3)));
    assert_eq!(site.count("navigate"), 1);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn unknown_labels_only_is_not_found() {
    let site = FakeSite::new();
    site.page(
        4,
        r#"<div id="PassportMainshowTable"><table><tr><td>Banner</td><td>Welcome</td></tr></table></div>"#,
    );
    let mut client = site.client();

    let outcome = fetcher(query_site())
        .fetch(&mut client, &RecordingSleeper::new(), Identifier::new(4), &policy(3))
        .await;

    assert_eq!(outcome.status(), RecordStatus::NotFound);
}

#[tokio::test]
async fn exhausted_retries_are_transient_with_backoff() {
    let site = FakeSite::new();
    site.always_fail(11, ClientErrorKind::Unavailable);
    let mut client = site.client();
    let sleeper = RecordingSleeper::new();
    let policy = RetryPolicy::new(3, Duration::from_millis(100), 2.0);

    let outcome = fetcher(query_site())
        .fetch(&mut client, &sleeper, Identifier::new(11), &policy)
        .await;

    assert!(matches!(outcome, AttemptOutcome::Transient(id, _) if id == Identifier::new(11)));
    assert_eq!(site.count("navigate"), 3);
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test]
async fn unclassified_fault_is_fatal_immediately() {
    let site = FakeSite::new();
    site.always_fail(12, ClientErrorKind::HttpStatus(500));
    let mut client = site.client();
    let sleeper = RecordingSleeper::new();

    let outcome = fetcher(query_site())
        .fetch(&mut client, &sleeper, Identifier::new(12), &policy(3))
        .await;

    match outcome {
        AttemptOutcome::Fatal(id, cause) => {
            assert_eq!(id, Identifier::new(12));
            assert!(cause.contains("500"), "{cause}");
        }
        other => panic!("expected fatal, got {other:?}"),
    }
    assert_eq!(site.count("navigate"), 1);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn form_mode_types_identifier_and_presses_search() {
    let site = FakeSite::new();
    site.details_for([48363818]);
    let mut client = site.client();

    let outcome = fetcher(form_site())
        .fetch(
            &mut client,
            &RecordingSleeper::new(),
            Identifier::new(48363818),
            &policy(1),
        )
        .await;

    assert_eq!(outcome.status(), RecordStatus::Success);
    assert_eq!(
        site.calls(),
        vec![
            "navigate https://fake.test/search".to_string(),
            "wait_ready".to_string(),
            "submit lytA_ctl23_Stickertext=048363818 via lytA_ctl23_passportSearch".to_string(),
            "wait_ready".to_string(),
        ]
    );
}

#[tokio::test]
async fn form_mode_retries_a_failed_submission() {
    let site = FakeSite::new();
    site.steps(20, vec![Step::Fail(ClientErrorKind::Timeout)])
        .details_for([20]);
    let mut client = site.client();

    let outcome = fetcher(form_site())
        .fetch(&mut client, &RecordingSleeper::new(), Identifier::new(20), &policy(2))
        .await;

    assert_eq!(outcome.status(), RecordStatus::Success);
    assert_eq!(site.count("submit"), 2);
    assert_eq!(site.count("navigate"), 2);
}
