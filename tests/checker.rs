// ABOUTME: Integration tests for batch image checks and selection strategies.
// ABOUTME: Drives the checker with scripted probers to cover concurrency edge cases.

mod support;

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use support::{FakeDirectory, FakeProber, Script, containers_for, init_tracing};
use tidewatch::checker::{
    BatchChecker, CheckErrorKind, CheckOptions, Checker, CollectingSink, ImageCheckResult,
    Selection, Summary, unique_images,
};
use tidewatch::runtime::ContainerInfo;
use tokio_util::sync::CancellationToken;

fn checker(prober: &Arc<FakeProber>) -> BatchChecker {
    BatchChecker::new(prober.clone())
}

fn assert_partitioned(summary: &Summary) {
    assert_eq!(
        summary.updated + summary.up_to_date + summary.failed,
        summary.total_images,
        "counts must partition the images: {summary:?}"
    );
}

mod batch {
    use super::*;

    #[tokio::test]
    async fn shared_image_is_probed_once() {
        init_tracing();
        let prober = Arc::new(FakeProber::new().script("nginx:latest", Script::Updated));
        let containers = containers_for(&["nginx:latest"; 5]);

        let result = checker(&prober)
            .check_images(containers, None, &CancellationToken::new())
            .await;

        assert_eq!(result.summary.total_containers, 5);
        assert_eq!(result.summary.total_images, 1);
        assert_eq!(result.summary.updated, 1);
        assert_eq!(result.images.len(), 1);
        assert_eq!(prober.calls_for("nginx:latest"), 1);
        assert!(result.error().is_none());
    }

    #[tokio::test]
    async fn every_unique_image_probed_exactly_once() {
        let prober = Arc::new(
            FakeProber::new()
                .script("nginx:latest", Script::Updated)
                .script("redis:7", Script::Fail("unauthorized".to_string()))
                .script("postgres:16", Script::Report("rate limited".to_string())),
        );
        let containers = containers_for(&[
            "nginx:latest",
            "redis:7",
            "nginx:latest",
            "postgres:16",
            "alpine:3",
            "redis:7",
        ]);
        let expected: HashSet<String> = unique_images(&containers).into_iter().collect();

        let result = checker(&prober)
            .check_images(containers, None, &CancellationToken::new())
            .await;

        assert_eq!(prober.probed(), expected);
        assert_eq!(prober.total_calls(), 4);
        let reported: HashSet<String> = result.images.iter().map(|r| r.image.clone()).collect();
        assert_eq!(reported, expected);
        assert_eq!(result.summary.updated, 1);
        assert_eq!(result.summary.up_to_date, 1);
        assert_eq!(result.summary.failed, 2);
        assert_partitioned(&result.summary);
    }

    #[tokio::test]
    async fn sink_sees_each_result_once() {
        let prober = Arc::new(FakeProber::new().script("b:1", Script::Updated));
        let sink = CollectingSink::new();

        let result = checker(&prober)
            .check_images(
                containers_for(&["a:1", "b:1", "c:1", "a:1"]),
                Some(&sink),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(sink.len(), result.summary.total_images);
        assert_eq!(sink.results(), result.images);
    }

    #[tokio::test]
    async fn closure_works_as_sink() {
        let prober = Arc::new(FakeProber::new());
        let seen = parking_lot::Mutex::new(Vec::new());
        let sink = |r: &ImageCheckResult| seen.lock().push(r.image.clone());

        checker(&prober)
            .check_images(
                containers_for(&["a:1", "b:1"]),
                Some(&sink),
                &CancellationToken::new(),
            )
            .await;

        let mut seen = seen.into_inner();
        seen.sort();
        assert_eq!(seen, ["a:1", "b:1"]);
    }

    #[tokio::test]
    async fn empty_input_probes_nothing() {
        let prober = Arc::new(FakeProber::new());
        let sink = CollectingSink::new();

        let result = checker(&prober)
            .check_images(Vec::new(), Some(&sink), &CancellationToken::new())
            .await;

        assert_eq!(result.summary.total_containers, 0);
        assert_eq!(result.summary.total_images, 0);
        assert_eq!(result.summary.checked(), 0);
        assert!(result.images.is_empty());
        assert!(result.error().is_none());
        assert!(sink.is_empty());
        assert_eq!(prober.total_calls(), 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_others() {
        let prober = Arc::new(
            FakeProber::new()
                .script("a:1", Script::Updated)
                .script("b:1", Script::Fail("registry down".to_string()))
                .script("c:1", Script::UpToDate),
        );

        let result = checker(&prober)
            .check_images(
                containers_for(&["a:1", "b:1", "c:1"]),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.images.len(), 3);
        assert_eq!(
            (
                result.summary.updated,
                result.summary.up_to_date,
                result.summary.failed
            ),
            (1, 1, 1)
        );

        let error = result.error().expect("batch error");
        assert_eq!(error.kind(), CheckErrorKind::Probe);
        assert_eq!(error.image(), Some("b:1"));
        assert!(error.to_string().contains("registry down"));

        let failed = result.failed_images().next().unwrap();
        assert_eq!(failed.image, "b:1");
        assert!(failed.error.as_deref().unwrap().contains("registry down"));
    }

    #[tokio::test]
    async fn error_field_counts_as_failure() {
        let prober = Arc::new(FakeProber::new().script("a:1", Script::Report("boom".into())));

        let result = checker(&prober)
            .check_images(containers_for(&["a:1"]), None, &CancellationToken::new())
            .await;

        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.error().map(|e| e.kind()), Some(CheckErrorKind::Probe));
    }

    #[tokio::test]
    async fn first_error_is_one_of_the_failures() {
        let prober = Arc::new(
            FakeProber::new()
                .script("a:1", Script::Fail("a broke".into()))
                .script("b:1", Script::Fail("b broke".into())),
        );

        let result = checker(&prober)
            .check_images(
                containers_for(&["a:1", "b:1", "c:1"]),
                None,
                &CancellationToken::new(),
            )
            .await;

        let image = result.error().and_then(|e| e.image()).unwrap();
        assert!(image == "a:1" || image == "b:1");
        assert_eq!(result.summary.failed, 2);
    }

    #[tokio::test]
    async fn panicking_probe_becomes_a_failure() {
        let prober = Arc::new(FakeProber::new().script("bad:1", Script::Panic));

        let result = checker(&prober)
            .check_images(
                containers_for(&["good:1", "bad:1"]),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.images.len(), 2);
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.summary.up_to_date, 1);
        let failed = result.failed_images().next().unwrap();
        assert_eq!(failed.image, "bad:1");
        assert_eq!(failed.error.as_deref(), Some("probe task panicked"));
    }

    #[tokio::test]
    async fn slow_probe_times_out() {
        let prober = Arc::new(FakeProber::new().script("stuck:1", Script::Hang));
        let options = CheckOptions {
            probe_timeout: Some(Duration::from_millis(50)),
            ..CheckOptions::default()
        };

        let result = checker(&prober)
            .with_options(options)
            .check_images(
                containers_for(&["stuck:1", "fine:1"]),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.summary.up_to_date, 1);
        let error = result.error().unwrap();
        assert_eq!(error.image(), Some("stuck:1"));
        assert!(error.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn concurrency_limit_is_respected() {
        let images: Vec<String> = (0..12).map(|i| format!("img{i}:1")).collect();
        let prober = images.iter().fold(FakeProber::new(), |p, image| {
            p.delay(image, Duration::from_millis(20))
        });
        let prober = Arc::new(prober);
        let refs: Vec<&str> = images.iter().map(String::as_str).collect();
        let options = CheckOptions {
            max_concurrency: Some(3),
            ..CheckOptions::default()
        };

        let result = checker(&prober)
            .with_options(options)
            .check_images(containers_for(&refs), None, &CancellationToken::new())
            .await;

        assert_eq!(result.summary.up_to_date, 12);
        assert!(prober.peak_concurrency() <= 3);
        assert!(prober.peak_concurrency() >= 1);
    }

    #[tokio::test]
    async fn unbounded_probes_overlap() {
        let prober = Arc::new(
            FakeProber::new()
                .delay("a:1", Duration::from_millis(100))
                .delay("b:1", Duration::from_millis(100))
                .delay("c:1", Duration::from_millis(100)),
        );

        let result = checker(&prober)
            .check_images(
                containers_for(&["a:1", "b:1", "c:1"]),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.summary.checked(), 3);
        assert!(prober.peak_concurrency() > 1);
    }

    #[tokio::test]
    async fn single_image_batch() {
        let prober = Arc::new(FakeProber::new().script("only:1", Script::Updated));

        let result = checker(&prober)
            .check_images(containers_for(&["only:1"]), None, &CancellationToken::new())
            .await;

        assert_eq!(result.summary.total_images, 1);
        assert_eq!(result.summary.updated, 1);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn thousand_images_all_accounted_for() {
        let images: Vec<String> = (0..1000).map(|i| format!("registry.local/app{i}:1")).collect();
        let prober = images
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 7 == 0)
            .fold(FakeProber::new(), |p, (_, image)| {
                p.script(image, Script::Updated)
            });
        let prober = Arc::new(prober);
        let refs: Vec<&str> = images.iter().map(String::as_str).collect();
        let sink = CollectingSink::new();

        let result = checker(&prober)
            .check_images(containers_for(&refs), Some(&sink), &CancellationToken::new())
            .await;

        assert_eq!(result.summary.total_images, 1000);
        assert_eq!(result.images.len(), 1000);
        assert_eq!(sink.len(), 1000);
        assert_eq!(result.summary.updated, 143);
        assert_partitioned(&result.summary);
        assert_eq!(prober.total_calls(), 1000);
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancel_returns_partial_results() {
        init_tracing();
        let prober = Arc::new(
            FakeProber::new()
                .script("slow1:1", Script::Hang)
                .script("slow2:1", Script::Hang),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = checker(&prober)
            .check_images(
                containers_for(&["a:1", "b:1", "c:1", "slow1:1", "slow2:1"]),
                None,
                &cancel,
            )
            .await;

        assert_eq!(result.summary.total_images, 5);
        assert_eq!(result.images.len(), 3);
        assert!(!result.is_complete());
        assert_partitioned(&Summary {
            total_images: result.images.len(),
            ..result.summary
        });

        let unique: HashSet<&str> = result.images.iter().map(|r| r.image.as_str()).collect();
        assert_eq!(unique.len(), result.images.len(), "no duplicates");
        assert!(!unique.contains("slow1:1"));

        let error = result.error().unwrap();
        assert_eq!(error.kind(), CheckErrorKind::Cancelled);
        assert_eq!(
            error.to_string(),
            "check cancelled after 3 of 5 images"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn results_finished_before_cancel_are_kept() {
        init_tracing();
        let prober = Arc::new(
            FakeProber::new()
                .script("b:1", Script::Hang)
                .delay("c:1", Duration::from_millis(30)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        // A slow consumer: c:1 finishes while the sink is still busy with a:1.
        let sink = move |r: &ImageCheckResult| {
            if r.image == "a:1" {
                std::thread::sleep(Duration::from_millis(300));
                trigger.cancel();
            }
        };

        let result = checker(&prober)
            .check_images(
                containers_for(&["a:1", "b:1", "c:1"]),
                Some(&sink),
                &cancel,
            )
            .await;

        let got: HashSet<&str> = result.images.iter().map(|r| r.image.as_str()).collect();
        assert_eq!(got, HashSet::from(["a:1", "c:1"]));
        assert_eq!(result.summary.up_to_date, 2);
        assert_eq!(result.summary.total_images, 3);
        assert_eq!(
            result.error().unwrap().to_string(),
            "check cancelled after 2 of 3 images"
        );
    }

    #[tokio::test]
    async fn cancellation_wins_over_probe_error() {
        let prober = Arc::new(
            FakeProber::new()
                .script("bad:1", Script::Fail("nope".into()))
                .script("slow:1", Script::Hang),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = checker(&prober)
            .check_images(containers_for(&["bad:1", "slow:1"]), None, &cancel)
            .await;

        assert_eq!(result.summary.failed, 1);
        assert_eq!(
            result.error().map(|e| e.kind()),
            Some(CheckErrorKind::Cancelled)
        );
    }

    #[tokio::test]
    async fn already_cancelled_checks_nothing() {
        let prober = Arc::new(FakeProber::new().delay("a:1", Duration::from_millis(200)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = checker(&prober)
            .check_images(containers_for(&["a:1", "b:1"]), None, &cancel)
            .await;

        assert!(result.images.len() <= 2);
        assert_eq!(
            result.error().map(|e| e.kind()),
            Some(CheckErrorKind::Cancelled)
        );
    }
}

mod selection {
    use super::*;
    use nonempty::NonEmpty;

    fn fleet() -> Vec<ContainerInfo> {
        vec![
            ContainerInfo::new("1", "web", "nginx:latest").with_label("tidewatch.update", "true"),
            ContainerInfo::new("2", "web2", "nginx:latest").with_label("tidewatch.update", "true"),
            ContainerInfo::new("3", "cache", "redis:7").with_label("tidewatch.update", "false"),
            ContainerInfo::new("4", "db", "postgres:16").with_label("tier", "data"),
        ]
    }

    fn fleet_checker(prober: &Arc<FakeProber>) -> Checker {
        Checker::new(Arc::new(FakeDirectory::new(fleet())), prober.clone())
    }

    #[tokio::test]
    async fn by_name_checks_only_named_containers() {
        let prober = Arc::new(FakeProber::new());
        let names = vec!["web".to_string(), "db".to_string(), "missing".to_string()];

        let result = fleet_checker(&prober)
            .check_by_name(&names, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.summary.total_containers, 2);
        assert_eq!(result.summary.total_images, 2);
        assert_eq!(
            prober.probed(),
            HashSet::from(["nginx:latest".to_string(), "postgres:16".to_string()])
        );
    }

    #[tokio::test]
    async fn default_label_selects_opted_in_containers() {
        let prober = Arc::new(FakeProber::new().script("nginx:latest", Script::Updated));

        let result = fleet_checker(&prober)
            .check(&Selection::default_label(), None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.summary.total_containers, 2);
        assert_eq!(result.summary.total_images, 1);
        assert_eq!(result.summary.updated, 1);
        assert_eq!(result.containers_using("nginx:latest").count(), 2);
    }

    #[tokio::test]
    async fn custom_label() {
        let prober = Arc::new(FakeProber::new());

        let result = fleet_checker(&prober)
            .check_by_label("tier", "data", None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.containers.len(), 1);
        assert_eq!(result.containers[0].name, "db");
    }

    #[tokio::test]
    async fn all_checks_every_container() {
        let prober = Arc::new(FakeProber::new());

        let result = fleet_checker(&prober)
            .check(&Selection::All, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.summary.total_containers, 4);
        assert_eq!(result.summary.total_images, 3);
        assert_eq!(prober.total_calls(), 3);
    }

    #[tokio::test]
    async fn names_selection_dispatches_to_lookup() {
        let prober = Arc::new(FakeProber::new());
        let selection = Selection::Names(NonEmpty::new("cache".to_string()));

        let result = fleet_checker(&prober)
            .check(&selection, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.containers.len(), 1);
        assert_eq!(prober.probed(), HashSet::from(["redis:7".to_string()]));
    }

    #[tokio::test]
    async fn no_match_is_an_empty_batch() {
        let prober = Arc::new(FakeProber::new());

        let result = fleet_checker(&prober)
            .check_by_label("nobody", "uses-this", None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.summary, Summary::default());
        assert!(result.error().is_none());
    }

    #[tokio::test]
    async fn resolution_failure_is_an_error() {
        let prober = Arc::new(FakeProber::new());
        let checker = Checker::new(Arc::new(FakeDirectory::unreachable()), prober.clone());

        let error = checker
            .check_all(None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(error.kind(), CheckErrorKind::Resolution);
        assert!(error.to_string().contains("connection refused"));
        assert_eq!(prober.total_calls(), 0);
    }
}

fn outcome(kind: u8) -> Script {
    match kind % 4 {
        0 => Script::Updated,
        1 => Script::UpToDate,
        2 => Script::Fail("registry error".to_string()),
        _ => Script::Report("digest missing".to_string()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn summary_partitions_under_random_latency(
        plan in prop::collection::vec((0u8..4, 0u64..15, 1usize..4), 1..24)
    ) {
        let mut prober = FakeProber::new();
        let mut containers = Vec::new();
        let mut expected_failed = 0;
        for (i, (kind, delay, replicas)) in plan.iter().enumerate() {
            let image = format!("img{i}:1");
            prober = prober
                .script(&image, outcome(*kind))
                .delay(&image, Duration::from_millis(*delay));
            if kind % 4 >= 2 {
                expected_failed += 1;
            }
            for r in 0..*replicas {
                containers.push(ContainerInfo::new(
                    format!("{i}-{r}"),
                    format!("c{i}-{r}"),
                    image.clone(),
                ));
            }
        }
        let prober = Arc::new(prober);
        let total_containers = containers.len();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let sink = CollectingSink::new();
        let result = rt.block_on(
            checker(&prober).check_images(containers, Some(&sink), &CancellationToken::new()),
        );

        prop_assert_eq!(result.summary.total_containers, total_containers);
        prop_assert_eq!(result.summary.total_images, plan.len());
        prop_assert_eq!(result.images.len(), plan.len());
        prop_assert_eq!(sink.len(), plan.len());
        prop_assert_eq!(result.summary.failed, expected_failed);
        prop_assert_eq!(
            result.summary.updated + result.summary.up_to_date + result.summary.failed,
            result.summary.total_images
        );
        prop_assert_eq!(prober.total_calls(), plan.len());
        prop_assert_eq!(result.error().is_some(), expected_failed > 0);

        let recomputed = Summary::from_results(
            result.summary.total_containers,
            result.summary.total_images,
            &result.images,
            result.summary.duration,
        );
        prop_assert_eq!(recomputed, result.summary);
    }
}
